pub mod cli;
pub mod config;
pub mod db;
pub mod demographic;
pub mod engine;
pub mod error;
pub mod index;
mod metrics;
pub mod normalize;
pub mod profile;
pub mod scoring;
pub mod searcher;
pub mod server;
pub mod utils;

pub use config::Opts;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
