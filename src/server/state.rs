use std::sync::Arc;

use crate::Engine;

/// 应用状态
pub struct AppState {
    pub engine: Engine,
    /// 鉴权 token
    pub token: String,
}

impl AppState {
    pub fn new(engine: Engine, token: String) -> Arc<Self> {
        Arc::new(AppState { engine, token })
    }
}
