use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::EngineOptions;
use crate::{EngineBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
}

impl SubCommandExtend for BuildCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let engine = EngineBuilder::new(opts.conf_dir.clone())
            .options(&self.engine)
            .restore(false)
            .open()
            .await?;
        let meta = engine.rebuild().await?;
        // 内存索引不会自动落盘
        engine.persist().await?;
        info!("构建索引成功，共 {} 条向量，校验和 {}", meta.total_vectors, meta.checksum);
        Ok(())
    }
}
