use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::EngineOptions;
use crate::{EngineBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct HealthCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 以 JSON 格式输出
    #[arg(long)]
    pub json: bool,
}

impl SubCommandExtend for HealthCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let engine = EngineBuilder::new(opts.conf_dir.clone()).options(&self.engine).open().await?;
        let health = engine.health();
        let records = engine.db().count().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&health)?);
            return Ok(());
        }

        if let Some(recovery) = engine.recovery() {
            println!("恢复结果: {recovery}");
        }
        println!("数据库记录: {records}");
        println!("索引向量  : {}", health.metadata.total_vectors);
        println!("向量维数  : {}", health.metadata.dimension);
        println!("构建时间  : {}", health.metadata.build_timestamp);
        println!("校验和    : {}", health.metadata.checksum);
        println!("格式版本  : {}", health.metadata.version);
        println!("一致      : {}", health.consistent);
        Ok(())
    }
}
