use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};

use crate::cli::SubCommandExtend;
use crate::config::EngineOptions;
use crate::db::NewRecord;
use crate::utils::pb_style;
use crate::{Engine, EngineBuilder, Opts};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// JSON Lines 文件，每行一条记录：
    /// {"record_id": "...", "vector": [...], "ethnicity": "...", "skin_type": 3, "age": 30}
    #[arg(verbatim_doc_comment)]
    pub path: PathBuf,
    /// 每个批次写入的记录数量
    #[arg(long, value_name = "SIZE", default_value_t = 1000)]
    pub batch_size: usize,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let file = File::open(&self.path)
            .with_context(|| format!("无法打开 {}", self.path.display()))?;
        let engine = EngineBuilder::new(opts.conf_dir.clone()).options(&self.engine).open().await?;

        let pb = ProgressBar::no_length().with_style(pb_style());
        let batch_size = self.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let (mut added, mut skipped) = (0, 0);

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: NewRecord = serde_json::from_str(&line)
                .with_context(|| format!("第 {} 行格式错误", lineno + 1))?;
            if engine.index().contains(&record.record_id) {
                warn!("记录 {} 已存在，跳过", record.record_id);
                skipped += 1;
                continue;
            }
            batch.push(record);
            if batch.len() == batch_size {
                added += add_batch(&engine, &mut batch, &pb).await?;
            }
        }
        if !batch.is_empty() {
            added += add_batch(&engine, &mut batch, &pb).await?;
        }

        pb.finish_with_message("记录添加完成");
        info!("添加 {added} 条记录，跳过 {skipped} 条");

        // 单条插入不会自动落盘
        engine.flush().await?;
        Ok(())
    }
}

async fn add_batch(engine: &Engine, batch: &mut Vec<NewRecord>, pb: &ProgressBar) -> Result<usize> {
    let records = std::mem::take(batch);
    let n = engine.add_records(records).await?;
    pb.inc(n as u64);
    Ok(n)
}
