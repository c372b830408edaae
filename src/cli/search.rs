use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::EngineBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{EngineOptions, Opts, SearchOptions};
use crate::demographic::DemographicProfile;
use crate::searcher::{SearchRequest, SearchResponse};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 查询向量文件，内容为 JSON 数组，或包含 query_vector 字段的对象
    pub query: PathBuf,
    /// 请求者族裔
    #[arg(long)]
    pub ethnicity: Option<String>,
    /// 请求者肤色等级
    #[arg(long)]
    pub skin_type: Option<u8>,
    /// 请求者年龄
    #[arg(long)]
    pub age: Option<u32>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Vector(Vec<f32>),
    Request { query_vector: Vec<f32> },
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let content = fs::read_to_string(&self.query)
            .with_context(|| format!("无法读取 {}", self.query.display()))?;
        let query = match serde_json::from_str(&content).context("查询向量格式错误")? {
            QueryFile::Vector(v) => v,
            QueryFile::Request { query_vector } => query_vector,
        };

        let engine = EngineBuilder::new(opts.conf_dir.clone())
            .options(&self.engine)
            .search(self.search.search_config())
            .open()
            .await?;

        let mut request = SearchRequest::new(query, self.search.count);
        let context = DemographicProfile {
            record_id: None,
            ethnicity: self.ethnicity.clone(),
            skin_type: self.skin_type,
            age: self.age,
        };
        if !context.is_unknown() {
            request = request.context(context);
        }

        let response = engine.search(request).await?;
        print_result(&response, self.output_format)
    }
}

fn print_result(response: &SearchResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?)
        }
        OutputFormat::Table => {
            for r in &response.results {
                let demographic = match r.demographic_similarity {
                    Some(d) => format!("{d:.4}"),
                    None => "-".to_string(),
                };
                println!(
                    "{:.4}\t{:.4}\t{}\t{}",
                    r.combined_score, r.visual_similarity, demographic, r.record_id
                );
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
