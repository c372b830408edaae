use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::index::IndexBackend;
use crate::scoring::Weights;
use crate::searcher::SearchConfig;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "tonematch", "tonematch")
        .map(|dirs| dirs.config_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| ".tonematch".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct EngineOptions {
    /// 特征向量维数，必须与已有索引一致
    #[arg(short, long, value_name = "D", default_value_t = 512)]
    pub dimension: usize,
    /// 索引实现
    #[arg(long, value_enum, default_value_t = IndexBackend::Persistent)]
    pub backend: IndexBackend,
    /// 索引文件路径，默认为配置目录下的 index.tmix
    #[arg(long, value_name = "PATH")]
    pub index_path: Option<PathBuf>,
    /// 索引文件损坏时不从数据库重建，直接以空索引启动
    #[arg(long)]
    pub no_rebuild_on_corruption: bool,
    /// 年龄归一化常数，覆盖 demographics.json 中的设置
    #[arg(long, value_name = "YEARS")]
    pub age_normalization: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 视觉相似度权重
    #[arg(long, value_name = "W", default_value_t = 0.7)]
    pub visual_weight: f32,
    /// 人口统计相似度权重
    #[arg(long, value_name = "W", default_value_t = 0.3)]
    pub demographic_weight: f32,
    /// 候选集扩张倍数
    #[arg(long, value_name = "N", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub expansion: u32,
    /// 单次画像查询的超时时间（毫秒）
    #[arg(long, value_name = "MS", default_value_t = 300)]
    pub lookup_timeout_ms: u64,
    /// 单次搜索的时间预算（毫秒）
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub search_budget_ms: u64,
    /// 显示的结果数量
    #[arg(short = 'k', long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
}

impl SearchOptions {
    pub fn weights(&self) -> Weights {
        Weights::new(self.visual_weight, self.demographic_weight)
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            weights: self.weights(),
            expansion: self.expansion as usize,
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            budget: Duration::from_millis(self.search_budget_ms),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "tonematch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// tonematch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从 JSON Lines 文件导入记录
    Add(AddCommand),
    /// 使用数据库中的记录重建索引
    Build(BuildCommand),
    /// 使用查询向量搜索相似记录
    Search(SearchCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
    /// 显示索引状态
    Health(HealthCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("tonematch.db")
    }

    /// 返回索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("index.tmix")
    }

    /// 返回人口统计数据表的路径
    pub fn demographics(&self) -> PathBuf {
        self.path.join("demographics.json")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
