mod flat;
mod memory;
mod persistent;
pub mod recovery;
pub mod storage;
mod topk;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
pub use flat::*;
pub use memory::*;
pub use persistent::*;
use serde::{Deserialize, Serialize};
pub use topk::*;
use utoipa::ToSchema;

use crate::error::{EngineError, Result};

/// 待索引的记录，ID 由调用方分配且必须唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub record_id: String,
    pub vector: Vec<f32>,
}

impl IndexRecord {
    pub fn new(record_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self { record_id: record_id.into(), vector }
    }
}

/// 搜索结果，`similarity` 为余弦相似度
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub record_id: String,
    pub similarity: f32,
}

/// 索引元数据，同时写入索引文件头部
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexMetadata {
    /// 向量总数
    pub total_vectors: usize,
    /// 向量维数
    pub dimension: usize,
    /// 构建时间，Unix 时间戳（秒）
    pub build_timestamp: u64,
    /// 向量数据的 blake3 校验和
    pub checksum: String,
    /// 文件格式版本
    pub version: u32,
}

/// 索引健康状态
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct IndexHealth {
    #[serde(flatten)]
    pub metadata: IndexMetadata,
    /// 向量数与 ID 映射一致，且最近一次校验通过
    pub consistent: bool,
}

/// 最近邻索引
///
/// 所有写操作（insert、insert_batch、rebuild_from_source、persist、load）互斥，
/// 读操作（search、health）之间可以并发，且不会观察到写入的中间状态。
pub trait VectorIndex: Send + Sync {
    /// 向量维数
    fn dimension(&self) -> usize;

    /// 向量数量
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 记录 ID 是否已经在索引中
    fn contains(&self, record_id: &str) -> bool;

    /// 插入一条记录，记录 ID 已存在时返回 `DuplicateRecord`
    fn insert(&self, record_id: &str, vector: &[f32]) -> Result<()>;

    /// 批量插入，要么全部成功，要么索引保持原状
    fn insert_batch(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// 返回与查询向量最相似的 k 条记录，按相似度降序排列
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// 将索引写入磁盘
    fn persist(&self, path: &Path) -> Result<IndexMetadata>;

    /// 从磁盘加载索引，校验失败时返回 `IndexCorruption`
    fn load(&self, path: &Path) -> Result<IndexMetadata>;

    /// 从数据源全量重建索引，构建完成后原子替换
    fn rebuild_from_source(
        &self,
        records: &mut dyn Iterator<Item = IndexRecord>,
    ) -> Result<IndexMetadata>;

    fn health(&self) -> IndexHealth;

    /// 标记索引处于不一致状态，直到有新数据写入
    fn mark_inconsistent(&self);

    /// 将未落盘的修改写入磁盘，返回是否实际写入
    fn flush(&self) -> Result<bool> {
        Ok(false)
    }
}

/// 索引实现类型
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// 纯内存索引，仅在显式调用时读写文件
    Memory,
    /// 绑定索引文件，批量写入和重建后自动落盘
    Persistent,
}

/// 根据配置创建索引
pub fn create_index(
    backend: IndexBackend,
    dimension: usize,
    path: impl Into<PathBuf>,
) -> Result<Arc<dyn VectorIndex>> {
    if dimension == 0 {
        return Err(EngineError::Validation("向量维数必须大于 0".to_string()));
    }
    Ok(match backend {
        IndexBackend::Memory => Arc::new(MemoryIndex::new(dimension)),
        IndexBackend::Persistent => Arc::new(PersistentIndex::new(dimension, path)),
    })
}
