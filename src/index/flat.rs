use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use rayon::prelude::*;

use super::storage::FORMAT_VERSION;
use super::{IndexMetadata, IndexRecord, Neighbor, Scored, TopKNeighbors};
use crate::error::{EngineError, Result};
use crate::metrics;
use crate::normalize::{dot, normalize, validate_vector};

/// 每个并行扫描任务负责的向量数量
const SCAN_CHUNK: usize = 4096;

/// 扁平索引：连续存储的单位向量 + 记录 ID
///
/// 第 i 条记录的向量位于 `vectors[i * dimension..(i + 1) * dimension]`，
/// 位置即插入顺序。
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<String>,
    vectors: Vec<f32>,
    positions: HashMap<String, usize>,
    built_at: u64,
}

impl FlatIndex {
    /// 创建空索引
    ///
    /// `dimension` 必须大于 0，否则 panic；需要校验外部输入时使用 [`create_index`](super::create_index)。
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "dimension must be positive");
        Self {
            dimension,
            ids: vec![],
            vectors: vec![],
            positions: HashMap::new(),
            built_at: unix_now(),
        }
    }

    /// 从已单位化的数据直接构造，用于从文件加载
    pub(crate) fn from_parts(
        dimension: usize,
        ids: Vec<String>,
        vectors: Vec<f32>,
        built_at: u64,
    ) -> Result<Self> {
        if dimension == 0 || ids.len() * dimension != vectors.len() {
            return Err(EngineError::IndexCorruption(format!(
                "向量数据长度 {} 与记录数 {} 不匹配",
                vectors.len(),
                ids.len()
            )));
        }
        let mut positions = HashMap::with_capacity(ids.len());
        for (pos, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), pos).is_some() {
                return Err(EngineError::IndexCorruption(format!("重复的记录 ID: {id}")));
            }
        }
        Ok(Self { dimension, ids, vectors, positions, built_at })
    }

    /// 从记录构建新索引，非法记录和重复记录会被跳过，同时返回跳过的记录数
    pub fn build(dimension: usize, records: &mut dyn Iterator<Item = IndexRecord>) -> (Self, usize) {
        let mut index = Self::new(dimension);
        let mut skipped = 0;
        for record in records {
            if let Err(e) = validate_vector(&record.vector, dimension) {
                warn!("跳过记录 {}: {e}", record.record_id);
                skipped += 1;
                continue;
            }
            if index.contains(&record.record_id) {
                warn!("跳过重复记录 {}", record.record_id);
                skipped += 1;
                continue;
            }
            index.push(record.record_id, &record.vector);
        }
        (index, skipped)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn built_at(&self) -> u64 {
        self.built_at
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.positions.contains_key(record_id)
    }

    /// 向量数与 ID 映射大小一致
    pub fn is_consistent(&self) -> bool {
        self.ids.len() == self.positions.len()
            && self.vectors.len() == self.ids.len() * self.dimension
    }

    pub fn vector(&self, pos: usize) -> &[f32] {
        &self.vectors[pos * self.dimension..(pos + 1) * self.dimension]
    }

    pub fn insert(&mut self, record_id: &str, vector: &[f32]) -> Result<()> {
        validate_vector(vector, self.dimension)?;
        if self.contains(record_id) {
            return Err(EngineError::DuplicateRecord(record_id.to_string()));
        }
        self.push(record_id.to_string(), vector);
        Ok(())
    }

    /// 批量插入，先校验全部记录，校验通过后才会修改索引
    pub fn insert_batch(&mut self, records: Vec<IndexRecord>) -> Result<usize> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            validate_vector(&record.vector, self.dimension)?;
            if self.contains(&record.record_id) || !seen.insert(record.record_id.as_str()) {
                return Err(EngineError::DuplicateRecord(record.record_id.clone()));
            }
        }

        let normalized: Vec<_> = records
            .into_par_iter()
            .map(|record| {
                let v = normalize(&record.vector);
                if v.is_degenerate() {
                    warn!("记录 {} 的特征向量模长为零", record.record_id);
                    metrics::inc_degenerate_vector();
                }
                (record.record_id, v.into_vec())
            })
            .collect();

        let count = normalized.len();
        self.ids.reserve(count);
        self.vectors.reserve(count * self.dimension);
        for (record_id, vector) in normalized {
            self.positions.insert(record_id.clone(), self.ids.len());
            self.ids.push(record_id);
            self.vectors.extend_from_slice(&vector);
        }
        Ok(count)
    }

    /// 调用前需确保向量合法且 ID 不重复
    fn push(&mut self, record_id: String, vector: &[f32]) {
        let v = normalize(vector);
        if v.is_degenerate() {
            warn!("记录 {record_id} 的特征向量模长为零");
            metrics::inc_degenerate_vector();
        }
        self.positions.insert(record_id.clone(), self.ids.len());
        self.ids.push(record_id);
        self.vectors.extend_from_slice(v.as_slice());
    }

    /// 内积搜索，查询向量必须已经单位化
    pub fn search_normalized(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let dim = self.dimension;
        let k = k.min(self.len());
        if k == 0 {
            return vec![];
        }

        let topk = self
            .vectors
            .par_chunks(SCAN_CHUNK * dim)
            .enumerate()
            .map(|(chunk_no, chunk)| {
                let mut topk = TopKNeighbors::new(k);
                let base = chunk_no * SCAN_CHUNK;
                for (i, v) in chunk.chunks_exact(dim).enumerate() {
                    topk.push(Scored { similarity: dot(query, v), pos: base + i });
                }
                topk
            })
            .reduce(|| TopKNeighbors::new(k), TopKNeighbors::merge);

        topk.into_sorted_vec()
            .into_iter()
            .map(|s| Neighbor { record_id: self.ids[s.pos].clone(), similarity: s.similarity })
            .collect()
    }

    /// 单位化查询向量后搜索
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        validate_vector(query, self.dimension)?;
        if k == 0 {
            return Err(EngineError::Validation("k 必须大于 0".to_string()));
        }
        let query = normalize(query);
        if query.is_degenerate() {
            warn!("查询向量模长为零");
            metrics::inc_degenerate_vector();
        }
        Ok(self.search_normalized(query.as_slice(), k))
    }

    /// 向量数据的 blake3 校验和，按小端字节序计算
    pub fn checksum(&self) -> blake3::Hash {
        checksum_of(&self.vectors)
    }

    pub fn metadata(&self) -> IndexMetadata {
        IndexMetadata {
            total_vectors: self.len(),
            dimension: self.dimension,
            build_timestamp: self.built_at,
            checksum: self.checksum().to_hex().to_string(),
            version: FORMAT_VERSION,
        }
    }
}

pub fn checksum_of(vectors: &[f32]) -> blake3::Hash {
    #[cfg(target_endian = "little")]
    {
        blake3::hash(bytemuck::cast_slice(vectors))
    }
    #[cfg(target_endian = "big")]
    {
        let mut hasher = blake3::Hasher::new();
        for x in vectors {
            hasher.update(&x.to_le_bytes());
        }
        hasher.finalize()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
