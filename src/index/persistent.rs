use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, warn};

use super::{IndexHealth, IndexMetadata, IndexRecord, MemoryIndex, Neighbor, VectorIndex};
use crate::error::Result;

/// 绑定索引文件的持久化索引
///
/// 批量写入和重建完成后立即落盘；单条插入只标记为脏，由 `flush` 统一写入。
pub struct PersistentIndex {
    inner: MemoryIndex,
    path: PathBuf,
    dirty: AtomicBool,
}

impl PersistentIndex {
    pub fn new(dimension: usize, path: impl Into<PathBuf>) -> Self {
        Self { inner: MemoryIndex::new(dimension), path: path.into(), dirty: AtomicBool::new(false) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    // 数据已经写入内存，落盘失败只记录日志，留待下次 flush 重试
    fn persist_or_mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        match self.inner.persist(&self.path) {
            Ok(_) => self.dirty.store(false, Ordering::SeqCst),
            Err(e) => error!("索引落盘失败: {e}"),
        }
    }
}

impl VectorIndex for PersistentIndex {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn contains(&self, record_id: &str) -> bool {
        self.inner.contains(record_id)
    }

    fn insert(&self, record_id: &str, vector: &[f32]) -> Result<()> {
        self.inner.insert(record_id, vector)?;
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn insert_batch(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let count = self.inner.insert_batch(records)?;
        self.persist_or_mark_dirty();
        Ok(count)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.inner.search(query, k)
    }

    fn persist(&self, path: &Path) -> Result<IndexMetadata> {
        let meta = self.inner.persist(path)?;
        if path == self.path {
            self.dirty.store(false, Ordering::SeqCst);
        }
        Ok(meta)
    }

    fn load(&self, path: &Path) -> Result<IndexMetadata> {
        let meta = self.inner.load(path)?;
        self.dirty.store(path != self.path, Ordering::SeqCst);
        Ok(meta)
    }

    fn rebuild_from_source(
        &self,
        records: &mut dyn Iterator<Item = IndexRecord>,
    ) -> Result<IndexMetadata> {
        let meta = self.inner.rebuild_from_source(records)?;
        if self.inner.health().consistent {
            self.persist_or_mark_dirty();
        } else {
            // 部分记录未能加入索引，暂不覆盖现有文件
            warn!("重建结果不完整，未写入 {}", self.path.display());
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(meta)
    }

    fn health(&self) -> IndexHealth {
        self.inner.health()
    }

    fn mark_inconsistent(&self) {
        self.inner.mark_inconsistent()
    }

    fn flush(&self) -> Result<bool> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        if let Err(e) = self.inner.persist(&self.path) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(true)
    }
}
