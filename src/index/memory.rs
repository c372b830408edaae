use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use parking_lot::{Mutex, RwLock};

use super::storage::{read_index, write_index};
use super::{FlatIndex, IndexHealth, IndexMetadata, IndexRecord, Neighbor, VectorIndex};
use crate::error::{EngineError, Result};

/// 内存索引
///
/// 读操作持有读锁；写操作先获取 `writer` 互斥锁，耗时的构建和磁盘 I/O 在写锁之外完成，
/// 最后只在替换数据的瞬间持有写锁，因此搜索不会被长时间阻塞。
pub struct MemoryIndex {
    inner: RwLock<FlatIndex>,
    writer: Mutex<()>,
    /// 最近一次校验通过，且没有被标记为不一致
    integrity: AtomicBool,
}

impl MemoryIndex {
    /// `dimension` 必须大于 0，否则 panic
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(FlatIndex::new(dimension)),
            writer: Mutex::new(()),
            integrity: AtomicBool::new(true),
        }
    }

    /// 替换整个索引，返回新索引的元数据
    fn swap(&self, index: FlatIndex) -> IndexMetadata {
        let meta = index.metadata();
        let old = mem::replace(&mut *self.inner.write(), index);
        // 在锁外释放旧索引
        drop(old);
        self.integrity.store(true, Ordering::SeqCst);
        meta
    }
}

impl VectorIndex for MemoryIndex {
    fn dimension(&self) -> usize {
        self.inner.read().dimension()
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }

    fn contains(&self, record_id: &str) -> bool {
        self.inner.read().contains(record_id)
    }

    fn insert(&self, record_id: &str, vector: &[f32]) -> Result<()> {
        let _guard = self.writer.lock();
        self.inner.write().insert(record_id, vector)?;
        self.integrity.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn insert_batch(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let _guard = self.writer.lock();
        let count = self.inner.write().insert_batch(records)?;
        self.integrity.store(true, Ordering::SeqCst);
        Ok(count)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.inner.read().search(query, k)
    }

    fn persist(&self, path: &Path) -> Result<IndexMetadata> {
        let _guard = self.writer.lock();
        let index = self.inner.read();
        let meta = write_index(&index, path)?;
        info!("索引已保存到 {}，共 {} 条向量", path.display(), meta.total_vectors);
        Ok(meta)
    }

    fn load(&self, path: &Path) -> Result<IndexMetadata> {
        let _guard = self.writer.lock();
        let dimension = self.inner.read().dimension();
        let loaded = match read_index(path) {
            Ok(index) if index.dimension() != dimension => Err(EngineError::IndexCorruption(
                format!("索引维数 {} 与配置 {} 不一致", index.dimension(), dimension),
            )),
            other => other,
        };
        match loaded {
            Ok(index) => {
                let meta = self.swap(index);
                info!("从 {} 加载索引，共 {} 条向量", path.display(), meta.total_vectors);
                Ok(meta)
            }
            Err(e) => {
                self.integrity.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn rebuild_from_source(
        &self,
        records: &mut dyn Iterator<Item = IndexRecord>,
    ) -> Result<IndexMetadata> {
        let _guard = self.writer.lock();
        let dimension = self.inner.read().dimension();
        let (index, skipped) = FlatIndex::build(dimension, records);
        if skipped > 0 && index.is_empty() {
            // 数据源全部不可用（通常是维数配置错误），保留原索引
            return Err(EngineError::Validation(format!(
                "数据源中的 {skipped} 条记录均无法加入维数为 {dimension} 的索引"
            )));
        }
        let meta = self.swap(index);
        if skipped > 0 {
            warn!("索引重建跳过了 {skipped} 条记录");
            self.integrity.store(false, Ordering::SeqCst);
        }
        info!("索引重建完成，共 {} 条向量", meta.total_vectors);
        Ok(meta)
    }

    fn health(&self) -> IndexHealth {
        let index = self.inner.read();
        IndexHealth {
            metadata: index.metadata(),
            consistent: index.is_consistent() && self.integrity.load(Ordering::SeqCst),
        }
    }

    fn mark_inconsistent(&self) {
        warn!("索引被标记为不一致");
        self.integrity.store(false, Ordering::SeqCst);
    }
}
