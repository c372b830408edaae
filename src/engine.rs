use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use tokio::task::spawn_blocking;

use crate::config::{ConfDir, EngineOptions};
use crate::db::{NewRecord, RecordDb};
use crate::demographic::{DemographicSimilarity, DemographicTables};
use crate::error::{EngineError, Result};
use crate::index::recovery::{RecoveryOutcome, restore};
use crate::index::{
    IndexBackend, IndexHealth, IndexMetadata, IndexRecord, VectorIndex, create_index,
};
use crate::normalize::validate_vector;
use crate::profile::RecordSource;
use crate::searcher::{SearchConfig, SearchOrchestrator, SearchRequest, SearchResponse};

pub struct EngineBuilder {
    conf_dir: ConfDir,
    dimension: usize,
    backend: IndexBackend,
    index_path: Option<PathBuf>,
    rebuild_on_corruption: bool,
    age_normalization: Option<u32>,
    search: SearchConfig,
    restore: bool,
}

impl EngineBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self {
            conf_dir,
            dimension: 512,
            backend: IndexBackend::Persistent,
            index_path: None,
            rebuild_on_corruption: true,
            age_normalization: None,
            search: SearchConfig::default(),
            restore: true,
        }
    }

    /// 使用命令行参数初始化
    pub fn options(self, opts: &EngineOptions) -> Self {
        Self {
            dimension: opts.dimension,
            backend: opts.backend,
            index_path: opts.index_path.clone(),
            rebuild_on_corruption: !opts.no_rebuild_on_corruption,
            age_normalization: opts.age_normalization,
            ..self
        }
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn backend(mut self, backend: IndexBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// 打开时是否恢复索引，关闭后索引为空，由调用方自行构建
    pub fn restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    pub async fn open(self) -> anyhow::Result<Engine> {
        fs::create_dir_all(self.conf_dir.path())
            .with_context(|| format!("无法创建配置目录 {}", self.conf_dir.path().display()))?;

        let mut tables = DemographicTables::load(self.conf_dir.demographics())?;
        if let Some(age) = self.age_normalization {
            tables.age_normalization_constant = age;
        }
        tables.validate()?;
        self.search.weights.validate()?;

        let db = RecordDb::open(self.conf_dir.database()).await?;
        let index_path = self.index_path.unwrap_or_else(|| self.conf_dir.index());
        let index = create_index(self.backend, self.dimension, &index_path)?;

        let recovery = if self.restore {
            // 内存索引不读文件，直接从数据库构建
            let path = match self.backend {
                IndexBackend::Persistent => Some(index_path.as_path()),
                IndexBackend::Memory => None,
            };
            Some(restore(index.as_ref(), path, &db, self.rebuild_on_corruption).await)
        } else {
            None
        };

        let searcher = SearchOrchestrator::new(
            index.clone(),
            Arc::new(db.clone()),
            DemographicSimilarity::new(tables),
            self.search,
        );

        Ok(Engine { db, index, searcher, index_path, recovery })
    }
}

/// 记录数据库、向量索引与搜索流程的组合
pub struct Engine {
    db: RecordDb,
    index: Arc<dyn VectorIndex>,
    searcher: SearchOrchestrator<RecordDb>,
    index_path: PathBuf,
    recovery: Option<RecoveryOutcome>,
}

impl Engine {
    pub fn db(&self) -> &RecordDb {
        &self.db
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn searcher(&self) -> &SearchOrchestrator<RecordDb> {
        &self.searcher
    }

    pub fn recovery(&self) -> Option<&RecoveryOutcome> {
        self.recovery.as_ref()
    }

    /// 添加一批记录
    ///
    /// 先完成全部校验，再写入数据库，最后写入索引；任何一条不合法则整批拒绝。
    pub async fn add_records(&self, records: Vec<NewRecord>) -> Result<usize> {
        let dimension = self.index.dimension();
        {
            let mut seen = HashSet::with_capacity(records.len());
            for record in &records {
                validate_vector(&record.vector, dimension)?;
                if self.index.contains(&record.record_id) || !seen.insert(record.record_id.as_str())
                {
                    return Err(EngineError::DuplicateRecord(record.record_id.clone()));
                }
            }
        }

        self.db.insert_records(&records).await?;

        let batch: Vec<_> =
            records.into_iter().map(|r| IndexRecord::new(r.record_id, r.vector)).collect();
        let index = self.index.clone();
        let result = spawn_blocking(move || index.insert_batch(batch))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if let Err(e) = &result {
            // 数据库已写入，索引与数据库不再一致，需要重建
            error!("记录已写入数据库，但写入索引失败: {e}");
            self.index.mark_inconsistent();
        }
        result
    }

    /// 从数据库全量重建索引
    pub async fn rebuild(&self) -> Result<IndexMetadata> {
        let records = self.db.records().await?;
        info!("从数据库读取 {} 条记录", records.len());
        let index = self.index.clone();
        spawn_blocking(move || index.rebuild_from_source(&mut records.into_iter()))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.searcher.search(request).await
    }

    pub fn health(&self) -> IndexHealth {
        self.index.health()
    }

    /// 写入未落盘的修改
    pub async fn flush(&self) -> Result<bool> {
        let index = self.index.clone();
        spawn_blocking(move || index.flush())
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
    }

    /// 将索引写入索引文件
    pub async fn persist(&self) -> Result<IndexMetadata> {
        let index = self.index.clone();
        let path = self.index_path.clone();
        spawn_blocking(move || index.persist(&path))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?
    }
}
