use std::collections::HashSet;
use std::path::Path;

use log::{debug, info};
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
mod model;
mod utils;

pub use model::*;
pub use utils::*;

use crate::demographic::DemographicProfile;
use crate::error::{EngineError, Result};
use crate::index::IndexRecord;
use crate::profile::{ProfileStore, RecordSource};

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 记录数据库，同时作为画像查询与索引重建的数据源
#[derive(Debug, Clone)]
pub struct RecordDb {
    pool: Database,
}

impl RecordDb {
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { pool: init_db(filename).await? })
    }

    pub fn from_pool(pool: Database) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Database {
        &self.pool
    }

    /// 在同一事务中写入一批记录，任意一条冲突则整批回滚
    pub async fn insert_records(&self, records: &[NewRecord]) -> Result<usize> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.record_id.as_str()) {
                return Err(EngineError::DuplicateRecord(record.record_id.clone()));
            }
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            if let Err(e) = crud::add_record(&mut *tx, record).await {
                return Err(match e {
                    sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                        EngineError::DuplicateRecord(record.record_id.clone())
                    }
                    e => e.into(),
                });
            }
        }
        tx.commit().await?;
        debug!("写入 {} 条记录", records.len());

        Ok(records.len())
    }

    pub async fn contains(&self, record_id: &str) -> Result<bool> {
        Ok(crud::check_record_id(&self.pool, record_id).await?)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(crud::count_records(&self.pool).await? as usize)
    }
}

impl ProfileStore for RecordDb {
    async fn get_profile(&self, record_id: &str) -> Result<Option<DemographicProfile>> {
        crud::get_profile(&self.pool, record_id)
            .await
            .map(|row| row.map(DemographicProfile::from))
            .map_err(|e| EngineError::ProfileLookup(e.to_string()))
    }
}

impl RecordSource for RecordDb {
    async fn records(&self) -> Result<Vec<IndexRecord>> {
        crud::get_all_records(&self.pool)
            .await?
            .into_iter()
            .map(|row| Ok(IndexRecord::new(row.record_id, decode_vector(&row.vector)?)))
            .collect()
    }
}
