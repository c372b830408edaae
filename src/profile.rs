use std::collections::HashMap;
use std::future::Future;

use parking_lot::RwLock;

use crate::demographic::DemographicProfile;
use crate::error::Result;
use crate::index::IndexRecord;

/// 按记录 ID 查询人口统计画像，记录不存在时返回 `None`
pub trait ProfileStore: Send + Sync {
    fn get_profile(
        &self,
        record_id: &str,
    ) -> impl Future<Output = Result<Option<DemographicProfile>>> + Send;
}

/// 重建索引时使用的全量数据源
pub trait RecordSource: Send + Sync {
    fn records(&self) -> impl Future<Output = Result<Vec<IndexRecord>>> + Send;
}

/// 内存中的画像与记录，用于测试或嵌入使用
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, DemographicProfile>>,
    records: RwLock<Vec<IndexRecord>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, record_id: impl Into<String>, mut profile: DemographicProfile) {
        let record_id = record_id.into();
        profile.record_id = Some(record_id.clone());
        self.profiles.write().insert(record_id, profile);
    }

    pub fn insert_record(&self, record: IndexRecord) {
        self.records.write().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, record_id: &str) -> Result<Option<DemographicProfile>> {
        Ok(self.profiles.read().get(record_id).cloned())
    }
}

impl RecordSource for MemoryProfileStore {
    async fn records(&self) -> Result<Vec<IndexRecord>> {
        Ok(self.records.read().clone())
    }
}
