use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::demographic::DemographicProfile;

/// 数据库中的一条记录
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    /// 自增主键，决定重建索引时的插入顺序
    pub id: i64,
    /// 外部记录 ID
    pub record_id: String,
    /// f32 小端序向量
    pub vector: Vec<u8>,
    pub ethnicity: Option<String>,
    pub skin_type: Option<i64>,
    pub age: Option<i64>,
}

/// 人口统计字段
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub record_id: String,
    pub ethnicity: Option<String>,
    pub skin_type: Option<i64>,
    pub age: Option<i64>,
}

impl From<ProfileRow> for DemographicProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            record_id: Some(row.record_id),
            ethnicity: row.ethnicity,
            // 超出范围的值当作缺失
            skin_type: row.skin_type.and_then(|v| u8::try_from(v).ok()),
            age: row.age.and_then(|v| u32::try_from(v).ok()),
        }
    }
}

/// 待添加的记录，同时也是 JSONL 导入格式
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewRecord {
    /// 记录 ID，全局唯一
    pub record_id: String,
    /// 特征向量，维度需与索引一致
    pub vector: Vec<f32>,
    /// 族裔标签
    #[serde(default)]
    pub ethnicity: Option<String>,
    /// 肤色类型
    #[serde(default)]
    pub skin_type: Option<u8>,
    /// 年龄
    #[serde(default)]
    pub age: Option<u32>,
}
