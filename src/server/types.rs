use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::NewRecord;
use crate::demographic::DemographicProfile;
use crate::scoring::Weights;
use crate::searcher::SearchResult;

/// 请求者的人口统计信息
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DemographicContext {
    pub ethnicity: Option<String>,
    pub skin_type: Option<u8>,
    pub age: Option<u32>,
}

impl From<DemographicContext> for DemographicProfile {
    fn from(ctx: DemographicContext) -> Self {
        Self { record_id: None, ethnicity: ctx.ethnicity, skin_type: ctx.skin_type, age: ctx.age }
    }
}

/// 搜索请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 查询向量，维度需与索引一致
    pub query_vector: Vec<f32>,
    /// 返回的结果数量
    pub k: i64,
    #[serde(default)]
    pub demographic_context: Option<DemographicContext>,
    /// 覆盖默认混合权重
    #[serde(default)]
    pub weights: Option<Weights>,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchReply {
    pub results: Vec<SearchResult>,
    /// 是否有结果仅按视觉相似度评分
    pub fallback_used: bool,
    /// 搜索耗时，单位为毫秒
    pub time: u64,
}

/// 添加记录请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddRecordsRequest {
    pub records: Vec<NewRecord>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddRecordsReply {
    /// 成功添加的记录数
    pub added: usize,
}
