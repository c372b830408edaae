use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use tokio::task::spawn_blocking;
use tokio::time::{Instant, timeout_at};
use utoipa::ToSchema;

use crate::demographic::{DemographicProfile, DemographicSimilarity};
use crate::error::{EngineError, Result};
use crate::index::{Neighbor, VectorIndex};
use crate::metrics;
use crate::normalize::validate_vector;
use crate::profile::ProfileStore;
use crate::scoring::{Weights, combine};

/// 搜索参数
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// 默认混合权重，请求未指定时使用
    pub weights: Weights,
    /// 候选集扩张倍数，向索引请求 `k * expansion` 条结果后再重排
    pub expansion: usize,
    /// 单次画像查询的超时时间
    pub lookup_timeout: Duration,
    /// 整个请求的时间预算
    pub budget: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            expansion: 3,
            lookup_timeout: Duration::from_millis(300),
            budget: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: Vec<f32>,
    pub k: usize,
    /// 请求者的人口统计信息，为空时只按视觉相似度排序
    pub context: Option<DemographicProfile>,
    pub weights: Option<Weights>,
}

impl SearchRequest {
    pub fn new(query: Vec<f32>, k: usize) -> Self {
        Self { query, k, context: None, weights: None }
    }

    pub fn context(mut self, context: DemographicProfile) -> Self {
        self.context = Some(context);
        self
    }

    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = Some(weights);
        self
    }
}

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchResult {
    pub record_id: String,
    /// 余弦相似度，范围 [-1, 1]
    pub visual_similarity: f32,
    /// 人口统计相似度，范围 [0, 1]，无法计算时为 null
    pub demographic_similarity: Option<f32>,
    pub combined_score: f32,
    /// 该结果仅按视觉相似度评分
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// 任意一条结果使用了回退评分
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Copy)]
enum SearchStage {
    QueryReceived,
    Normalized,
    CandidatesFetched,
    DemographicsResolved,
    Scored,
    RankedResultsReturned,
}

/// 搜索流程：索引召回 -> 并发查询画像 -> 混合评分 -> 排序截断
pub struct SearchOrchestrator<S> {
    index: Arc<dyn VectorIndex>,
    store: Arc<S>,
    similarity: DemographicSimilarity,
    config: SearchConfig,
}

impl<S: ProfileStore> SearchOrchestrator<S> {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        store: Arc<S>,
        similarity: DemographicSimilarity,
        config: SearchConfig,
    ) -> Self {
        Self { index, store, similarity, config }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let deadline = start + self.config.budget;
        let stage = |s: SearchStage| {
            debug!("[{:>8.2}ms] {s:?}", start.elapsed().as_secs_f32() * 1000.);
        };
        stage(SearchStage::QueryReceived);

        if request.k == 0 {
            return Err(EngineError::Validation("k 必须大于 0".to_string()));
        }
        let weights = request.weights.unwrap_or(self.config.weights);
        weights.validate()?;
        validate_vector(&request.query, self.index.dimension())?;
        if self.index.is_empty() {
            return Err(EngineError::IndexUnavailable("索引为空".to_string()));
        }
        stage(SearchStage::Normalized);

        let k_expanded = request.k.saturating_mul(self.config.expansion.max(1));
        let index = self.index.clone();
        let query = request.query;
        let candidates = spawn_blocking(move || index.search(&query, k_expanded))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))??;
        stage(SearchStage::CandidatesFetched);

        let context = request.context.filter(|c| !c.is_unknown());
        let demographics = match &context {
            Some(ctx) => self.resolve(ctx, &candidates, deadline).await,
            None => vec![None; candidates.len()],
        };
        stage(SearchStage::DemographicsResolved);

        let mut results = candidates
            .into_iter()
            .zip(demographics)
            .map(|(neighbor, demographic)| {
                let score = combine(neighbor.similarity, demographic, &weights);
                SearchResult {
                    record_id: neighbor.record_id,
                    visual_similarity: neighbor.similarity,
                    demographic_similarity: demographic,
                    combined_score: score.score,
                    fallback_used: score.fallback,
                }
            })
            .collect::<Vec<_>>();
        stage(SearchStage::Scored);

        results.sort_by(rank);
        results.truncate(request.k);

        let fallback_count = results.iter().filter(|r| r.fallback_used).count();
        metrics::inc_search_count(context.is_some());
        metrics::inc_fallback_results(fallback_count);
        metrics::observe_search_duration(start.elapsed().as_secs_f32());
        stage(SearchStage::RankedResultsReturned);

        Ok(SearchResponse { results, fallback_used: fallback_count > 0 })
    }

    /// 并发查询候选画像并计算人口统计相似度，顺序与候选一致
    async fn resolve(
        &self,
        context: &DemographicProfile,
        candidates: &[Neighbor],
        deadline: Instant,
    ) -> Vec<Option<f32>> {
        let lookups = candidates.iter().map(|c| self.lookup(&c.record_id, deadline));
        join_all(lookups)
            .await
            .into_iter()
            .map(|profile| profile.and_then(|p| self.similarity.similarity(context, &p)))
            .collect()
    }

    async fn lookup(&self, record_id: &str, deadline: Instant) -> Option<DemographicProfile> {
        let until = deadline.min(Instant::now() + self.config.lookup_timeout);
        match timeout_at(until, self.store.get_profile(record_id)).await {
            Ok(Ok(Some(profile))) => Some(profile),
            Ok(Ok(None)) => {
                debug!("记录 {record_id} 没有画像");
                None
            }
            Ok(Err(e)) => {
                warn!("查询记录 {record_id} 的画像失败: {e}");
                metrics::inc_lookup_failure("error");
                None
            }
            Err(_) => {
                warn!("查询记录 {record_id} 的画像超时");
                metrics::inc_lookup_failure("timeout");
                None
            }
        }
    }
}

/// 综合分数降序，视觉相似度降序，记录 ID 升序
fn rank(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then(b.visual_similarity.total_cmp(&a.visual_similarity))
        .then_with(|| a.record_id.cmp(&b.record_id))
}
