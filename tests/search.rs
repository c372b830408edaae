use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rstest::*;
use tonematch::EngineError;
use tonematch::demographic::{DemographicProfile, DemographicSimilarity, DemographicTables};
use tonematch::index::{IndexRecord, MemoryIndex, VectorIndex};
use tonematch::profile::{MemoryProfileStore, ProfileStore};
use tonematch::scoring::Weights;
use tonematch::searcher::{SearchConfig, SearchOrchestrator, SearchRequest};

fn profile(ethnicity: &str, skin_type: u8, age: u32) -> DemographicProfile {
    DemographicProfile {
        record_id: None,
        ethnicity: Some(ethnicity.to_string()),
        skin_type: Some(skin_type),
        age: Some(age),
    }
}

fn requester() -> DemographicProfile {
    profile("asian", 3, 30)
}

/// 按记录 ID 延迟返回，并统计查询次数
struct SlowStore {
    inner: MemoryProfileStore,
    slow: HashSet<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowStore {
    fn new(inner: MemoryProfileStore, slow: &[&str], delay: Duration) -> Self {
        Self {
            inner,
            slow: slow.iter().map(|s| s.to_string()).collect(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ProfileStore for SlowStore {
    async fn get_profile(&self, record_id: &str) -> tonematch::Result<Option<DemographicProfile>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.slow.contains(record_id) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.get_profile(record_id).await
    }
}

struct FailingStore;

impl ProfileStore for FailingStore {
    async fn get_profile(&self, _: &str) -> tonematch::Result<Option<DemographicProfile>> {
        Err(EngineError::ProfileLookup("连接被拒绝".to_string()))
    }
}

/// x 视觉上最接近查询，y 的画像与请求者一致
#[fixture]
fn index() -> Arc<dyn VectorIndex> {
    let index = MemoryIndex::new(2);
    index
        .insert_batch(vec![
            IndexRecord::new("x", vec![1.0, 0.0]),
            IndexRecord::new("y", vec![0.9, 0.1]),
            IndexRecord::new("z", vec![0.0, 1.0]),
        ])
        .unwrap();
    Arc::new(index)
}

#[fixture]
fn store() -> MemoryProfileStore {
    let store = MemoryProfileStore::new();
    store.insert_profile("x", profile("black", 6, 70));
    store.insert_profile("y", profile("East Asian", 3, 31));
    store
}

fn orchestrator<S: ProfileStore>(
    index: Arc<dyn VectorIndex>,
    store: S,
    config: SearchConfig,
) -> SearchOrchestrator<S> {
    SearchOrchestrator::new(
        index,
        Arc::new(store),
        DemographicSimilarity::new(DemographicTables::default()),
        config,
    )
}

fn equal_weights() -> SearchConfig {
    SearchConfig { weights: Weights::new(0.5, 0.5), ..SearchConfig::default() }
}

#[rstest]
#[tokio::test]
async fn test_without_context_ranks_by_visual(
    index: Arc<dyn VectorIndex>,
    store: MemoryProfileStore,
) {
    let store = SlowStore::new(store, &[], Duration::ZERO);
    let searcher = orchestrator(index, store, equal_weights());

    let response = searcher.search(SearchRequest::new(vec![1.0, 0.0], 3)).await.unwrap();
    let ids: Vec<_> = response.results.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, ["x", "y", "z"]);
    assert!(response.fallback_used);
    for r in &response.results {
        assert!(r.fallback_used);
        assert_eq!(r.demographic_similarity, None);
        assert_eq!(r.combined_score, r.visual_similarity);
    }
    // 没有请求者信息时不查询画像
    assert_eq!(searcher.store().calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn test_demographics_rerank(index: Arc<dyn VectorIndex>, store: MemoryProfileStore) {
    let searcher = orchestrator(index, store, equal_weights());

    let response = searcher
        .search(SearchRequest::new(vec![1.0, 0.0], 2).context(requester()))
        .await
        .unwrap();
    let ids: Vec<_> = response.results.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, ["y", "x"]);

    let y = &response.results[0];
    // 族裔 1，肤色 1，年龄 1 - 1/20
    let expected = (1.0 + 1.0 + 0.95) / 3.0;
    assert!((y.demographic_similarity.unwrap() - expected).abs() < 1e-5);
    assert!((y.combined_score - (y.visual_similarity + expected) / 2.0).abs() < 1e-5);
    assert!(!y.fallback_used);

    let x = &response.results[1];
    // 族裔 0，肤色 1 - 3/5，年龄 0
    assert!((x.demographic_similarity.unwrap() - 0.4 / 3.0).abs() < 1e-5);
    assert!(!response.fallback_used);
}

#[rstest]
#[tokio::test]
async fn test_expansion_limits_candidates(index: Arc<dyn VectorIndex>) {
    let config = SearchConfig { expansion: 1, ..equal_weights() };
    let searcher = orchestrator(index.clone(), store(), config);
    let response = searcher
        .search(SearchRequest::new(vec![1.0, 0.0], 1).context(requester()))
        .await
        .unwrap();
    assert_eq!(response.results[0].record_id, "x");

    let searcher = orchestrator(index, store(), equal_weights());
    let response = searcher
        .search(SearchRequest::new(vec![1.0, 0.0], 1).context(requester()))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].record_id, "y");
}

#[rstest]
#[tokio::test]
async fn test_missing_profile_falls_back(
    index: Arc<dyn VectorIndex>,
    store: MemoryProfileStore,
) {
    let searcher = orchestrator(index, store, equal_weights());
    let response = searcher
        .search(SearchRequest::new(vec![0.0, 1.0], 3).context(requester()))
        .await
        .unwrap();

    let z = response.results.iter().find(|r| r.record_id == "z").unwrap();
    assert!(z.fallback_used);
    assert_eq!(z.combined_score, z.visual_similarity);
    assert!(response.fallback_used);
}

#[rstest]
#[tokio::test]
async fn test_lookup_errors_fall_back(index: Arc<dyn VectorIndex>) {
    let searcher = orchestrator(index, FailingStore, equal_weights());
    let response = searcher
        .search(SearchRequest::new(vec![1.0, 0.0], 3).context(requester()))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 3);
    assert!(response.results.iter().all(|r| r.fallback_used));
}

#[rstest]
#[tokio::test]
async fn test_slow_lookup_times_out(index: Arc<dyn VectorIndex>, store: MemoryProfileStore) {
    let store = SlowStore::new(store, &["y"], Duration::from_secs(10));
    let config = SearchConfig { lookup_timeout: Duration::from_millis(50), ..equal_weights() };
    let searcher = orchestrator(index, store, config);

    let start = Instant::now();
    let response = searcher
        .search(SearchRequest::new(vec![1.0, 0.0], 3).context(requester()))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    let y = response.results.iter().find(|r| r.record_id == "y").unwrap();
    assert!(y.fallback_used);
    let x = response.results.iter().find(|r| r.record_id == "x").unwrap();
    assert!(!x.fallback_used);
}

#[rstest]
#[tokio::test]
async fn test_budget_bounds_lookups(index: Arc<dyn VectorIndex>, store: MemoryProfileStore) {
    let store = SlowStore::new(store, &["x", "y"], Duration::from_secs(10));
    let config = SearchConfig {
        lookup_timeout: Duration::from_secs(30),
        budget: Duration::from_millis(100),
        ..equal_weights()
    };
    let searcher = orchestrator(index, store, config);

    let start = Instant::now();
    let response = searcher
        .search(SearchRequest::new(vec![1.0, 0.0], 2).context(requester()))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    let ids: Vec<_> = response.results.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(ids, ["x", "y"]);
    assert!(response.results.iter().all(|r| r.fallback_used));
}

#[rstest]
#[tokio::test]
async fn test_request_weights_override(index: Arc<dyn VectorIndex>, store: MemoryProfileStore) {
    let searcher = orchestrator(index, store, equal_weights());
    let response = searcher
        .search(
            SearchRequest::new(vec![1.0, 0.0], 2)
                .context(requester())
                .weights(Weights::new(1.0, 0.0)),
        )
        .await
        .unwrap();
    assert_eq!(response.results[0].record_id, "x");
    assert!((response.results[0].combined_score - 1.0).abs() < 1e-6);
}

#[rstest]
#[case(SearchRequest::new(vec![1.0, 0.0], 0))]
#[case(SearchRequest::new(vec![1.0, 0.0, 0.0], 1))]
#[case(SearchRequest::new(vec![f32::INFINITY, 0.0], 1))]
#[case(SearchRequest::new(vec![1.0, 0.0], 1).weights(Weights::new(-1.0, 0.5)))]
#[case(SearchRequest::new(vec![1.0, 0.0], 1).weights(Weights::new(0.0, 0.0)))]
#[tokio::test]
async fn test_invalid_requests(
    index: Arc<dyn VectorIndex>,
    store: MemoryProfileStore,
    #[case] request: SearchRequest,
) {
    let searcher = orchestrator(index, store, SearchConfig::default());
    assert!(matches!(searcher.search(request).await, Err(EngineError::Validation(_))));
}

#[rstest]
#[tokio::test]
async fn test_empty_index_is_unavailable(store: MemoryProfileStore) {
    let searcher = orchestrator(Arc::new(MemoryIndex::new(2)), store, SearchConfig::default());
    let r = searcher.search(SearchRequest::new(vec![1.0, 0.0], 1)).await;
    assert!(matches!(r, Err(EngineError::IndexUnavailable(_))));
}

#[rstest]
#[tokio::test]
async fn test_results_are_deterministic(index: Arc<dyn VectorIndex>, store: MemoryProfileStore) {
    let searcher = orchestrator(index, store, SearchConfig::default());
    let request = SearchRequest::new(vec![0.6, 0.4], 3).context(requester());
    let first = searcher.search(request.clone()).await.unwrap();
    for _ in 0..5 {
        assert_eq!(searcher.search(request.clone()).await.unwrap(), first);
    }
}
