use std::fmt;
use std::path::Path;

use log::{error, info, warn};

use super::{IndexMetadata, VectorIndex};
use crate::error::EngineError;
use crate::metrics;
use crate::profile::RecordSource;

/// 启动时恢复索引的结果
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// 索引文件校验通过
    Loaded(IndexMetadata),
    /// 索引文件损坏，已从数据源重建
    Rebuilt(IndexMetadata),
    /// 没有索引文件，从数据源冷启动
    ColdStart(IndexMetadata),
    /// 无法恢复，索引为空且标记为不一致
    Degraded(String),
}

impl RecoveryOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Loaded(_) => "loaded",
            Self::Rebuilt(_) => "rebuilt",
            Self::ColdStart(_) => "cold_start",
            Self::Degraded(_) => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(m) | Self::Rebuilt(m) | Self::ColdStart(m) => {
                write!(f, "{} ({} 条向量)", self.label(), m.total_vectors)
            }
            Self::Degraded(reason) => write!(f, "degraded ({reason})"),
        }
    }
}

/// 恢复索引
///
/// `path` 为 `None` 时不读取文件，直接从数据源构建。
/// 任何失败都不会向上抛出：最坏的情况下索引为空并报告不一致。
pub async fn restore<S: RecordSource>(
    index: &dyn VectorIndex,
    path: Option<&Path>,
    source: &S,
    rebuild_on_corruption: bool,
) -> RecoveryOutcome {
    let outcome = match path {
        Some(path) if path.exists() => match index.load(path) {
            Ok(meta) => RecoveryOutcome::Loaded(meta),
            Err(e) => {
                match &e {
                    EngineError::IndexCorruption(_) => warn!("索引文件损坏: {e}"),
                    _ => warn!("索引文件读取失败: {e}"),
                }
                if rebuild_on_corruption {
                    info!("从数据源重建索引");
                    rebuild(index, source, RecoveryOutcome::Rebuilt).await
                } else {
                    index.mark_inconsistent();
                    RecoveryOutcome::Degraded(e.to_string())
                }
            }
        },
        _ => rebuild(index, source, RecoveryOutcome::ColdStart).await,
    };

    match &outcome {
        RecoveryOutcome::Degraded(_) => error!("索引恢复失败: {outcome}"),
        _ => info!("索引就绪: {outcome}"),
    }
    metrics::inc_index_recovery(outcome.label());
    outcome
}

async fn rebuild<S: RecordSource>(
    index: &dyn VectorIndex,
    source: &S,
    on_success: fn(IndexMetadata) -> RecoveryOutcome,
) -> RecoveryOutcome {
    let records = match source.records().await {
        Ok(records) => records,
        Err(e) => {
            index.mark_inconsistent();
            return RecoveryOutcome::Degraded(format!("数据源不可用: {e}"));
        }
    };
    match index.rebuild_from_source(&mut records.into_iter()) {
        Ok(meta) => on_success(meta),
        Err(e) => {
            index.mark_inconsistent();
            RecoveryOutcome::Degraded(e.to_string())
        }
    }
}
