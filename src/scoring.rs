use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{EngineError, Result};

/// 视觉相似度与人口统计相似度的混合权重，两者之和不要求为 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Weights {
    pub visual: f32,
    pub demographic: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self { visual: 0.7, demographic: 0.3 }
    }
}

impl Weights {
    pub fn new(visual: f32, demographic: f32) -> Self {
        Self { visual, demographic }
    }

    /// 权重必须为非负有限数，且和大于 0
    pub fn validate(&self) -> Result<()> {
        let ok = |w: f32| w.is_finite() && w >= 0.0;
        if !ok(self.visual) || !ok(self.demographic) {
            return Err(EngineError::Validation(format!("权重必须为非负有限数: {self:?}")));
        }
        if self.visual + self.demographic <= 0.0 {
            return Err(EngineError::Validation("权重之和必须大于 0".to_string()));
        }
        Ok(())
    }
}

/// 混合后的分数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedScore {
    pub score: f32,
    /// 没有人口统计信息，分数即为视觉相似度
    pub fallback: bool,
}

/// 混合视觉相似度与人口统计相似度
///
/// 人口统计相似度缺失时直接返回视觉相似度，并标记为回退。
pub fn combine(visual: f32, demographic: Option<f32>, weights: &Weights) -> CombinedScore {
    let total = weights.visual + weights.demographic;
    match demographic {
        Some(d) if total > 0.0 => CombinedScore {
            score: (weights.visual * visual + weights.demographic * d) / total,
            fallback: false,
        },
        _ => CombinedScore { score: visual, fallback: true },
    }
}
