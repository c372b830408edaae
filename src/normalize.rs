use crate::error::{EngineError, Result};

/// 模长小于等于该值的向量视为零向量
pub const NORM_EPSILON: f64 = 1e-12;

/// 单位化后的向量，或者输入模长为零时的零向量
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVector {
    data: Vec<f32>,
    degenerate: bool,
}

impl NormalizedVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 输入向量模长为零，输出为全零向量
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }
}

/// 计算欧几里得范数，使用 f64 累加
#[inline(always)]
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt()
}

/// L2 单位化
///
/// 零向量（或模长极小的向量）原样返回全零向量，并通过 `is_degenerate` 告知调用方，
/// 不会产生 NaN/Inf。
pub fn normalize(v: &[f32]) -> NormalizedVector {
    let norm = l2_norm(v);
    if norm <= NORM_EPSILON {
        return NormalizedVector { data: vec![0.0; v.len()], degenerate: true };
    }
    let data = v.iter().map(|&x| (x as f64 / norm) as f32).collect();
    NormalizedVector { data, degenerate: false }
}

/// 内积，对单位向量而言即余弦相似度
#[inline(always)]
pub fn dot(va: &[f32], vb: &[f32]) -> f32 {
    debug_assert_eq!(va.len(), vb.len());
    va.iter().zip(vb).map(|(a, b)| a * b).sum()
}

/// 直接计算两个任意向量的余弦相似度，任意一方为零向量时返回 0
pub fn cosine_similarity(va: &[f32], vb: &[f32]) -> f32 {
    let (na, nb) = (l2_norm(va), l2_norm(vb));
    if na <= NORM_EPSILON || nb <= NORM_EPSILON {
        return 0.0;
    }
    let d: f64 = va.iter().zip(vb).map(|(&a, &b)| a as f64 * b as f64).sum();
    (d / (na * nb)) as f32
}

/// 检查向量维度与数值是否合法
pub fn validate_vector(v: &[f32], dimension: usize) -> Result<()> {
    if v.len() != dimension {
        return Err(EngineError::Validation(format!(
            "向量维度错误: 期望 {dimension}，实际 {}",
            v.len()
        )));
    }
    if let Some(pos) = v.iter().position(|x| !x.is_finite()) {
        return Err(EngineError::Validation(format!("向量第 {pos} 维不是有限数值")));
    }
    Ok(())
}
