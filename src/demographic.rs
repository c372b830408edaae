use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Result, ensure};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 人口统计画像，任意字段都可能缺失
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DemographicProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// 族裔标签，会经过别名表归一
    #[serde(default)]
    pub ethnicity: Option<String>,
    /// 肤色等级，取值范围由配置的量表决定
    #[serde(default)]
    pub skin_type: Option<u8>,
    /// 年龄
    #[serde(default)]
    pub age: Option<u32>,
}

impl DemographicProfile {
    /// 所有字段都缺失
    pub fn is_unknown(&self) -> bool {
        self.ethnicity.is_none() && self.skin_type.is_none() && self.age.is_none()
    }
}

/// 肤色等级量表，例如 Fitzpatrick I-VI 或 Monk 1-10
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinScale {
    pub name: String,
    pub min: u8,
    pub max: u8,
}

impl SkinScale {
    pub fn fitzpatrick() -> Self {
        Self { name: "fitzpatrick".to_string(), min: 1, max: 6 }
    }

    pub fn contains(&self, value: u8) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// 量表跨度，min 不小于 max 时为 0
    pub fn max_distance(&self) -> f32 {
        (self.max as f32 - self.min as f32).max(0.0)
    }
}

/// 人口统计相似度使用的数据表，从配置目录下的 demographics.json 加载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicTables {
    /// 已知的族裔类别，为空时接受任意标签
    pub ethnicities: Vec<String>,
    /// 别名 -> 标准类别
    pub ethnicity_aliases: HashMap<String, String>,
    pub skin_scale: SkinScale,
    /// 年龄差达到该值时年龄相似度降为 0
    pub age_normalization_constant: u32,
}

impl Default for DemographicTables {
    fn default() -> Self {
        let ethnicities = [
            "african",
            "east_asian",
            "south_asian",
            "southeast_asian",
            "european",
            "hispanic",
            "middle_eastern",
            "indigenous",
            "pacific_islander",
            "mixed",
        ];
        let aliases = [
            ("black", "african"),
            ("white", "european"),
            ("caucasian", "european"),
            ("latino", "hispanic"),
            ("latina", "hispanic"),
            ("latinx", "hispanic"),
            ("asian", "east_asian"),
            ("indian", "south_asian"),
            ("arab", "middle_eastern"),
        ];
        Self {
            ethnicities: ethnicities.iter().map(|s| s.to_string()).collect(),
            ethnicity_aliases: aliases.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            skin_scale: SkinScale::fitzpatrick(),
            age_normalization_constant: 20,
        }
    }
}

impl DemographicTables {
    /// 从文件加载，文件不存在时使用内置默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("{} 不存在，使用默认人口统计配置", path.display());
            return Ok(Self::default());
        }
        info!("加载人口统计配置: {}", path.display());
        let tables: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.skin_scale.min < self.skin_scale.max, "肤色量表范围无效");
        ensure!(self.age_normalization_constant > 0, "年龄归一化常数必须大于 0");
        Ok(())
    }

    /// 将族裔标签规范化：小写、空格和连字符替换为下划线、查别名表
    ///
    /// 不在已知类别中的标签视为缺失
    pub fn canonical_ethnicity(&self, label: &str) -> Option<String> {
        let key = label.trim().to_lowercase().replace([' ', '-'], "_");
        if key.is_empty() {
            return None;
        }
        let key = self.ethnicity_aliases.get(&key).cloned().unwrap_or(key);
        if self.ethnicities.is_empty() || self.ethnicities.contains(&key) {
            Some(key)
        } else {
            debug!("未知的族裔标签: {label}");
            None
        }
    }
}

/// 人口统计相似度
pub struct DemographicSimilarity {
    tables: DemographicTables,
}

impl DemographicSimilarity {
    pub fn new(tables: DemographicTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &DemographicTables {
        &self.tables
    }

    /// 相同为 1，不同为 0
    pub fn ethnicity_score(&self, a: Option<&str>, b: Option<&str>) -> Option<f32> {
        let a = self.tables.canonical_ethnicity(a?)?;
        let b = self.tables.canonical_ethnicity(b?)?;
        Some(if a == b { 1.0 } else { 0.0 })
    }

    /// `1 - |a - b| / 量表跨度`
    pub fn skin_type_score(&self, a: Option<u8>, b: Option<u8>) -> Option<f32> {
        let scale = &self.tables.skin_scale;
        let (a, b) = (a.filter(|v| scale.contains(*v))?, b.filter(|v| scale.contains(*v))?);
        let diff = (a as f32 - b as f32).abs();
        let span = scale.max_distance();
        if span == 0.0 {
            // 只有一个等级，量表内的值必然相同
            return Some(1.0);
        }
        Some((1.0 - diff / span).clamp(0.0, 1.0))
    }

    /// `1 - min(|a - b| / 归一化常数, 1)`
    pub fn age_score(&self, a: Option<u32>, b: Option<u32>) -> Option<f32> {
        let diff = a?.abs_diff(b?) as f32;
        let c = self.tables.age_normalization_constant as f32;
        if c == 0.0 {
            return Some(if diff == 0.0 { 1.0 } else { 0.0 });
        }
        Some(1.0 - (diff / c).min(1.0))
    }

    /// 可计算子分数的算术平均，没有任何可计算的子分数时返回 `None`
    pub fn similarity(&self, a: &DemographicProfile, b: &DemographicProfile) -> Option<f32> {
        let scores = [
            self.ethnicity_score(a.ethnicity.as_deref(), b.ethnicity.as_deref()),
            self.skin_type_score(a.skin_type, b.skin_type),
            self.age_score(a.age, b.age),
        ];
        let (sum, n) =
            scores.iter().flatten().fold((0.0f32, 0usize), |(sum, n), s| (sum + s, n + 1));
        (n > 0).then(|| sum / n as f32)
    }
}
