use thiserror::Error;

/// 引擎内部错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    /// 请求参数不合法，例如向量维度错误、k 为 0
    #[error("参数错误: {0}")]
    Validation(String),

    /// 插入了已存在的记录 ID
    #[error("记录已存在: {0}")]
    DuplicateRecord(String),

    /// 索引文件损坏或结构不正确
    #[error("索引文件损坏: {0}")]
    IndexCorruption(String),

    /// 索引为空或尚未构建
    #[error("索引不可用: {0}")]
    IndexUnavailable(String),

    /// 查询用户画像失败
    #[error("画像查询失败: {0}")]
    ProfileLookup(String),

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EngineError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
