use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// logoseek 的错误类型
///
/// 致命错误（Format / Corrupt / DimensionMismatch）直接向上传播；
/// NotFound 允许一次远端下载重试；Box 由候选过滤逐框兜底，不会中断整体流程。
#[derive(Debug, Error)]
pub enum Error {
    /// 特征文件名不符合命名约定，无法推断模型身份
    #[error("unrecognized feature file name: {0}")]
    Format(String),
    /// 特征文件在本地不存在
    #[error("feature file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// 特征文件内容损坏或各数组长度不一致
    #[error("corrupt feature file: {0}")]
    Corrupt(String),
    /// 无效的检测框
    #[error("bad bounding box: {0}")]
    Box(String),
    /// 查询向量与特征库的维数不一致
    #[error("embedding dimension mismatch: query has {query}, database has {database}")]
    DimensionMismatch { query: usize, database: usize },
    /// 远端下载失败
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
