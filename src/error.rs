use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 源文件结构损坏，整个读取失败
    #[error("源文件结构损坏 (偏移: {offset}): {message}")]
    MalformedSource { offset: u64, message: String },

    /// 字段解码失败（时间戳、标签、数值）
    #[error("字段解析失败 ({field} = {value:?}): {reason}")]
    Format {
        field: String,
        value: String,
        reason: String,
    },

    /// 数据集中出现重复的问题ID
    #[error("问题ID重复: {id}")]
    DuplicateKey { id: String },

    /// 输出文件已存在且非空，且未允许覆盖
    #[error("输出文件已存在且非空: {path}")]
    OutputExists { path: String },

    /// 答案生成失败
    #[error("问题 {question_id} 生成答案失败: {source}")]
    Remote {
        question_id: String,
        #[source]
        source: RemoteError,
    },

    /// 文件读写失败
    #[error("文件错误 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 快照 JSON 编解码失败
    #[error("快照文件错误 ({path}): {source}")]
    Snapshot {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

/// 远程生成服务返回的不可恢复错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// 请求被服务端拒绝（内容审核、额度不足等）
    #[error("请求被拒绝: {0}")]
    Rejected(String),

    /// 返回内容为空
    #[error("返回内容为空 (模型: {model})")]
    EmptyContent { model: String },

    /// 单次调用超时
    #[error("请求超时 ({limit:?})")]
    Timeout { limit: Duration },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建源文件结构错误
    pub fn malformed_source(offset: u64, source: impl std::fmt::Display) -> Self {
        AppError::MalformedSource {
            offset,
            message: source.to_string(),
        }
    }

    /// 创建字段解析错误
    pub fn format(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        AppError::Format {
            field: field.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建文件读写错误
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// 创建远程生成错误
    pub fn remote(question_id: impl Into<String>, source: RemoteError) -> Self {
        AppError::Remote {
            question_id: question_id.into(),
            source,
        }
    }

    /// 出错的问题ID（如果有）
    pub fn question_id(&self) -> Option<&str> {
        match self {
            AppError::Remote { question_id, .. } => Some(question_id),
            AppError::DuplicateKey { id } => Some(id),
            _ => None,
        }
    }
}

impl RemoteError {
    pub fn timeout(limit: Duration) -> Self {
        RemoteError::Timeout { limit }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
