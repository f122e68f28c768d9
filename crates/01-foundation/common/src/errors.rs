//! 错误类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 组件管理器错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("对象不存在: {message}")]
    NotFound { message: String },

    #[error("对象已存在: {message}")]
    AlreadyExists { message: String },

    #[error("状态无效: {message}")]
    InvalidState { message: String },

    #[error("操作超时: {message}")]
    Timeout { message: String },

    #[error("网络失败: {message}")]
    NetworkFailure { message: String },

    #[error("配置错误: {message}")]
    Config { message: String },

    #[error("内部不变量被破坏: {message}")]
    Internal { message: String },
}

impl ManagerError {
    /// 创建对象不存在错误
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// 创建对象已存在错误
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// 创建超时错误
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// 创建网络失败错误
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::Config { .. } => ErrorKind::Config,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// 错误描述（不含类别前缀）
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message }
            | Self::AlreadyExists { message }
            | Self::InvalidState { message }
            | Self::Timeout { message }
            | Self::NetworkFailure { message }
            | Self::Config { message }
            | Self::Internal { message } => message,
        }
    }

    /// 按类别重建错误，用于跨进程传递
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound { message },
            ErrorKind::AlreadyExists => Self::AlreadyExists { message },
            ErrorKind::InvalidState => Self::InvalidState { message },
            ErrorKind::Timeout => Self::Timeout { message },
            ErrorKind::NetworkFailure => Self::NetworkFailure { message },
            ErrorKind::Config => Self::Config { message },
            ErrorKind::Internal => Self::Internal { message },
        }
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 引用的进程/组件/接口不存在
    NotFound,
    /// 重复注册或重复连接
    AlreadyExists,
    /// 生命周期阶段不允许该操作
    InvalidState,
    /// 超出重试预算
    Timeout,
    /// 传输层失败
    NetworkFailure,
    /// 配置无效
    Config,
    /// 内部不变量被破坏
    Internal,
}

/// 可序列化的错误表示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// 错误类别
    pub kind: ErrorKind,
    /// 错误描述
    pub message: String,
}

impl From<&ManagerError> for WireError {
    fn from(error: &ManagerError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }
}

impl From<WireError> for ManagerError {
    fn from(error: WireError) -> Self {
        Self::from_kind(error.kind, error.message)
    }
}

/// 结果类型别名
pub type ManagerResult<T> = Result<T, ManagerError>;

/// 把名称列表格式化成错误信息中的候选项描述
///
/// 空列表时返回 `empty` 文本。
pub fn describe_available(names: &[String], empty: &str) -> String {
    if names.is_empty() {
        empty.to_string()
    } else {
        format!("可用的候选项: {}", names.join(" "))
    }
}
