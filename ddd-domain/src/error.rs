//! 领域层统一错误定义
//!
//! 聚焦序列化、事件总线、消息存储、配置与缓存投影写保护等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化/事件种类 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("event kind not allowed: {kind}")]
    DisallowedEventKind { kind: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 事件总线 ---
    #[error("event bus error: {reason}")]
    EventBus { reason: String },

    // --- 存储 ---
    #[error("message store error: {reason}")]
    MessageStore { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 缓存投影 ---
    #[error("cache projection `{entity}` is read-only outside a cache write scope")]
    ProjectionWriteDenied { entity: &'static str },

    // --- 配置 ---
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- 领域规则/命令与状态 ---
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

impl DomainError {
    pub fn event_bus(reason: impl Into<String>) -> Self {
        DomainError::EventBus {
            reason: reason.into(),
        }
    }

    pub fn message_store(reason: impl Into<String>) -> Self {
        DomainError::MessageStore {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        DomainError::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// 重试无法改变结果的错误（载荷损坏、种类不在白名单、写保护违规等）
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DomainError::Serde { .. }
                | DomainError::Parse { .. }
                | DomainError::DisallowedEventKind { .. }
                | DomainError::TypeMismatch { .. }
                | DomainError::ProjectionWriteDenied { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/uuid 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for DomainError {
    fn from(err: chrono::ParseError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
