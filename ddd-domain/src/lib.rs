//! DDD 领域层基础库（ddd-domain）
//!
//! 为模块化单体中的可靠事件投递提供领域侧的最小抽象：
//! - 事件（`domain_event`）：以稳定的种类标识（`KIND`）区分领域事件与集成事件；
//! - 实体与聚合（`entity`、`aggregate`）：聚合在改变状态时登记待发布的领域事件；
//! - 记录（`record`）：业务表中的一行，可标记为只读缓存投影；
//! - 统一错误（`error`）。
//!
//! 本 crate 不涉及存储与传输，Outbox/Inbox 引擎见 `ddd-messaging`。
//!
//! 典型用法：
//! 1. 使用 `#[domain_event(kind = "...")]` / `#[integration_event(kind = "...")]` 定义事件；
//! 2. 在聚合的命令方法中调用 `RaisedEvents::raise` 登记领域事件；
//! 3. 由工作单元在同一事务中持久化聚合与 Outbox 记录。
//!
pub mod aggregate;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod record;

// 允许在本 crate 内部通过 ::ddd_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::ddd_domain 路径。
extern crate self as ddd_domain;

/// 过程宏展开时使用的依赖路径，调用方无需直接依赖 chrono/uuid。
#[doc(hidden)]
pub mod __private {
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
