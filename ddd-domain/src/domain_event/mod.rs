//! 领域事件（Domain Event）与集成事件（Integration Event）
//!
//! 定义事件载荷需要实现的最小接口（`Event` 及其两种角色），以及聚合内部用于
//! 暂存待发布事件的 `RaisedEvents` 缓冲区。

mod domain_event_trait;
mod raised_events;

pub use domain_event_trait::{DomainEvent, Event, IntegrationEvent};
pub use raised_events::{AnyDomainEvent, RaisedEvent, RaisedEvents};
