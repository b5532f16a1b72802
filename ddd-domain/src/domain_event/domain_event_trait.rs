use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use uuid::Uuid;

/// 事件载荷需要满足的通用能力边界
pub trait Event: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 稳定的事件种类标识（形如 `orders.order_placed`），用于路由与反序列化白名单。
    ///
    /// 一旦事件被持久化，种类标识即成为存储格式的一部分，不应随类型重命名而改变。
    const KIND: &'static str;
}

/// 领域事件：模块内部事实，经 Outbox 分发给本模块的领域事件处理器
pub trait DomainEvent: Event {}

/// 集成事件：跨模块契约，经事件总线送达其他模块的 Inbox
pub trait IntegrationEvent: Event {
    /// 事件唯一标识（Inbox 以此去重）
    fn event_id(&self) -> Uuid;

    /// 事件发生时间
    fn occurred_on(&self) -> DateTime<Utc>;
}
