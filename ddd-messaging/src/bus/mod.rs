//! 事件总线（EventBus）
//!
//! 集成事件的发布端：
//! - 进程内模式（`InProcessEventBus`）：直接交给订阅该事件的各模块 Inbox；
//! - 外部通道模式（`BrokerEventBus`）：序列化为字节交给外部消息通道，
//!   由 `BrokerConsumerJob` 在接收端异步投递到各模块 Inbox。
//!
//! 两种模式均只接受白名单内的事件种类。
//!
use crate::serializer::{EventSerializer, IntegrationEnvelope};
use async_trait::async_trait;
use ddd_domain::domain_event::IntegrationEvent;
use ddd_domain::error::DomainResult;

pub mod broker;
pub mod in_process;

pub use broker::{BrokerChannel, BrokerConsumerJob, BrokerEventBus, InMemoryBroker};
pub use in_process::InProcessEventBus;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// 事件编码所用的序列化器（含白名单）
    fn serializer(&self) -> &EventSerializer;

    async fn publish(&self, envelope: IntegrationEnvelope) -> DomainResult<()>;
}

impl dyn EventBus {
    /// 编码并发布一个集成事件
    pub async fn publish_event<E: IntegrationEvent>(&self, event: &E) -> DomainResult<()> {
        let envelope = self.serializer().encode(event)?;
        self.publish(envelope).await
    }
}
