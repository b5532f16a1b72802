//! 事件处理器（EventHandler）与处理上下文
//!
//! 处理器按事件类型强类型注册，经由 `HandlerContext` 获得本次投递的全部环境：
//! 存储会话（事务）、所属模块、当前消息、事件总线与特性开关。
//!
use crate::bus::EventBus;
use crate::cache_scope::{CacheScoped, CacheWriteGuard};
use crate::feature_flags::FeatureFlags;
use crate::message::MessageBox;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddd_domain::domain_event::{Event, IntegrationEvent};
use ddd_domain::error::DomainResult;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// 一次消息投递的环境（与具体处理器无关）
#[derive(Clone, Copy)]
pub struct Delivery<'a> {
    pub module: &'a str,
    pub mailbox: MessageBox,
    pub message_id: Uuid,
    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
    pub now: DateTime<Utc>,
    pub event_bus: &'a Arc<dyn EventBus>,
    pub feature_flags: &'a Arc<dyn FeatureFlags>,
}

/// 处理器上下文
pub struct HandlerContext<'a, S> {
    session: &'a mut S,
    handler: &'a str,
    delivery: Delivery<'a>,
}

impl<'a, S> HandlerContext<'a, S> {
    pub fn new(session: &'a mut S, handler: &'a str, delivery: Delivery<'a>) -> Self {
        Self {
            session,
            handler,
            delivery,
        }
    }

    /// 当前事务；处理器的全部副作用都应经由它写入
    pub fn session(&mut self) -> &mut S {
        self.session
    }

    pub fn handler(&self) -> &str {
        self.handler
    }

    pub fn module(&self) -> &str {
        self.delivery.module
    }

    pub fn mailbox(&self) -> MessageBox {
        self.delivery.mailbox
    }

    pub fn message_id(&self) -> Uuid {
        self.delivery.message_id
    }

    pub fn attempt(&self) -> u32 {
        self.delivery.attempt
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.delivery.now
    }

    pub fn event_bus(&self) -> &Arc<dyn EventBus> {
        self.delivery.event_bus
    }

    pub fn feature_flags(&self) -> &Arc<dyn FeatureFlags> {
        self.delivery.feature_flags
    }

    /// 发布集成事件；返回的 future 只借用事件总线，不借用会话
    pub fn publish<'e, E: IntegrationEvent>(
        &self,
        event: &'e E,
    ) -> impl Future<Output = DomainResult<()>> + Send + 'e
    where
        'a: 'e,
    {
        let bus = self.delivery.event_bus;
        async move { bus.publish_event(event).await }
    }
}

impl<S: CacheScoped> HandlerContext<'_, S> {
    /// 打开缓存写入作用域，守卫释放时关闭
    pub fn allow_cache_writes(&mut self) -> CacheWriteGuard<'_, S> {
        self.session.allow_writes()
    }
}

/// 处理某一事件类型 `E` 的处理器，`S` 为所属模块存储的会话类型
#[async_trait]
pub trait EventHandler<E: Event, S: Send>: Send + Sync + 'static {
    /// 稳定的处理器名称，作为消费者记录的一部分
    fn handler_name(&self) -> &str;

    async fn handle(&self, event: E, ctx: &mut HandlerContext<'_, S>) -> anyhow::Result<()>;
}
