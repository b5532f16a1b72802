//! 模块级装配（MessagingModule）
//!
//! 一个业务模块拥有自己的存储、Outbox/Inbox 处理器注册表与作业配置；
//! 由它产出工作单元、Inbox 接收端以及两个处理作业。
//!
use crate::bus::EventBus;
use crate::clock::{Clock, SystemClock};
use crate::config::ModuleSettings;
use crate::feature_flags::FeatureFlags;
use crate::handler::EventHandler;
use crate::inbox::Inbox;
use crate::message::MessageBox;
use crate::outbox::UnitOfWork;
use crate::processor::MessageProcessor;
use crate::registry::HandlerRegistry;
use crate::retry::RetryPolicy;
use crate::store::MessageStore;
use ddd_domain::domain_event::{DomainEvent, IntegrationEvent};
use ddd_domain::error::DomainResult;
use std::sync::Arc;

pub struct MessagingModule<St: MessageStore> {
    name: String,
    store: Arc<St>,
    settings: ModuleSettings,
    retry_policy: RetryPolicy,
    outbox_handlers: HandlerRegistry<St::Session>,
    inbox_handlers: HandlerRegistry<St::Session>,
}

impl<St: MessageStore> MessagingModule<St> {
    pub fn new(name: impl Into<String>, store: Arc<St>, settings: ModuleSettings) -> Self {
        Self {
            name: name.into(),
            store,
            settings,
            retry_policy: RetryPolicy::default(),
            outbox_handlers: HandlerRegistry::new(),
            inbox_handlers: HandlerRegistry::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<St> {
        &self.store
    }

    pub fn settings(&self) -> &ModuleSettings {
        &self.settings
    }

    /// 注册本模块领域事件的处理器（由 Outbox 作业调用）
    pub fn on_domain_event<E, H>(&mut self, handler: H) -> DomainResult<&mut Self>
    where
        E: DomainEvent,
        H: EventHandler<E, St::Session>,
    {
        self.outbox_handlers.register::<E, H>(handler)?;
        Ok(self)
    }

    /// 订阅集成事件（由 Inbox 作业调用）
    pub fn on_integration_event<E, H>(&mut self, handler: H) -> DomainResult<&mut Self>
    where
        E: IntegrationEvent,
        H: EventHandler<E, St::Session>,
    {
        self.inbox_handlers.register::<E, H>(handler)?;
        Ok(self)
    }

    pub async fn unit_of_work(&self) -> DomainResult<UnitOfWork<'_, St>> {
        UnitOfWork::begin(self.store.as_ref()).await
    }

    /// 本模块的 Inbox，只接收已订阅的事件种类
    pub fn inbox(&self) -> Arc<Inbox<St>> {
        Arc::new(Inbox::new(
            self.name.clone(),
            self.store.clone(),
            self.inbox_handlers.kinds(),
        ))
    }

    pub fn processor(
        &self,
        mailbox: MessageBox,
        event_bus: Arc<dyn EventBus>,
        feature_flags: Arc<dyn FeatureFlags>,
        clock: Arc<dyn Clock>,
    ) -> DomainResult<MessageProcessor<St>> {
        let registry = match mailbox {
            MessageBox::Outbox => self.outbox_handlers.clone(),
            MessageBox::Inbox => self.inbox_handlers.clone(),
        };
        MessageProcessor::builder()
            .module(self.name.clone())
            .mailbox(mailbox)
            .store(self.store.clone())
            .registry(registry)
            .event_bus(event_bus)
            .feature_flags(feature_flags)
            .settings(self.settings.job(mailbox))
            .retry_policy(self.retry_policy.clone())
            .clock(clock)
            .build()
    }

    /// Outbox 与 Inbox 两个处理作业（使用系统时钟）
    pub fn processors(
        &self,
        event_bus: Arc<dyn EventBus>,
        feature_flags: Arc<dyn FeatureFlags>,
    ) -> DomainResult<[MessageProcessor<St>; 2]> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok([
            self.processor(
                MessageBox::Outbox,
                event_bus.clone(),
                feature_flags.clone(),
                clock.clone(),
            )?,
            self.processor(MessageBox::Inbox, event_bus, feature_flags, clock)?,
        ])
    }
}
