//! 应用装配：两个模块各自一份数据库，经进程内事件总线连接
//!
use crate::{customers, orders};
use ddd_domain::error::DomainResult;
use ddd_messaging::{
    EventBus, EventSerializer, FeatureFlags, InProcessEventBus, MemoryDatabase, MessagingModule,
    MessagingSettings, Scheduler, SchedulerHandle, StaticFeatureFlags, job_flag_path,
};
use std::sync::Arc;
use tracing::info;

pub struct Shop {
    pub orders: MessagingModule<MemoryDatabase>,
    pub customers: MessagingModule<MemoryDatabase>,
    pub event_bus: Arc<InProcessEventBus>,
    pub feature_flags: Arc<StaticFeatureFlags>,
}

impl Shop {
    pub fn new(settings: &MessagingSettings) -> DomainResult<Self> {
        settings.validate()?;

        let mut orders = MessagingModule::new(
            orders::MODULE,
            Arc::new(MemoryDatabase::new()),
            settings.module(orders::MODULE),
        );
        orders::register(&mut orders)?;

        let mut customers = MessagingModule::new(
            customers::MODULE,
            Arc::new(MemoryDatabase::new()),
            settings.module(customers::MODULE),
        );
        customers::register(&mut customers)?;

        let serializer = EventSerializer::new()
            .allow::<orders::OrderPlacedIntegrationEvent>()
            .allow::<orders::OrderCancelledIntegrationEvent>();
        let event_bus = Arc::new(InProcessEventBus::new(serializer));
        event_bus.subscribe(customers.inbox());

        let feature_flags = Arc::new(StaticFeatureFlags::new());
        for module in [orders::MODULE, customers::MODULE] {
            for job in ["process_outbox", "process_inbox"] {
                feature_flags.set(job_flag_path(module, job), true);
            }
        }

        Ok(Self {
            orders,
            customers,
            event_bus,
            feature_flags,
        })
    }

    pub fn scheduler(&self) -> DomainResult<Scheduler> {
        let bus: Arc<dyn EventBus> = self.event_bus.clone();
        let flags: Arc<dyn FeatureFlags> = self.feature_flags.clone();
        let mut scheduler = Scheduler::new(flags.clone());
        for module in [&self.orders, &self.customers] {
            for processor in module.processors(bus.clone(), flags.clone())? {
                scheduler.add(Arc::new(processor))?;
            }
        }
        Ok(scheduler)
    }

    pub fn start(&self) -> DomainResult<SchedulerHandle> {
        let scheduler = self.scheduler()?;
        info!(jobs = ?scheduler.job_names().collect::<Vec<_>>(), "starting messaging jobs");
        Ok(scheduler.start())
    }
}
