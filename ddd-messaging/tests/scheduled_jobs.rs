use async_trait::async_trait;
use ddd_macros::domain_event;
use ddd_messaging::{
    EventHandler, EventSerializer, HandlerContext, InProcessEventBus, Job, JobSettings,
    MemoryDatabase, MemorySession, MessageBox, MessagingModule, ModuleSettings, Scheduler,
    StaticFeatureFlags,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[domain_event(kind = "tests.stock_adjusted")]
struct StockAdjusted {
    sku: String,
    delta: i32,
}

struct CountAdjustments(Arc<AtomicUsize>);

#[async_trait]
impl EventHandler<StockAdjusted, MemorySession> for CountAdjustments {
    fn handler_name(&self) -> &str {
        "count_adjustments"
    }

    async fn handle(
        &self,
        _event: StockAdjusted,
        _ctx: &mut HandlerContext<'_, MemorySession>,
    ) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn inventory(counter: Arc<AtomicUsize>) -> MessagingModule<MemoryDatabase> {
    let fast = JobSettings {
        interval_in_seconds: 1,
        batch_size: 10,
        max_retries: 1,
    };
    let mut module = MessagingModule::new(
        "inventory",
        Arc::new(MemoryDatabase::new()),
        ModuleSettings {
            outbox: fast,
            inbox: fast,
        },
    );
    module
        .on_domain_event::<StockAdjusted, _>(CountAdjustments(counter))
        .unwrap();
    module
}

async fn raise(module: &MessagingModule<MemoryDatabase>) {
    let mut uow = module.unit_of_work().await.unwrap();
    uow.add_event(&StockAdjusted {
        sku: "sku-1".into(),
        delta: -2,
    })
    .unwrap();
    uow.save_changes().await.unwrap();
}

fn schedule(
    module: &MessagingModule<MemoryDatabase>,
    flags: Arc<StaticFeatureFlags>,
) -> Scheduler {
    let bus = Arc::new(InProcessEventBus::new(EventSerializer::new()));
    let mut scheduler = Scheduler::new(flags.clone());
    for processor in module.processors(bus, flags).unwrap() {
        scheduler.add(Arc::new(processor)).unwrap();
    }
    scheduler
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enabled_outbox_job_drains_messages() {
    let counter = Arc::new(AtomicUsize::new(0));
    let module = inventory(counter.clone());
    raise(&module).await;

    let flags = Arc::new(
        StaticFeatureFlags::new().with("modules.inventory.jobs.process_outbox", true),
    );
    let scheduler = schedule(&module, flags);
    assert_eq!(
        scheduler.job_names().collect::<Vec<_>>(),
        vec!["inventory.process_outbox", "inventory.process_inbox"]
    );
    let handle = scheduler.start();

    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let rows = module.store().messages(MessageBox::Outbox).await;
            if rows.iter().all(|m| m.is_processed()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("outbox message should be processed");

    handle.shutdown();
    handle.join().await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_flag_keeps_messages_pending() {
    let counter = Arc::new(AtomicUsize::new(0));
    let module = inventory(counter.clone());
    raise(&module).await;

    let flags = Arc::new(
        StaticFeatureFlags::new()
            .with("modules.inventory.jobs.process_outbox", true)
            .with("modules.inventory", false),
    );
    let handle = schedule(&module, flags).start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.shutdown();
    handle.join().await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    let rows = module.store().messages(MessageBox::Outbox).await;
    assert!(rows.iter().all(|m| !m.is_processed()));
}

#[test]
fn processor_job_identity_and_flag() {
    let module = inventory(Arc::new(AtomicUsize::new(0)));
    let bus = Arc::new(InProcessEventBus::new(EventSerializer::new()));
    let [outbox, inbox] = module
        .processors(bus, Arc::new(StaticFeatureFlags::new()))
        .unwrap();
    assert_eq!(outbox.name(), "inventory.process_outbox");
    assert_eq!(outbox.feature_flag(), "modules.inventory.jobs.process_outbox");
    assert_eq!(inbox.feature_flag(), "modules.inventory.jobs.process_inbox");
    assert_eq!(inbox.interval(), Duration::from_secs(1));
}
