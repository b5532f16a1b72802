use demo::customers::{self, CustomerOrderCache};
use demo::orders::{self, OrderPlacedIntegrationEvent, OrderStatus};
use demo::Shop;
use ddd_messaging::{
    Clock, EventBus, ManualClock, MemoryDatabase, MessageBox, MessageProcessor, MessagingSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    shop: Shop,
    clock: Arc<ManualClock>,
    orders_outbox: MessageProcessor<MemoryDatabase>,
    customers_inbox: MessageProcessor<MemoryDatabase>,
}

fn harness() -> Harness {
    let shop = Shop::new(&MessagingSettings::default()).unwrap();
    let clock = Arc::new(ManualClock::default());
    let orders_outbox = shop
        .orders
        .processor(
            MessageBox::Outbox,
            shop.event_bus.clone(),
            shop.feature_flags.clone(),
            clock.clone(),
        )
        .unwrap();
    let customers_inbox = shop
        .customers
        .processor(
            MessageBox::Inbox,
            shop.event_bus.clone(),
            shop.feature_flags.clone(),
            clock.clone(),
        )
        .unwrap();
    Harness {
        shop,
        clock,
        orders_outbox,
        customers_inbox,
    }
}

#[tokio::test]
async fn placed_order_reaches_customer_cache() {
    let h = harness();
    let token = CancellationToken::new();
    let order_id = orders::place_order(&h.shop.orders, "cust-1", 4_990)
        .await
        .unwrap();

    // 提交后尚未投递
    assert!(
        customers::orders_of(h.shop.customers.store(), "cust-1")
            .await
            .unwrap()
            .is_empty()
    );

    assert_eq!(h.orders_outbox.run_once(&token).await.unwrap().processed, 1);
    assert_eq!(h.customers_inbox.run_once(&token).await.unwrap().processed, 1);

    let cached = customers::orders_of(h.shop.customers.store(), "cust-1")
        .await
        .unwrap();
    assert_eq!(
        cached,
        vec![CustomerOrderCache {
            id: order_id,
            customer_id: "cust-1".into(),
            total_cents: 4_990,
            status: OrderStatus::Placed,
        }]
    );
}

#[tokio::test]
async fn replayed_integration_event_is_ignored() {
    let h = harness();
    let token = CancellationToken::new();
    let order_id = orders::place_order(&h.shop.orders, "cust-2", 100)
        .await
        .unwrap();
    h.orders_outbox.run_once(&token).await.unwrap();
    h.customers_inbox.run_once(&token).await.unwrap();

    let outbox_id = h.shop.orders.store().messages(MessageBox::Outbox).await[0].id();
    let bus: Arc<dyn EventBus> = h.shop.event_bus.clone();
    bus.publish_event(&OrderPlacedIntegrationEvent {
        event_id: outbox_id,
        occurred_on: h.clock.now(),
        order_id: order_id.clone(),
        customer_id: "cust-2".into(),
        total_cents: 999_999,
        status: OrderStatus::Placed,
    })
    .await
    .unwrap();

    assert_eq!(h.customers_inbox.run_once(&token).await.unwrap().fetched, 0);
    let inbox = h.shop.customers.store().messages(MessageBox::Inbox).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(
        h.shop
            .customers
            .store()
            .consumers(MessageBox::Inbox, outbox_id)
            .await,
        vec!["sync_placed_order".to_string()]
    );
    let cached: CustomerOrderCache = h
        .shop
        .customers
        .store()
        .get(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.total_cents, 100);
}

#[tokio::test]
async fn cancellation_converges_even_if_delivered_first() {
    let h = harness();
    let token = CancellationToken::new();
    let order_id = orders::place_order(&h.shop.orders, "cust-3", 2_500)
        .await
        .unwrap();
    orders::cancel_order(&h.shop.orders, &order_id).await.unwrap();

    assert_eq!(h.orders_outbox.run_once(&token).await.unwrap().processed, 2);
    let first = h.customers_inbox.run_once(&token).await.unwrap();
    assert_eq!(first.fetched, 2);
    assert_eq!(first.processed + first.retrying, 2);

    h.clock.advance(Duration::from_secs(5));
    h.customers_inbox.run_once(&token).await.unwrap();

    let cached = customers::orders_of(h.shop.customers.store(), "cust-3")
        .await
        .unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].status, OrderStatus::Cancelled);
    let inbox = h.shop.customers.store().messages(MessageBox::Inbox).await;
    assert!(inbox.iter().all(|m| m.is_processed() && m.error().is_none()));
}

#[tokio::test]
async fn cancelling_unknown_order_fails() {
    let h = harness();
    let err = orders::cancel_order(&h.shop.orders, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, orders::OrderError::NotFound(_)));
    assert!(
        h.shop
            .orders
            .store()
            .messages(MessageBox::Outbox)
            .await
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_jobs_sync_cache() {
    let settings = MessagingSettings::from_json_str(include_str!("../messaging.json")).unwrap();
    let shop = Shop::new(&settings).unwrap();
    let handle = shop.start().unwrap();
    let order_id = orders::place_order(&shop.orders, "cust-4", 700)
        .await
        .unwrap();

    let customers_db: &MemoryDatabase = shop.customers.store();
    tokio::time::timeout(Duration::from_secs(5), async {
        while customers_db
            .get::<CustomerOrderCache>(&order_id)
            .await
            .unwrap()
            .is_none()
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("customer cache should be synced by scheduled jobs");

    handle.shutdown();
    handle.join().await;
}
