use ddd_domain::domain_event::IntegrationEvent;
use ddd_macros::integration_event;

#[integration_event(kind = "bank.integration.account_opened")]
struct AccountOpened {
    account: String,
}

// 已声明的 event_id 字段保持原位
#[integration_event(kind = "bank.integration.account_closed")]
struct AccountClosed {
    account: String,
    pub event_id: uuid::Uuid,
}

fn main() {
    let opened = AccountOpened {
        event_id: uuid::Uuid::new_v4(),
        occurred_on: chrono::Utc::now(),
        account: "acc-1".into(),
    };
    let _ = opened.event_id();

    let closed = AccountClosed {
        account: "acc-1".into(),
        event_id: uuid::Uuid::nil(),
        occurred_on: chrono::Utc::now(),
    };
    assert!(closed.event_id().is_nil());
}
