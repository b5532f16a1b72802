use ddd_domain::domain_event::{DomainEvent, Event};
use ddd_macros::domain_event;
use serde::{Deserialize, Serialize};

#[domain_event(kind = "bank.opened")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Opened {
    account: String,
    initial_balance: i64,
}

#[domain_event(kind = "bank.movement")]
#[serde(tag = "type")]
enum Movement {
    Deposited { amount: i64 },
    Withdrawn { amount: i64 },
}

fn assert_domain_event<E: DomainEvent>() -> &'static str {
    E::KIND
}

fn main() {
    assert_eq!(assert_domain_event::<Opened>(), "bank.opened");
    assert_eq!(<Movement as Event>::KIND, "bank.movement");
}
