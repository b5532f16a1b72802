use proc_macro::TokenStream;

mod event;
mod utils;

/// 领域事件宏
/// - 合并默认派生：`Debug, Clone, serde::Serialize, serde::Deserialize`
/// - 实现 `::ddd_domain::domain_event::{Event, DomainEvent}`，`KIND` 取自参数
/// - 支持 struct 与 enum
/// - 参数：`#[domain_event(kind = "orders.order_placed")]`（必填）
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    event::expand(event::EventRole::Domain, attr, item)
}

/// 集成事件宏
/// - 合并默认派生（同 `#[domain_event]`）
/// - 仅支持具名字段 struct；若缺失则在最前追加 `pub event_id: Uuid`、`pub occurred_on: DateTime<Utc>`
/// - 实现 `::ddd_domain::domain_event::{Event, IntegrationEvent}`
/// - 参数：`#[integration_event(kind = "orders.integration.order_placed")]`（必填）
#[proc_macro_attribute]
pub fn integration_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    event::expand(event::EventRole::Integration, attr, item)
}
