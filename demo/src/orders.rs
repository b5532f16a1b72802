//! 订单模块：订单聚合、领域事件与对外发布的集成事件
//!
use async_trait::async_trait;
use ddd_domain::aggregate::Aggregate;
use ddd_domain::domain_event::RaisedEvents;
use ddd_domain::entity::Entity;
use ddd_domain::error::DomainError;
use ddd_domain::record::Record;
use ddd_macros::{domain_event, integration_event};
use ddd_messaging::{EventHandler, HandlerContext, MemoryDatabase, MemorySession, MessagingModule};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

pub const MODULE: &str = "orders";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order total must be positive, got {0}")]
    InvalidTotal(i64),
    #[error("order {0} not found")]
    NotFound(String),
    #[error("order {0} already cancelled")]
    AlreadyCancelled(String),
    #[error(transparent)]
    Store(#[from] DomainError),
}

#[domain_event(kind = "orders.order_placed")]
pub struct OrderPlaced {
    pub order_id: String,
    pub customer_id: String,
    pub total_cents: i64,
}

#[domain_event(kind = "orders.order_cancelled")]
pub struct OrderCancelled {
    pub order_id: String,
}

/// 对外发布：其他模块据此维护自己的订单缓存
#[integration_event(kind = "orders.integration.order_placed")]
pub struct OrderPlacedIntegrationEvent {
    pub order_id: String,
    pub customer_id: String,
    pub total_cents: i64,
    pub status: OrderStatus,
}

#[integration_event(kind = "orders.integration.order_cancelled")]
pub struct OrderCancelledIntegrationEvent {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: String,
    customer_id: String,
    total_cents: i64,
    status: OrderStatus,
    #[serde(skip)]
    events: RaisedEvents,
}

impl Entity for Order {
    type Id = String;

    fn id(&self) -> &String {
        &self.id
    }
}

impl Aggregate for Order {
    const TYPE: &'static str = "order";

    fn raised_events(&mut self) -> &mut RaisedEvents {
        &mut self.events
    }
}

impl Record for Order {
    const TABLE: &'static str = "orders.orders";

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Order {
    pub fn place(customer_id: impl Into<String>, total_cents: i64) -> Result<Self, OrderError> {
        if total_cents <= 0 {
            return Err(OrderError::InvalidTotal(total_cents));
        }
        let mut order = Order {
            id: Ulid::new().to_string(),
            customer_id: customer_id.into(),
            total_cents,
            status: OrderStatus::Placed,
            events: RaisedEvents::default(),
        };
        order.events.raise(OrderPlaced {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            total_cents,
        });
        Ok(order)
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::AlreadyCancelled(self.id.clone()));
        }
        self.status = OrderStatus::Cancelled;
        self.events.raise(OrderCancelled {
            order_id: self.id.clone(),
        });
        Ok(())
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn total_cents(&self) -> i64 {
        self.total_cents
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }
}

/// 下单：订单与 Outbox 消息在同一事务中提交，返回订单号
pub async fn place_order(
    module: &MessagingModule<MemoryDatabase>,
    customer_id: &str,
    total_cents: i64,
) -> Result<String, OrderError> {
    let mut order = Order::place(customer_id, total_cents)?;
    let mut uow = module.unit_of_work().await?;
    uow.session().upsert(&order)?;
    uow.add_events(&mut order)?;
    uow.save_changes().await?;
    Ok(order.id)
}

pub async fn cancel_order(
    module: &MessagingModule<MemoryDatabase>,
    order_id: &str,
) -> Result<(), OrderError> {
    let mut uow = module.unit_of_work().await?;
    let mut order: Order = uow
        .session()
        .get(order_id)?
        .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?;
    order.cancel()?;
    uow.session().upsert(&order)?;
    uow.add_events(&mut order)?;
    uow.save_changes().await?;
    Ok(())
}

/// 集成事件沿用 Outbox 消息 ID，重试发布时下游 Inbox 可去重
pub struct PublishOrderPlaced;

#[async_trait]
impl EventHandler<OrderPlaced, MemorySession> for PublishOrderPlaced {
    fn handler_name(&self) -> &str {
        "publish_order_placed"
    }

    async fn handle(
        &self,
        event: OrderPlaced,
        ctx: &mut HandlerContext<'_, MemorySession>,
    ) -> anyhow::Result<()> {
        let integration = OrderPlacedIntegrationEvent {
            event_id: ctx.message_id(),
            occurred_on: ctx.now(),
            order_id: event.order_id,
            customer_id: event.customer_id,
            total_cents: event.total_cents,
            status: OrderStatus::Placed,
        };
        ctx.publish(&integration).await?;
        Ok(())
    }
}

pub struct PublishOrderCancelled;

#[async_trait]
impl EventHandler<OrderCancelled, MemorySession> for PublishOrderCancelled {
    fn handler_name(&self) -> &str {
        "publish_order_cancelled"
    }

    async fn handle(
        &self,
        event: OrderCancelled,
        ctx: &mut HandlerContext<'_, MemorySession>,
    ) -> anyhow::Result<()> {
        let integration = OrderCancelledIntegrationEvent {
            event_id: ctx.message_id(),
            occurred_on: ctx.now(),
            order_id: event.order_id,
        };
        ctx.publish(&integration).await?;
        Ok(())
    }
}

pub fn register(module: &mut MessagingModule<MemoryDatabase>) -> Result<(), DomainError> {
    module
        .on_domain_event::<OrderPlaced, _>(PublishOrderPlaced)?
        .on_domain_event::<OrderCancelled, _>(PublishOrderCancelled)?;
    Ok(())
}
