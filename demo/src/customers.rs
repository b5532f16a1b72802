//! 客户模块：通过订阅订单模块的集成事件，维护本模块内的订单缓存
//!
use crate::orders::{OrderCancelledIntegrationEvent, OrderPlacedIntegrationEvent, OrderStatus};
use async_trait::async_trait;
use ddd_domain::error::DomainError;
use ddd_domain::record::Record;
use ddd_messaging::{EventHandler, HandlerContext, MemoryDatabase, MemorySession, MessagingModule};
use serde::{Deserialize, Serialize};

pub const MODULE: &str = "customers";

/// 订单在客户模块中的只读镜像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerOrderCache {
    pub id: String,
    pub customer_id: String,
    pub total_cents: i64,
    pub status: OrderStatus,
}

impl Record for CustomerOrderCache {
    const TABLE: &'static str = "customers.order_cache";
    const WRITE_PROTECTED: bool = true;

    fn key(&self) -> String {
        self.id.clone()
    }
}

pub struct SyncPlacedOrder;

#[async_trait]
impl EventHandler<OrderPlacedIntegrationEvent, MemorySession> for SyncPlacedOrder {
    fn handler_name(&self) -> &str {
        "sync_placed_order"
    }

    async fn handle(
        &self,
        event: OrderPlacedIntegrationEvent,
        ctx: &mut HandlerContext<'_, MemorySession>,
    ) -> anyhow::Result<()> {
        let mut session = ctx.allow_cache_writes();
        session.upsert(&CustomerOrderCache {
            id: event.order_id,
            customer_id: event.customer_id,
            total_cents: event.total_cents,
            status: event.status,
        })?;
        Ok(())
    }
}

/// 取消事件可能先于下单事件到达：缓存行不存在时报错，留待重试
pub struct SyncCancelledOrder;

#[async_trait]
impl EventHandler<OrderCancelledIntegrationEvent, MemorySession> for SyncCancelledOrder {
    fn handler_name(&self) -> &str {
        "sync_cancelled_order"
    }

    async fn handle(
        &self,
        event: OrderCancelledIntegrationEvent,
        ctx: &mut HandlerContext<'_, MemorySession>,
    ) -> anyhow::Result<()> {
        let Some(mut cached) = ctx
            .session()
            .get::<CustomerOrderCache>(&event.order_id)?
        else {
            anyhow::bail!("order {} not mirrored yet", event.order_id);
        };
        cached.status = OrderStatus::Cancelled;
        ctx.allow_cache_writes().upsert(&cached)?;
        Ok(())
    }
}

pub fn register(module: &mut MessagingModule<MemoryDatabase>) -> Result<(), DomainError> {
    module
        .on_integration_event::<OrderPlacedIntegrationEvent, _>(SyncPlacedOrder)?
        .on_integration_event::<OrderCancelledIntegrationEvent, _>(SyncCancelledOrder)?;
    Ok(())
}

/// 某客户的全部订单（按订单号排序）
pub async fn orders_of(
    db: &MemoryDatabase,
    customer_id: &str,
) -> Result<Vec<CustomerOrderCache>, DomainError> {
    let mut orders: Vec<CustomerOrderCache> = db
        .list::<CustomerOrderCache>()
        .await?
        .into_iter()
        .filter(|o| o.customer_id == customer_id)
        .collect();
    orders.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(orders)
}
