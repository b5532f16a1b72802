//! 进程内事件总线
//!
use super::EventBus;
use crate::inbox::{InboxReceiver, Receipt};
use crate::serializer::{EventSerializer, IntegrationEnvelope};
use async_trait::async_trait;
use ddd_domain::error::{DomainError, DomainResult};
use std::sync::{Arc, RwLock};
use tracing::debug;

pub struct InProcessEventBus {
    serializer: EventSerializer,
    receivers: RwLock<Vec<Arc<dyn InboxReceiver>>>,
}

impl InProcessEventBus {
    pub fn new(serializer: EventSerializer) -> Self {
        Self {
            serializer,
            receivers: RwLock::new(Vec::new()),
        }
    }

    /// 注册一个模块的 Inbox
    pub fn subscribe(&self, receiver: Arc<dyn InboxReceiver>) {
        self.receivers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(receiver);
    }

    fn receivers_for(&self, kind: &str) -> Vec<Arc<dyn InboxReceiver>> {
        self.receivers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.accepts(kind))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    fn serializer(&self) -> &EventSerializer {
        &self.serializer
    }

    async fn publish(&self, envelope: IntegrationEnvelope) -> DomainResult<()> {
        if !self.serializer.is_allowed(&envelope.kind) {
            return Err(DomainError::DisallowedEventKind {
                kind: envelope.kind,
            });
        }

        let receivers = self.receivers_for(&envelope.kind);
        if receivers.is_empty() {
            debug!(kind = %envelope.kind, message_id = %envelope.id, "no subscriber for integration event");
            return Ok(());
        }

        for receiver in receivers {
            let receipt = receiver.receive(&envelope).await.map_err(|e| {
                DomainError::event_bus(format!(
                    "deliver {} to module {}: {e}",
                    envelope.kind,
                    receiver.module()
                ))
            })?;
            if receipt == Receipt::Duplicate {
                debug!(module = receiver.module(), message_id = %envelope.id, "redelivered integration event");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbox::Inbox;
    use crate::message::MessageBox;
    use crate::store::memory::MemoryDatabase;
    use chrono::Utc;
    use ddd_macros::integration_event;
    use uuid::Uuid;

    #[integration_event(kind = "tests.invoice_issued")]
    struct InvoiceIssued {
        invoice: String,
    }

    #[integration_event(kind = "tests.invoice_voided")]
    struct InvoiceVoided {
        invoice: String,
    }

    fn issued() -> InvoiceIssued {
        InvoiceIssued {
            event_id: Uuid::new_v4(),
            occurred_on: Utc::now(),
            invoice: "inv-1".into(),
        }
    }

    #[tokio::test]
    async fn delivers_to_every_subscribed_inbox() {
        let billing = Arc::new(MemoryDatabase::new());
        let audit = Arc::new(MemoryDatabase::new());
        let reports = Arc::new(MemoryDatabase::new());
        let bus = InProcessEventBus::new(
            EventSerializer::new()
                .allow::<InvoiceIssued>()
                .allow::<InvoiceVoided>(),
        );
        bus.subscribe(Arc::new(Inbox::new("billing", billing.clone(), ["tests.invoice_issued"])));
        bus.subscribe(Arc::new(Inbox::new("audit", audit.clone(), ["tests.invoice_issued"])));
        bus.subscribe(Arc::new(Inbox::new("reports", reports.clone(), ["tests.invoice_voided"])));
        let bus: Arc<dyn EventBus> = Arc::new(bus);

        bus.publish_event(&issued()).await.unwrap();

        assert_eq!(billing.messages(MessageBox::Inbox).await.len(), 1);
        assert_eq!(audit.messages(MessageBox::Inbox).await.len(), 1);
        assert!(reports.messages(MessageBox::Inbox).await.is_empty());
    }

    #[tokio::test]
    async fn inbox_rows_carry_event_id() {
        let db = Arc::new(MemoryDatabase::new());
        let bus = InProcessEventBus::new(EventSerializer::new().allow::<InvoiceIssued>());
        bus.subscribe(Arc::new(Inbox::new("billing", db.clone(), ["tests.invoice_issued"])));
        let bus: Arc<dyn EventBus> = Arc::new(bus);

        let event = issued();
        bus.publish_event(&event).await.unwrap();
        bus.publish_event(&event).await.unwrap();

        let rows = db.messages(MessageBox::Inbox).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), event.event_id);
    }

    #[tokio::test]
    async fn kind_outside_allowlist_is_refused() {
        let bus: Arc<dyn EventBus> =
            Arc::new(InProcessEventBus::new(EventSerializer::new().allow::<InvoiceIssued>()));
        let voided = InvoiceVoided {
            event_id: Uuid::new_v4(),
            occurred_on: Utc::now(),
            invoice: "inv-2".into(),
        };
        let err = bus.publish_event(&voided).await.unwrap_err();
        assert!(matches!(err, DomainError::DisallowedEventKind { .. }));
    }
}
