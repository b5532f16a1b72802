//! 工作单元（UnitOfWork）
//!
//! 在一个存储会话内写入业务记录，并把聚合登记的领域事件转为 Outbox 消息，
//! `save_changes` 一次性提交；未提交即被丢弃时全部回滚。
//!
use crate::message::{Message, MessageBox};
use crate::store::MessageStore;
use chrono::Utc;
use ddd_domain::aggregate::Aggregate;
use ddd_domain::domain_event::DomainEvent;
use ddd_domain::error::DomainResult;
use tracing::debug;

pub struct UnitOfWork<'a, St: MessageStore> {
    store: &'a St,
    session: St::Session,
    pending: Vec<Message>,
}

impl<'a, St: MessageStore> UnitOfWork<'a, St> {
    pub async fn begin(store: &'a St) -> DomainResult<Self> {
        Ok(Self {
            store,
            session: store.begin().await?,
            pending: Vec::new(),
        })
    }

    /// 业务记录经由该会话写入
    pub fn session(&mut self) -> &mut St::Session {
        &mut self.session
    }

    /// 取出聚合登记的全部领域事件，返回新增的消息数
    pub fn add_events<A: Aggregate>(&mut self, aggregate: &mut A) -> DomainResult<usize> {
        let raised = aggregate.raised_events().take();
        let count = raised.len();
        for event in &raised {
            self.pending.push(Message::from_raised(event)?);
        }
        Ok(count)
    }

    /// 直接登记一个领域事件（发生时间取当前时刻）
    pub fn add_event<E: DomainEvent>(&mut self, event: &E) -> DomainResult<()> {
        self.pending.push(
            Message::builder()
                .kind(E::KIND)
                .content(serde_json::to_string(event)?)
                .occurred_on_utc(Utc::now())
                .build(),
        );
        Ok(())
    }

    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    /// 写入 Outbox 并提交，返回写入的消息数
    pub async fn save_changes(mut self) -> DomainResult<usize> {
        let messages = std::mem::take(&mut self.pending);
        for message in &messages {
            self.store
                .append(&mut self.session, MessageBox::Outbox, message)
                .await?;
        }
        self.store.commit(self.session).await?;
        debug!(count = messages.len(), "unit of work committed");
        Ok(messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDatabase;
    use ddd_domain::domain_event::RaisedEvents;
    use ddd_domain::entity::Entity;
    use ddd_domain::record::Record;
    use ddd_macros::domain_event;
    use serde::{Deserialize, Serialize};

    #[domain_event(kind = "tests.ticket_opened")]
    struct TicketOpened {
        ticket_id: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ticket {
        id: String,
        #[serde(skip)]
        events: RaisedEvents,
    }

    impl Entity for Ticket {
        type Id = String;

        fn id(&self) -> &String {
            &self.id
        }
    }

    impl Aggregate for Ticket {
        const TYPE: &'static str = "ticket";

        fn raised_events(&mut self) -> &mut RaisedEvents {
            &mut self.events
        }
    }

    impl Record for Ticket {
        const TABLE: &'static str = "tests.tickets";

        fn key(&self) -> String {
            self.id.clone()
        }
    }

    impl Ticket {
        fn open(id: &str) -> Self {
            let mut ticket = Ticket {
                id: id.into(),
                events: RaisedEvents::default(),
            };
            ticket.events.raise(TicketOpened {
                ticket_id: id.into(),
            });
            ticket
        }
    }

    #[tokio::test]
    async fn business_rows_and_outbox_commit_together() {
        let db = MemoryDatabase::new();
        let mut ticket = Ticket::open("t-1");

        let mut uow = UnitOfWork::begin(&db).await.unwrap();
        uow.session().upsert(&ticket).unwrap();
        assert_eq!(uow.add_events(&mut ticket).unwrap(), 1);
        assert!(ticket.raised_events().is_empty());
        assert_eq!(uow.save_changes().await.unwrap(), 1);

        assert!(db.get::<Ticket>("t-1").await.unwrap().is_some());
        let outbox = db.messages(MessageBox::Outbox).await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].kind(), "tests.ticket_opened");
        let payload: TicketOpened = serde_json::from_str(outbox[0].content()).unwrap();
        assert_eq!(payload.ticket_id, "t-1");
    }

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_nothing() {
        let db = MemoryDatabase::new();
        {
            let mut ticket = Ticket::open("t-2");
            let mut uow = UnitOfWork::begin(&db).await.unwrap();
            uow.session().upsert(&ticket).unwrap();
            uow.add_events(&mut ticket).unwrap();
            uow.add_event(&TicketOpened {
                ticket_id: "t-2".into(),
            })
            .unwrap();
            assert_eq!(uow.pending().len(), 2);
        }
        assert!(db.get::<Ticket>("t-2").await.unwrap().is_none());
        assert!(db.messages(MessageBox::Outbox).await.is_empty());
    }
}
