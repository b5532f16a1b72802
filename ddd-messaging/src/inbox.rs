//! Inbox 接收端
//!
//! 集成事件到达模块时，在同一事务内完成“按事件 ID 查重 + 写入 Inbox”，
//! 之后由该模块的 Inbox 处理作业异步分发。
//!
use crate::message::MessageBox;
use crate::serializer::IntegrationEnvelope;
use crate::store::MessageStore;
use async_trait::async_trait;
use ddd_domain::error::{DomainError, DomainResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// 接收结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    Stored,
    /// 同一事件 ID 已写入过 Inbox
    Duplicate,
}

/// 事件总线的投递目标
#[async_trait]
pub trait InboxReceiver: Send + Sync {
    fn module(&self) -> &str;

    /// 该模块是否订阅了此事件种类
    fn accepts(&self, kind: &str) -> bool;

    async fn receive(&self, envelope: &IntegrationEnvelope) -> DomainResult<Receipt>;
}

/// 基于消息存储的 Inbox
pub struct Inbox<St: MessageStore> {
    module: String,
    store: Arc<St>,
    kinds: BTreeSet<String>,
}

impl<St: MessageStore> Inbox<St> {
    pub fn new<I, K>(module: impl Into<String>, store: Arc<St>, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            module: module.into(),
            store,
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl<St: MessageStore> InboxReceiver for Inbox<St> {
    fn module(&self) -> &str {
        &self.module
    }

    fn accepts(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    async fn receive(&self, envelope: &IntegrationEnvelope) -> DomainResult<Receipt> {
        if !self.accepts(&envelope.kind) {
            return Err(DomainError::DisallowedEventKind {
                kind: envelope.kind.clone(),
            });
        }

        let mut session = self.store.begin().await?;
        if self
            .store
            .contains(&mut session, MessageBox::Inbox, envelope.id)
            .await?
        {
            debug!(
                module = %self.module,
                message_id = %envelope.id,
                kind = %envelope.kind,
                "duplicate integration event ignored"
            );
            return Ok(Receipt::Duplicate);
        }

        self.store
            .append(&mut session, MessageBox::Inbox, &envelope.to_message())
            .await?;
        self.store.commit(session).await?;

        debug!(
            module = %self.module,
            message_id = %envelope.id,
            kind = %envelope.kind,
            "integration event stored in inbox"
        );
        Ok(Receipt::Stored)
    }
}
