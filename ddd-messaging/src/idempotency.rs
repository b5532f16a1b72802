//! 幂等装饰器（IdempotentHandler）
//!
//! 包装单个处理器的一次调用，在同一会话（事务）内完成：
//! 1. 查询消费者记录，已存在则跳过；
//! 2. 执行处理器；
//! 3. 成功后写入消费者记录并提交。
//!
//! 任一步骤失败时会话被丢弃，处理器的副作用与消费者记录一起回滚。
//!
use crate::handler::{Delivery, HandlerContext};
use crate::message::Message;
use crate::registry::DynEventHandler;
use crate::store::MessageStore;
use ddd_domain::error::DomainError;
use std::sync::Arc;
use thiserror::Error;

/// 处理器调用失败
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("handler `{handler}` failed: {error:#}")]
    Handler {
        handler: String,
        error: anyhow::Error,
    },
    #[error("handler `{handler}` cannot decode payload: {error}")]
    Payload { handler: String, error: DomainError },
    #[error(transparent)]
    Store(#[from] DomainError),
}

impl DispatchError {
    /// 重试无法改变结果的失败
    pub fn is_permanent(&self) -> bool {
        match self {
            DispatchError::Handler { error, .. } => error
                .downcast_ref::<DomainError>()
                .is_some_and(DomainError::is_permanent),
            DispatchError::Payload { .. } => true,
            DispatchError::Store(err) => err.is_permanent(),
        }
    }
}

/// 调用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Executed,
    /// 已有消费者记录，未再执行
    AlreadyConsumed,
}

pub struct IdempotentHandler<St: MessageStore> {
    store: Arc<St>,
    inner: Arc<dyn DynEventHandler<St::Session>>,
}

impl<St: MessageStore> IdempotentHandler<St> {
    pub fn new(store: Arc<St>, inner: Arc<dyn DynEventHandler<St::Session>>) -> Self {
        Self { store, inner }
    }

    pub fn handler_name(&self) -> &str {
        self.inner.handler_name()
    }

    pub async fn handle(
        &self,
        message: &Message,
        delivery: Delivery<'_>,
    ) -> Result<InvocationOutcome, DispatchError> {
        let name = self.inner.handler_name();
        let mut session = self.store.begin().await?;

        if self
            .store
            .is_consumed(&mut session, delivery.mailbox, message.id(), name)
            .await?
        {
            return Ok(InvocationOutcome::AlreadyConsumed);
        }

        {
            let mut ctx = HandlerContext::new(&mut session, name, delivery);
            self.inner.invoke(message.content(), &mut ctx).await?;
        }

        self.store
            .mark_consumed(&mut session, delivery.mailbox, message.id(), name)
            .await?;
        self.store.commit(session).await?;
        Ok(InvocationOutcome::Executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_classification() {
        let decode = DispatchError::Payload {
            handler: "h".into(),
            error: DomainError::Parse {
                reason: "bad".into(),
            },
        };
        assert!(decode.is_permanent());

        let denied = DispatchError::Handler {
            handler: "h".into(),
            error: anyhow::Error::new(DomainError::ProjectionWriteDenied { entity: "t" }),
        };
        assert!(denied.is_permanent());

        let transient = DispatchError::Handler {
            handler: "h".into(),
            error: anyhow::anyhow!("timeout"),
        };
        assert!(!transient.is_permanent());

        let store = DispatchError::from(DomainError::message_store("connection reset"));
        assert!(!store.is_permanent());
    }

    #[test]
    fn display_includes_context_chain() {
        let err = DispatchError::Handler {
            handler: "sync".into(),
            error: anyhow::anyhow!("socket closed").context("push customer cache"),
        };
        assert_eq!(
            err.to_string(),
            "handler `sync` failed: push customer cache: socket closed"
        );
    }
}
