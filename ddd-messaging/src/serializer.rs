//! 集成事件序列化（EventSerializer）
//!
//! 集成事件跨模块/跨进程传递时统一包装为 `IntegrationEnvelope`，
//! 反序列化仅接受白名单内的事件种类，拒绝任意类型实例化。
//!
use crate::message::Message;
use chrono::{DateTime, Utc};
use ddd_domain::domain_event::IntegrationEvent;
use ddd_domain::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// 集成事件信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEnvelope {
    pub id: Uuid,
    pub kind: String,
    pub occurred_on: DateTime<Utc>,
    /// 事件 JSON 文本
    pub content: String,
}

impl IntegrationEnvelope {
    /// 转为 Inbox 消息，消息 ID 即事件 ID
    pub fn to_message(&self) -> Message {
        Message::builder()
            .id(self.id)
            .kind(self.kind.clone())
            .content(self.content.clone())
            .occurred_on_utc(self.occurred_on)
            .build()
    }
}

/// 带白名单的集成事件序列化器
#[derive(Debug, Clone, Default)]
pub struct EventSerializer {
    allowed: BTreeSet<String>,
}

impl EventSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow<E: IntegrationEvent>(self) -> Self {
        self.allow_kind(E::KIND)
    }

    pub fn allow_kind(mut self, kind: impl Into<String>) -> Self {
        self.allowed.insert(kind.into());
        self
    }

    pub fn is_allowed(&self, kind: &str) -> bool {
        self.allowed.contains(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    fn ensure_allowed(&self, kind: &str) -> DomainResult<()> {
        if !self.is_allowed(kind) {
            return Err(DomainError::DisallowedEventKind {
                kind: kind.to_string(),
            });
        }
        Ok(())
    }

    pub fn encode<E: IntegrationEvent>(&self, event: &E) -> DomainResult<IntegrationEnvelope> {
        self.ensure_allowed(E::KIND)?;
        Ok(IntegrationEnvelope {
            id: event.event_id(),
            kind: E::KIND.to_string(),
            occurred_on: event.occurred_on(),
            content: serde_json::to_string(event)?,
        })
    }

    pub fn to_wire(&self, envelope: &IntegrationEnvelope) -> DomainResult<Vec<u8>> {
        self.ensure_allowed(&envelope.kind)?;
        Ok(serde_json::to_vec(envelope)?)
    }

    pub fn from_wire(&self, bytes: &[u8]) -> DomainResult<IntegrationEnvelope> {
        let envelope: IntegrationEnvelope = serde_json::from_slice(bytes)?;
        self.ensure_allowed(&envelope.kind)?;
        Ok(envelope)
    }

    pub fn decode<E: IntegrationEvent>(&self, envelope: &IntegrationEnvelope) -> DomainResult<E> {
        self.ensure_allowed(&envelope.kind)?;
        if envelope.kind != E::KIND {
            return Err(DomainError::TypeMismatch {
                expected: E::KIND.to_string(),
                found: envelope.kind.clone(),
            });
        }
        Ok(serde_json::from_str(&envelope.content)?)
    }
}
