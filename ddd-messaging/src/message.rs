//! 可靠投递消息（Outbox/Inbox 行）
//!
//! Outbox 与 Inbox 的消息结构完全一致，仅所在的信箱（表）不同。
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use ddd_domain::domain_event::{IntegrationEvent, RaisedEvent};
use ddd_domain::error::DomainResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 消息所在的信箱
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBox {
    Outbox,
    Inbox,
}

impl MessageBox {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageBox::Outbox => "outbox",
            MessageBox::Inbox => "inbox",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            MessageBox::Outbox => "outbox_messages",
            MessageBox::Inbox => "inbox_messages",
        }
    }

    pub fn consumer_table(&self) -> &'static str {
        match self {
            MessageBox::Outbox => "outbox_message_consumers",
            MessageBox::Inbox => "inbox_message_consumers",
        }
    }
}

impl fmt::Display for MessageBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一标识（Inbox 中即集成事件 ID）
    #[builder(default = Uuid::new_v4())]
    id: Uuid,
    /// 事件种类，用于解析处理器集合
    #[builder(into)]
    kind: String,
    /// 序列化后的事件载荷（JSON 文本）
    #[builder(into)]
    content: String,
    /// 事件发生时间，创建后不可变
    occurred_on_utc: DateTime<Utc>,
    /// 全部处理器完成（或作为毒消息放弃）的时间，设置后不再清空
    processed_on_utc: Option<DateTime<Utc>>,
    /// 最近一次失败原因
    error: Option<String>,
    /// 失败次数
    #[builder(default)]
    retry_count: u32,
    /// 最早可重试时间，为空表示立即可取
    next_retry_at_utc: Option<DateTime<Utc>>,
}

impl Message {
    /// 由聚合登记的领域事件生成 Outbox 消息
    pub fn from_raised(raised: &RaisedEvent) -> DomainResult<Self> {
        Ok(Message::builder()
            .kind(raised.kind())
            .content(raised.event().to_content()?)
            .occurred_on_utc(raised.occurred_on())
            .build())
    }

    /// 由集成事件生成消息（ID 沿用事件 ID，便于 Inbox 去重）
    pub fn from_integration_event<E: IntegrationEvent>(event: &E) -> DomainResult<Self> {
        Ok(Message::builder()
            .id(event.event_id())
            .kind(E::KIND)
            .content(serde_json::to_string(event)?)
            .occurred_on_utc(event.occurred_on())
            .build())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn occurred_on_utc(&self) -> DateTime<Utc> {
        self.occurred_on_utc
    }

    pub fn processed_on_utc(&self) -> Option<DateTime<Utc>> {
        self.processed_on_utc
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn next_retry_at_utc(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at_utc
    }

    /// 未完成且已到可重试时间
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.processed_on_utc.is_none() && self.next_retry_at_utc.is_none_or(|at| at <= now)
    }

    pub fn is_processed(&self) -> bool {
        self.processed_on_utc.is_some()
    }

    /// 已结束但带有失败原因，即被毒消息策略放弃
    pub fn is_abandoned(&self) -> bool {
        self.processed_on_utc.is_some() && self.error.is_some()
    }

    /// 全部处理器完成
    pub(crate) fn complete(&mut self, now: DateTime<Utc>) {
        if self.processed_on_utc.is_none() {
            self.processed_on_utc = Some(now);
        }
        self.error = None;
        self.next_retry_at_utc = None;
    }

    /// 记录一次失败并安排下次重试
    pub(crate) fn schedule_retry(
        &mut self,
        retry_count: u32,
        error: String,
        next_retry_at: DateTime<Utc>,
    ) {
        self.retry_count = retry_count;
        self.error = Some(error);
        self.next_retry_at_utc = Some(next_retry_at);
    }

    /// 记录最后一次失败并放弃（不再被选为待处理）
    pub(crate) fn abandon(&mut self, retry_count: u32, error: String, now: DateTime<Utc>) {
        self.retry_count = retry_count;
        self.error = Some(error);
        self.next_retry_at_utc = None;
        if self.processed_on_utc.is_none() {
            self.processed_on_utc = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message() -> Message {
        Message::builder()
            .kind("tests.something_happened")
            .content("{}")
            .occurred_on_utc(Utc::now())
            .build()
    }

    #[test]
    fn fresh_message_is_pending() {
        let m = message();
        assert!(m.is_pending(Utc::now()));
        assert_eq!(m.retry_count(), 0);
        assert!(!m.is_processed());
    }

    #[test]
    fn retry_window_controls_pending() {
        let now = Utc::now();
        let mut m = message();
        m.schedule_retry(1, "boom".into(), now + Duration::seconds(5));
        assert!(!m.is_pending(now));
        assert!(m.is_pending(now + Duration::seconds(5)));
        assert_eq!(m.error(), Some("boom"));
    }

    #[test]
    fn processed_is_never_cleared() {
        let now = Utc::now();
        let mut m = message();
        m.complete(now);
        m.complete(now + Duration::seconds(10));
        assert_eq!(m.processed_on_utc(), Some(now));
        assert!(!m.is_pending(now + Duration::days(1)));
    }

    #[test]
    fn abandoned_keeps_last_error() {
        let now = Utc::now();
        let mut m = message();
        m.abandon(4, "still failing".into(), now);
        assert!(m.is_abandoned());
        assert!(!m.is_pending(now));
        assert_eq!(m.error(), Some("still failing"));
        assert_eq!(m.retry_count(), 4);
    }
}
