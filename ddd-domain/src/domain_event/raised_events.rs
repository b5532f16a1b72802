use super::DomainEvent;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;

/// 类型擦除后的领域事件，便于聚合登记多种事件
pub trait AnyDomainEvent: fmt::Debug + Send + Sync {
    fn kind(&self) -> &'static str;

    /// 以 JSON 文本序列化载荷（与 Outbox 读取端使用同一序列化器）
    fn to_content(&self) -> serde_json::Result<String>;

    fn as_any(&self) -> &dyn Any;
}

impl<E> AnyDomainEvent for E
where
    E: DomainEvent,
{
    fn kind(&self) -> &'static str {
        E::KIND
    }

    fn to_content(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 已登记、尚未持久化的领域事件
#[derive(Debug)]
pub struct RaisedEvent {
    event: Box<dyn AnyDomainEvent>,
    occurred_on: DateTime<Utc>,
}

impl RaisedEvent {
    pub fn event(&self) -> &dyn AnyDomainEvent {
        self.event.as_ref()
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    /// 还原为具体事件类型（类型不符时返回 None）
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.event.as_any().downcast_ref::<E>()
    }
}

/// 聚合内部的领域事件缓冲区，按登记顺序排列
#[derive(Debug, Default)]
pub struct RaisedEvents {
    events: Vec<RaisedEvent>,
}

impl RaisedEvents {
    /// 登记一个领域事件，发生时间取登记时刻
    pub fn raise<E: DomainEvent>(&mut self, event: E) {
        self.events.push(RaisedEvent {
            event: Box::new(event),
            occurred_on: Utc::now(),
        });
    }

    /// 取出全部事件并清空缓冲区
    pub fn take(&mut self) -> Vec<RaisedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RaisedEvent> {
        self.events.iter()
    }
}

// 缓冲区不参与序列化与比较：克隆出的聚合从空缓冲区开始
impl Clone for RaisedEvents {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl PartialEq for RaisedEvents {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
