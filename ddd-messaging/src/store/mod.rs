//! 消息存储（MessageStore）协议
//!
//! 每个模块拥有独立的一组消息表（Outbox、Inbox 及其消费者记录表），
//! 与业务数据位于同一数据库，从而可以在同一事务中写入。
//!
//! 会话（`Session`）即一次数据库事务：
//! - `begin` 开启；`commit` 提交；
//! - 未提交即被丢弃的会话一律回滚（包括处理器返回错误或 panic 的路径）。
//!
//! 处理作业绕过会话直接查询/更新消息表（`fetch_pending`、`save_state`）。
//!
use crate::cache_scope::CacheScoped;
use crate::message::{Message, MessageBox};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddd_domain::error::DomainResult;
use uuid::Uuid;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// 一次数据库事务；处理器经由它完成自身的副作用
    type Session: CacheScoped + Send + 'static;

    async fn begin(&self) -> DomainResult<Self::Session>;

    async fn commit(&self, session: Self::Session) -> DomainResult<()>;

    /// 在会话内追加一条消息
    async fn append(
        &self,
        session: &mut Self::Session,
        mailbox: MessageBox,
        message: &Message,
    ) -> DomainResult<()>;

    /// 会话内检查消息是否已存在（Inbox 接收去重）
    async fn contains(
        &self,
        session: &mut Self::Session,
        mailbox: MessageBox,
        message_id: Uuid,
    ) -> DomainResult<bool>;

    /// 拉取待处理消息：按发生时间升序，至多 `limit` 条
    async fn fetch_pending(
        &self,
        mailbox: MessageBox,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<Message>>;

    /// 处理器是否已消费该消息
    async fn is_consumed(
        &self,
        session: &mut Self::Session,
        mailbox: MessageBox,
        message_id: Uuid,
        handler: &str,
    ) -> DomainResult<bool>;

    /// 登记消费者记录（须在处理器成功之后、同一会话内调用）
    async fn mark_consumed(
        &self,
        session: &mut Self::Session,
        mailbox: MessageBox,
        message_id: Uuid,
        handler: &str,
    ) -> DomainResult<()>;

    /// 持久化消息状态（processed_on / error / retry_count / next_retry_at）
    async fn save_state(&self, mailbox: MessageBox, message: &Message) -> DomainResult<()>;

    /// 被毒消息策略放弃的消息，供运维排查
    async fn fetch_abandoned(&self, mailbox: MessageBox, limit: u32) -> DomainResult<Vec<Message>>;
}
