//! 内存版模块数据库（MemoryDatabase）
//!
//! 同时承载消息表与业务记录表，满足 `MessageStore` 协议：
//! - 会话只缓冲写入（追加消息、消费者记录、记录增删），读取时叠加在已提交数据之上；
//! - `commit` 在一次短暂加锁内校验唯一约束（消息 ID、消费者记录）并整体应用，
//!   任一冲突则整个会话失败、不留下部分写入；
//! - 未提交即被丢弃的会话不产生任何影响；
//! - 锁从不跨越 `.await` 持有，处理器在会话内向其他模块（包括本模块）发布事件不会互相等待；
//! - 隔离级别相当于读已提交：并发会话对同一记录的覆盖以后提交者为准。
//!
//! 典型用途：测试环境、示例与单进程本地开发。
//!
use crate::cache_scope::{CacheScoped, CacheWriteScope};
use crate::message::{Message, MessageBox};
use crate::store::MessageStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddd_domain::error::{DomainError, DomainResult};
use ddd_domain::record::Record;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct MailboxTables {
    messages: HashMap<Uuid, Message>,
    consumers: HashSet<(Uuid, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    outbox: MailboxTables,
    inbox: MailboxTables,
    records: HashMap<&'static str, BTreeMap<String, Value>>,
}

impl MemoryState {
    fn mailbox(&self, mailbox: MessageBox) -> &MailboxTables {
        match mailbox {
            MessageBox::Outbox => &self.outbox,
            MessageBox::Inbox => &self.inbox,
        }
    }

    fn mailbox_mut(&mut self, mailbox: MessageBox) -> &mut MailboxTables {
        match mailbox {
            MessageBox::Outbox => &mut self.outbox,
            MessageBox::Inbox => &mut self.inbox,
        }
    }

    fn record(&self, table: &str, key: &str) -> Option<Value> {
        self.records.get(table).and_then(|t| t.get(key)).cloned()
    }

    fn sorted<'a>(messages: impl Iterator<Item = &'a Message>, limit: u32) -> Vec<Message> {
        let mut out: Vec<Message> = messages.cloned().collect();
        out.sort_by_key(|m| (m.occurred_on_utc(), m.id()));
        out.truncate(limit as usize);
        out
    }

    fn apply(&mut self, write: Write) {
        match write {
            Write::Append(mailbox, message) => {
                self.mailbox_mut(mailbox).messages.insert(message.id(), message);
            }
            Write::Consume(mailbox, message_id, handler) => {
                self.mailbox_mut(mailbox)
                    .consumers
                    .insert((message_id, handler));
            }
            Write::Upsert(table, key, value) => {
                self.records.entry(table).or_default().insert(key, value);
            }
            Write::Delete(table, key) => {
                if let Some(t) = self.records.get_mut(table) {
                    t.remove(&key);
                }
            }
        }
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn decode<R: Record>(value: Value) -> DomainResult<R> {
    serde_json::from_value(value).map_err(DomainError::from)
}

/// 会话内缓冲的一次写入
#[derive(Debug)]
enum Write {
    Append(MessageBox, Message),
    Consume(MessageBox, Uuid, String),
    Upsert(&'static str, String, Value),
    Delete(&'static str, String),
}

/// 一个模块的内存数据库
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取已提交的业务记录
    pub async fn get<R: Record>(&self, key: &str) -> DomainResult<Option<R>> {
        lock(&self.state).record(R::TABLE, key).map(decode).transpose()
    }

    pub async fn list<R: Record>(&self) -> DomainResult<Vec<R>> {
        let values: Vec<Value> = lock(&self.state)
            .records
            .get(R::TABLE)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        values.into_iter().map(decode).collect()
    }

    /// 信箱中的全部消息（按发生时间升序）
    pub async fn messages(&self, mailbox: MessageBox) -> Vec<Message> {
        let state = lock(&self.state);
        MemoryState::sorted(state.mailbox(mailbox).messages.values(), u32::MAX)
    }

    pub async fn message(&self, mailbox: MessageBox, id: Uuid) -> Option<Message> {
        lock(&self.state).mailbox(mailbox).messages.get(&id).cloned()
    }

    /// 已消费指定消息的处理器名称（排序后返回）
    pub async fn consumers(&self, mailbox: MessageBox, message_id: Uuid) -> Vec<String> {
        let state = lock(&self.state);
        let mut names: Vec<String> = state
            .mailbox(mailbox)
            .consumers
            .iter()
            .filter(|(id, _)| *id == message_id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// 内存数据库会话（事务）
pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    writes: Vec<Write>,
    scope: CacheWriteScope,
}

impl MemorySession {
    // 本会话视角下的记录值：最近一次缓冲写入优先
    fn record(&self, table: &str, key: &str) -> Option<Value> {
        let buffered = self.writes.iter().rev().find_map(|w| match w {
            Write::Upsert(t, k, v) if *t == table && k == key => Some(Some(v.clone())),
            Write::Delete(t, k) if *t == table && k == key => Some(None),
            _ => None,
        });
        match buffered {
            Some(value) => value,
            None => lock(&self.state).record(table, key),
        }
    }

    pub fn get<R: Record>(&self, key: &str) -> DomainResult<Option<R>> {
        self.record(R::TABLE, key).map(decode).transpose()
    }

    pub fn list<R: Record>(&self) -> DomainResult<Vec<R>> {
        let mut table = lock(&self.state)
            .records
            .get(R::TABLE)
            .cloned()
            .unwrap_or_default();
        for write in &self.writes {
            match write {
                Write::Upsert(t, k, v) if *t == R::TABLE => {
                    table.insert(k.clone(), v.clone());
                }
                Write::Delete(t, k) if *t == R::TABLE => {
                    table.remove(k);
                }
                _ => {}
            }
        }
        table.into_values().map(decode).collect()
    }

    /// 插入或覆盖一条记录；写保护记录要求缓存写入作用域已打开
    pub fn upsert<R: Record>(&mut self, record: &R) -> DomainResult<()> {
        self.scope.ensure_writable::<R>()?;
        let value = serde_json::to_value(record)?;
        self.writes.push(Write::Upsert(R::TABLE, record.key(), value));
        Ok(())
    }

    pub fn delete<R: Record>(&mut self, key: &str) -> DomainResult<bool> {
        self.scope.ensure_writable::<R>()?;
        let existed = self.record(R::TABLE, key).is_some();
        self.writes.push(Write::Delete(R::TABLE, key.to_string()));
        Ok(existed)
    }

    fn has_message(&self, mailbox: MessageBox, message_id: Uuid) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, Write::Append(mb, m) if *mb == mailbox && m.id() == message_id))
            || lock(&self.state)
                .mailbox(mailbox)
                .messages
                .contains_key(&message_id)
    }

    fn has_consumer(&self, mailbox: MessageBox, message_id: Uuid, handler: &str) -> bool {
        self.writes.iter().any(|w| {
            matches!(w, Write::Consume(mb, id, h) if *mb == mailbox && *id == message_id && h == handler)
        }) || lock(&self.state)
            .mailbox(mailbox)
            .consumers
            .contains(&(message_id, handler.to_string()))
    }
}

impl CacheScoped for MemorySession {
    fn cache_write_scope(&self) -> &CacheWriteScope {
        &self.scope
    }

    fn cache_write_scope_mut(&mut self) -> &mut CacheWriteScope {
        &mut self.scope
    }
}

#[async_trait]
impl MessageStore for MemoryDatabase {
    type Session = MemorySession;

    async fn begin(&self) -> DomainResult<MemorySession> {
        Ok(MemorySession {
            state: self.state.clone(),
            writes: Vec::new(),
            scope: CacheWriteScope::default(),
        })
    }

    async fn commit(&self, session: MemorySession) -> DomainResult<()> {
        let mut state = lock(&self.state);

        // 先校验并发会话可能已提交的同一唯一键，全部通过后再应用
        for write in &session.writes {
            match write {
                Write::Append(mailbox, message)
                    if state.mailbox(*mailbox).messages.contains_key(&message.id()) =>
                {
                    return Err(DomainError::message_store(format!(
                        "duplicate {mailbox} message: {}",
                        message.id()
                    )));
                }
                Write::Consume(mailbox, message_id, handler)
                    if state
                        .mailbox(*mailbox)
                        .consumers
                        .contains(&(*message_id, handler.clone())) =>
                {
                    return Err(DomainError::message_store(format!(
                        "consumer already recorded: message={message_id}, handler={handler}"
                    )));
                }
                _ => {}
            }
        }

        for write in session.writes {
            state.apply(write);
        }
        Ok(())
    }

    async fn append(
        &self,
        session: &mut MemorySession,
        mailbox: MessageBox,
        message: &Message,
    ) -> DomainResult<()> {
        if session.has_message(mailbox, message.id()) {
            return Err(DomainError::message_store(format!(
                "duplicate {mailbox} message: {}",
                message.id()
            )));
        }
        session.writes.push(Write::Append(mailbox, message.clone()));
        Ok(())
    }

    async fn contains(
        &self,
        session: &mut MemorySession,
        mailbox: MessageBox,
        message_id: Uuid,
    ) -> DomainResult<bool> {
        Ok(session.has_message(mailbox, message_id))
    }

    async fn fetch_pending(
        &self,
        mailbox: MessageBox,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<Message>> {
        let state = lock(&self.state);
        Ok(MemoryState::sorted(
            state
                .mailbox(mailbox)
                .messages
                .values()
                .filter(|m| m.is_pending(now)),
            limit,
        ))
    }

    async fn is_consumed(
        &self,
        session: &mut MemorySession,
        mailbox: MessageBox,
        message_id: Uuid,
        handler: &str,
    ) -> DomainResult<bool> {
        Ok(session.has_consumer(mailbox, message_id, handler))
    }

    async fn mark_consumed(
        &self,
        session: &mut MemorySession,
        mailbox: MessageBox,
        message_id: Uuid,
        handler: &str,
    ) -> DomainResult<()> {
        if session.has_consumer(mailbox, message_id, handler) {
            return Err(DomainError::message_store(format!(
                "consumer already recorded: message={message_id}, handler={handler}"
            )));
        }
        session
            .writes
            .push(Write::Consume(mailbox, message_id, handler.to_string()));
        Ok(())
    }

    async fn save_state(&self, mailbox: MessageBox, message: &Message) -> DomainResult<()> {
        let mut state = lock(&self.state);
        match state.mailbox_mut(mailbox).messages.get_mut(&message.id()) {
            Some(stored) => {
                *stored = message.clone();
                Ok(())
            }
            None => Err(DomainError::NotFound {
                reason: format!("{mailbox} message {}", message.id()),
            }),
        }
    }

    async fn fetch_abandoned(&self, mailbox: MessageBox, limit: u32) -> DomainResult<Vec<Message>> {
        let state = lock(&self.state);
        Ok(MemoryState::sorted(
            state
                .mailbox(mailbox)
                .messages
                .values()
                .filter(|m| m.is_abandoned()),
            limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        text: String,
    }

    impl Record for Note {
        const TABLE: &'static str = "tests.notes";

        fn key(&self) -> String {
            self.id.clone()
        }
    }

    fn note(id: &str) -> Note {
        Note {
            id: id.into(),
            text: format!("note {id}"),
        }
    }

    fn message(offset_secs: i64) -> Message {
        Message::builder()
            .kind("tests.noted")
            .content("{}")
            .occurred_on_utc(Utc::now() + chrono::Duration::seconds(offset_secs))
            .build()
    }

    #[tokio::test]
    async fn committed_session_is_visible() {
        let db = MemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        session.upsert(&note("n-1")).unwrap();
        let m = message(0);
        db.append(&mut session, MessageBox::Outbox, &m).await.unwrap();
        db.commit(session).await.unwrap();

        assert_eq!(db.get::<Note>("n-1").await.unwrap(), Some(note("n-1")));
        assert_eq!(db.messages(MessageBox::Outbox).await.len(), 1);
        assert!(db.messages(MessageBox::Inbox).await.is_empty());
    }

    #[tokio::test]
    async fn dropped_session_rolls_back() {
        let db = MemoryDatabase::new();
        {
            let mut session = db.begin().await.unwrap();
            session.upsert(&note("n-2")).unwrap();
            db.append(&mut session, MessageBox::Outbox, &message(0))
                .await
                .unwrap();
            db.mark_consumed(&mut session, MessageBox::Outbox, Uuid::new_v4(), "h")
                .await
                .unwrap();
        }
        assert_eq!(db.get::<Note>("n-2").await.unwrap(), None);
        assert!(db.messages(MessageBox::Outbox).await.is_empty());
    }

    #[tokio::test]
    async fn pending_is_ordered_and_limited() {
        let db = MemoryDatabase::new();
        let later = message(10);
        let earlier = message(-10);
        let middle = message(0);
        let mut session = db.begin().await.unwrap();
        for m in [&later, &earlier, &middle] {
            db.append(&mut session, MessageBox::Inbox, m).await.unwrap();
        }
        db.commit(session).await.unwrap();

        let pending = db
            .fetch_pending(MessageBox::Inbox, Utc::now() + chrono::Duration::hours(1), 2)
            .await
            .unwrap();
        let ids: Vec<Uuid> = pending.iter().map(Message::id).collect();
        assert_eq!(ids, vec![earlier.id(), middle.id()]);
    }

    #[tokio::test]
    async fn consumer_record_is_unique() {
        let db = MemoryDatabase::new();
        let id = Uuid::new_v4();
        let mut session = db.begin().await.unwrap();
        assert!(!db.is_consumed(&mut session, MessageBox::Inbox, id, "h").await.unwrap());
        db.mark_consumed(&mut session, MessageBox::Inbox, id, "h").await.unwrap();
        assert!(db.is_consumed(&mut session, MessageBox::Inbox, id, "h").await.unwrap());
        assert!(db.mark_consumed(&mut session, MessageBox::Inbox, id, "h").await.is_err());
        db.commit(session).await.unwrap();
        assert_eq!(db.consumers(MessageBox::Inbox, id).await, vec!["h".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_append_rejected() {
        let db = MemoryDatabase::new();
        let m = message(0);
        let mut session = db.begin().await.unwrap();
        db.append(&mut session, MessageBox::Inbox, &m).await.unwrap();
        assert!(db.contains(&mut session, MessageBox::Inbox, m.id()).await.unwrap());
        assert!(db.append(&mut session, MessageBox::Inbox, &m).await.is_err());
    }

    #[tokio::test]
    async fn session_reads_its_own_writes() {
        let db = MemoryDatabase::new();
        let mut seed = db.begin().await.unwrap();
        seed.upsert(&note("n-1")).unwrap();
        db.commit(seed).await.unwrap();

        let mut session = db.begin().await.unwrap();
        session.upsert(&note("n-2")).unwrap();
        assert!(session.delete::<Note>("n-1").unwrap());
        assert_eq!(session.get::<Note>("n-1").unwrap(), None);
        assert_eq!(session.list::<Note>().unwrap(), vec![note("n-2")]);

        // 提交前其他读者仍看到旧数据
        assert_eq!(db.list::<Note>().await.unwrap(), vec![note("n-1")]);
        db.commit(session).await.unwrap();
        assert_eq!(db.list::<Note>().await.unwrap(), vec![note("n-2")]);
    }

    #[tokio::test]
    async fn open_sessions_do_not_block_each_other() {
        let db = MemoryDatabase::new();
        let mut first = db.begin().await.unwrap();
        let mut second = tokio::time::timeout(std::time::Duration::from_secs(1), db.begin())
            .await
            .expect("second session should open while the first is active")
            .unwrap();

        first.upsert(&note("a")).unwrap();
        second.upsert(&note("b")).unwrap();
        db.commit(second).await.unwrap();
        db.commit(first).await.unwrap();
        assert_eq!(db.list::<Note>().await.unwrap(), vec![note("a"), note("b")]);
    }

    #[tokio::test]
    async fn conflicting_commit_applies_nothing() {
        let db = MemoryDatabase::new();
        let id = Uuid::new_v4();
        let mut winner = db.begin().await.unwrap();
        let mut loser = db.begin().await.unwrap();
        db.mark_consumed(&mut winner, MessageBox::Outbox, id, "h").await.unwrap();
        loser.upsert(&note("side-effect")).unwrap();
        db.mark_consumed(&mut loser, MessageBox::Outbox, id, "h").await.unwrap();

        db.commit(winner).await.unwrap();
        assert!(db.commit(loser).await.is_err());
        assert_eq!(db.get::<Note>("side-effect").await.unwrap(), None);
        assert_eq!(db.consumers(MessageBox::Outbox, id).await, vec!["h".to_string()]);
    }
}
