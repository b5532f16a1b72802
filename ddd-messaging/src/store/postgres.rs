//! Postgres 消息存储（feature = "postgres"）
//!
//! 每个模块使用独立的 schema，消息表与业务表共处同一数据库：
//! - `<schema>.outbox_messages` / `<schema>.inbox_messages`
//! - `<schema>.outbox_message_consumers` / `<schema>.inbox_message_consumers`
//!
//! 会话即 `sqlx::Transaction`，被丢弃时由 sqlx 自动回滚。
//!
use crate::cache_scope::{CacheScoped, CacheWriteScope};
use crate::message::{Message, MessageBox};
use crate::store::MessageStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddd_domain::error::{DomainError, DomainResult};
use ddd_domain::record::Record;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    kind: String,
    content: String,
    occurred_on_utc: DateTime<Utc>,
    processed_on_utc: Option<DateTime<Utc>>,
    error: Option<String>,
    retry_count: i32,
    next_retry_at_utc: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = DomainError;

    fn try_from(row: MessageRow) -> DomainResult<Self> {
        let retry_count = u32::try_from(row.retry_count).map_err(|_| DomainError::Parse {
            reason: format!("negative retry_count for message {}", row.id),
        })?;
        Ok(Message::builder()
            .id(row.id)
            .kind(row.kind)
            .content(row.content)
            .occurred_on_utc(row.occurred_on_utc)
            .maybe_processed_on_utc(row.processed_on_utc)
            .maybe_error(row.error)
            .retry_count(retry_count)
            .maybe_next_retry_at_utc(row.next_retry_at_utc)
            .build())
    }
}

fn retry_count_column(message: &Message) -> DomainResult<i32> {
    i32::try_from(message.retry_count())
        .map_err(|_| DomainError::message_store("retry_count out of range"))
}

const COLUMNS: &str =
    "id, kind, content, occurred_on_utc, processed_on_utc, error, retry_count, next_retry_at_utc";

/// 一个模块的 Postgres 消息存储
#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
    schema: String,
}

impl PostgresMessageStore {
    /// `schema` 仅允许 ASCII 字母、数字与下划线
    pub fn new(pool: PgPool, schema: impl Into<String>) -> DomainResult<Self> {
        let schema = schema.into();
        let valid = !schema.is_empty()
            && !schema.starts_with(|c: char| c.is_ascii_digit())
            && schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(DomainError::invalid_config(format!(
                "invalid schema name: {schema:?}"
            )));
        }
        Ok(Self { pool, schema })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn table(&self, mailbox: MessageBox) -> String {
        format!("{}.{}", self.schema, mailbox.table())
    }

    fn consumer_table(&self, mailbox: MessageBox) -> String {
        format!("{}.{}", self.schema, mailbox.consumer_table())
    }

    /// 创建 schema 与消息表（幂等）
    pub async fn ensure_schema(&self) -> DomainResult<()> {
        for sql in &self.schema_statements() {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    // 唯一的建表语句来源
    fn schema_statements(&self) -> Vec<String> {
        let mut statements = vec![format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema)];
        for mailbox in [MessageBox::Outbox, MessageBox::Inbox] {
            let table = self.table(mailbox);
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id UUID PRIMARY KEY,
                    kind TEXT NOT NULL,
                    content TEXT NOT NULL,
                    occurred_on_utc TIMESTAMPTZ NOT NULL,
                    processed_on_utc TIMESTAMPTZ NULL,
                    error TEXT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
                    next_retry_at_utc TIMESTAMPTZ NULL
                )"
            ));
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {}_pending_idx ON {table} (occurred_on_utc) \
                 WHERE processed_on_utc IS NULL",
                mailbox.table()
            ));
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    message_id UUID NOT NULL,
                    handler_name TEXT NOT NULL,
                    PRIMARY KEY (message_id, handler_name)
                )",
                self.consumer_table(mailbox)
            ));
        }
        statements
    }
}

/// Postgres 会话：一个进行中的事务
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
    scope: CacheWriteScope,
}

impl PgSession {
    /// 普通业务表的连接
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// 写入记录 `R` 所在表的连接；写保护记录要求缓存写入作用域已打开
    pub fn projection_connection<R: Record>(&mut self) -> DomainResult<&mut PgConnection> {
        self.scope.ensure_writable::<R>()?;
        Ok(&mut self.tx)
    }
}

impl CacheScoped for PgSession {
    fn cache_write_scope(&self) -> &CacheWriteScope {
        &self.scope
    }

    fn cache_write_scope_mut(&mut self) -> &mut CacheWriteScope {
        &mut self.scope
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    type Session = PgSession;

    async fn begin(&self) -> DomainResult<PgSession> {
        let tx = self.pool.begin().await?;
        Ok(PgSession {
            tx,
            scope: CacheWriteScope::default(),
        })
    }

    async fn commit(&self, session: PgSession) -> DomainResult<()> {
        session.tx.commit().await?;
        Ok(())
    }

    async fn append(
        &self,
        session: &mut PgSession,
        mailbox: MessageBox,
        message: &Message,
    ) -> DomainResult<()> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            self.table(mailbox)
        );
        sqlx::query(&sql)
            .bind(message.id())
            .bind(message.kind())
            .bind(message.content())
            .bind(message.occurred_on_utc())
            .bind(message.processed_on_utc())
            .bind(message.error())
            .bind(retry_count_column(message)?)
            .bind(message.next_retry_at_utc())
            .execute(session.connection())
            .await?;
        Ok(())
    }

    async fn contains(
        &self,
        session: &mut PgSession,
        mailbox: MessageBox,
        message_id: Uuid,
    ) -> DomainResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
            self.table(mailbox)
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(message_id)
            .fetch_one(session.connection())
            .await?;
        Ok(exists)
    }

    async fn fetch_pending(
        &self,
        mailbox: MessageBox,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<Message>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {}
             WHERE processed_on_utc IS NULL
               AND (next_retry_at_utc IS NULL OR next_retry_at_utc <= $1)
             ORDER BY occurred_on_utc, id
             LIMIT $2",
            self.table(mailbox)
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn is_consumed(
        &self,
        session: &mut PgSession,
        mailbox: MessageBox,
        message_id: Uuid,
        handler: &str,
    ) -> DomainResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE message_id = $1 AND handler_name = $2)",
            self.consumer_table(mailbox)
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(message_id)
            .bind(handler)
            .fetch_one(session.connection())
            .await?;
        Ok(exists)
    }

    async fn mark_consumed(
        &self,
        session: &mut PgSession,
        mailbox: MessageBox,
        message_id: Uuid,
        handler: &str,
    ) -> DomainResult<()> {
        let sql = format!(
            "INSERT INTO {} (message_id, handler_name) VALUES ($1, $2)",
            self.consumer_table(mailbox)
        );
        sqlx::query(&sql)
            .bind(message_id)
            .bind(handler)
            .execute(session.connection())
            .await?;
        Ok(())
    }

    async fn save_state(&self, mailbox: MessageBox, message: &Message) -> DomainResult<()> {
        let sql = format!(
            "UPDATE {}
             SET processed_on_utc = $2, error = $3, retry_count = $4, next_retry_at_utc = $5
             WHERE id = $1",
            self.table(mailbox)
        );
        let result = sqlx::query(&sql)
            .bind(message.id())
            .bind(message.processed_on_utc())
            .bind(message.error())
            .bind(retry_count_column(message)?)
            .bind(message.next_retry_at_utc())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound {
                reason: format!("{mailbox} message {}", message.id()),
            });
        }
        Ok(())
    }

    async fn fetch_abandoned(&self, mailbox: MessageBox, limit: u32) -> DomainResult<Vec<Message>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {}
             WHERE processed_on_utc IS NOT NULL AND error IS NOT NULL
             ORDER BY occurred_on_utc, id
             LIMIT $1",
            self.table(mailbox)
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Message::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/messaging")
            .unwrap()
    }

    #[tokio::test]
    async fn schema_name_is_validated() {
        assert!(PostgresMessageStore::new(lazy_pool(), "orders").is_ok());
        assert!(PostgresMessageStore::new(lazy_pool(), "customer_cache2").is_ok());
        assert!(PostgresMessageStore::new(lazy_pool(), "").is_err());
        assert!(PostgresMessageStore::new(lazy_pool(), "1orders").is_err());
        assert!(PostgresMessageStore::new(lazy_pool(), "orders; DROP TABLE x").is_err());
    }

    #[tokio::test]
    async fn tables_are_schema_qualified() {
        let store = PostgresMessageStore::new(lazy_pool(), "orders").unwrap();
        assert_eq!(store.table(MessageBox::Outbox), "orders.outbox_messages");
        assert_eq!(
            store.consumer_table(MessageBox::Inbox),
            "orders.inbox_message_consumers"
        );
    }

    #[tokio::test]
    async fn schema_statements_cover_every_table() {
        let store = PostgresMessageStore::new(lazy_pool(), "orders").unwrap();
        let statements = store.schema_statements();
        assert_eq!(statements.len(), 7);
        assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS orders");
        for table in [
            "orders.outbox_messages",
            "orders.outbox_message_consumers",
            "orders.inbox_messages",
            "orders.inbox_message_consumers",
        ] {
            let prefix = format!("CREATE TABLE IF NOT EXISTS {table} (");
            assert!(statements.iter().any(|s| s.starts_with(&prefix)), "{table}");
        }
        let pending: Vec<_> = statements
            .iter()
            .filter(|s| s.contains("_pending_idx") && s.contains("WHERE processed_on_utc IS NULL"))
            .collect();
        assert_eq!(pending.len(), 2);
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")));
    }

    #[test]
    fn negative_retry_count_row_is_rejected() {
        let row = MessageRow {
            id: Uuid::new_v4(),
            kind: "orders.order_placed".into(),
            content: "{}".into(),
            occurred_on_utc: Utc::now(),
            processed_on_utc: None,
            error: None,
            retry_count: -1,
            next_retry_at_utc: None,
        };
        assert!(Message::try_from(row).is_err());
    }
}
