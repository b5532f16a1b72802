//! 消息处理作业（MessageProcessor）
//!
//! Outbox 与 Inbox 共用同一个泛型引擎，以模块名（值）与存储（类型）参数化：
//! - 按发生时间升序拉取至多 `BatchSize` 条待处理消息；
//! - 每条消息按注册顺序依次调用处理器（经幂等装饰器），遇到失败即停止；
//! - 全部处理器都有消费者记录时标记完成；
//! - 失败时累加重试次数并按退避阶梯安排下一次重试，超过 `MaxRetries`
//!   或属于永久性失败时放弃该消息（保留最后一次错误）；
//! - 同一批次内的消息可有界并发处理，取消信号在消息边界生效。
//!
use crate::bus::EventBus;
use crate::clock::{Clock, SystemClock};
use crate::config::JobSettings;
use crate::feature_flags::{FeatureFlags, job_flag_path};
use crate::handler::Delivery;
use crate::idempotency::{DispatchError, IdempotentHandler, InvocationOutcome};
use crate::message::{Message, MessageBox};
use crate::registry::HandlerRegistry;
use crate::retry::RetryPolicy;
use crate::scheduler::Job;
use crate::store::MessageStore;
use async_trait::async_trait;
use bon::bon;
use ddd_domain::error::{DomainError, DomainResult};
use futures_util::{StreamExt, stream};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// 全部处理器完成
    Processed,
    /// 失败，已安排重试
    Retrying,
    /// 失败且不再重试
    Abandoned,
    /// 处理结果未能写回（下一轮会再次被选中）
    StateNotSaved,
}

/// 单轮处理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub processed: usize,
    pub retrying: usize,
    pub abandoned: usize,
    pub state_not_saved: usize,
    /// 因取消而未处理
    pub skipped: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Processed => self.processed += 1,
            MessageOutcome::Retrying => self.retrying += 1,
            MessageOutcome::Abandoned => self.abandoned += 1,
            MessageOutcome::StateNotSaved => self.state_not_saved += 1,
        }
    }
}

pub struct MessageProcessor<St: MessageStore> {
    module: String,
    mailbox: MessageBox,
    job_name: String,
    feature_flag: String,
    store: Arc<St>,
    registry: HandlerRegistry<St::Session>,
    event_bus: Arc<dyn EventBus>,
    feature_flags: Arc<dyn FeatureFlags>,
    settings: JobSettings,
    retry_policy: RetryPolicy,
    concurrency: usize,
    clock: Arc<dyn Clock>,
}

#[bon]
impl<St: MessageStore> MessageProcessor<St> {
    #[builder]
    pub fn new(
        #[builder(into)] module: String,
        mailbox: MessageBox,
        store: Arc<St>,
        registry: HandlerRegistry<St::Session>,
        event_bus: Arc<dyn EventBus>,
        feature_flags: Arc<dyn FeatureFlags>,
        settings: JobSettings,
        #[builder(default)] retry_policy: RetryPolicy,
        // 同一批次内并发处理的消息数
        #[builder(default = 1)]
        concurrency: usize,
        #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)] clock: Arc<dyn Clock>,
    ) -> DomainResult<Self> {
        if module.is_empty() {
            return Err(DomainError::invalid_config("module name must not be empty"));
        }
        let job = format!("process_{mailbox}");
        settings.validate(&format!("{module}.{mailbox}"))?;
        if concurrency == 0 {
            return Err(DomainError::invalid_config(format!(
                "{module}.{job}: concurrency must be greater than 0"
            )));
        }

        Ok(Self {
            job_name: format!("{module}.{job}"),
            feature_flag: job_flag_path(&module, &job),
            module,
            mailbox,
            store,
            registry,
            event_bus,
            feature_flags,
            settings,
            retry_policy,
            concurrency,
            clock,
        })
    }
}

impl<St: MessageStore> MessageProcessor<St> {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn mailbox(&self) -> MessageBox {
        self.mailbox
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// 执行一轮：拉取、分发并写回每条消息的状态
    pub async fn run_once(&self, token: &CancellationToken) -> DomainResult<BatchReport> {
        let now = self.clock.now();
        let messages = self
            .store
            .fetch_pending(self.mailbox, now, self.settings.batch_size)
            .await?;

        let mut report = BatchReport {
            fetched: messages.len(),
            ..BatchReport::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }

        let outcomes: Vec<Option<MessageOutcome>> = stream::iter(messages)
            .map(move |message| async move {
                if token.is_cancelled() {
                    return None;
                }
                Some(self.process_message(message).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Some(outcome) => report.record(outcome),
                None => report.skipped += 1,
            }
        }
        Ok(report)
    }

    async fn process_message(&self, mut message: Message) -> MessageOutcome {
        let now = self.clock.now();
        let attempt = message.retry_count() + 1;
        let delivery = Delivery {
            module: &self.module,
            mailbox: self.mailbox,
            message_id: message.id(),
            attempt,
            now,
            event_bus: &self.event_bus,
            feature_flags: &self.feature_flags,
        };

        let failure = self.dispatch(&message, delivery).await.err();

        let outcome = match failure {
            None => {
                message.complete(now);
                MessageOutcome::Processed
            }
            Some(err) => {
                let retry_count = message.retry_count() + 1;
                let reason = err.to_string();
                if err.is_permanent() || retry_count > self.settings.max_retries {
                    error!(
                        module = %self.module,
                        mailbox = %self.mailbox,
                        message_id = %message.id(),
                        kind = message.kind(),
                        retry_count,
                        permanent = err.is_permanent(),
                        error = %reason,
                        "message abandoned"
                    );
                    message.abandon(retry_count, reason, now);
                    MessageOutcome::Abandoned
                } else {
                    let next_retry_at = self.retry_policy.next_retry(retry_count, now);
                    warn!(
                        module = %self.module,
                        mailbox = %self.mailbox,
                        message_id = %message.id(),
                        kind = message.kind(),
                        retry_count,
                        next_retry_at = %next_retry_at,
                        error = %reason,
                        "message failed, retry scheduled"
                    );
                    message.schedule_retry(retry_count, reason, next_retry_at);
                    MessageOutcome::Retrying
                }
            }
        };

        if let Err(err) = self.store.save_state(self.mailbox, &message).await {
            error!(
                module = %self.module,
                mailbox = %self.mailbox,
                message_id = %message.id(),
                error = %err,
                "failed to save message state"
            );
            return MessageOutcome::StateNotSaved;
        }
        outcome
    }

    /// 依次调用该种类的全部处理器，返回第一个失败
    async fn dispatch(&self, message: &Message, delivery: Delivery<'_>) -> Result<(), DispatchError> {
        for handler in self.registry.handlers_for(message.kind()) {
            let decorated = IdempotentHandler::new(self.store.clone(), handler.clone());
            match decorated.handle(message, delivery).await? {
                InvocationOutcome::Executed => debug!(
                    module = %self.module,
                    message_id = %message.id(),
                    handler = decorated.handler_name(),
                    "handler executed"
                ),
                InvocationOutcome::AlreadyConsumed => debug!(
                    module = %self.module,
                    message_id = %message.id(),
                    handler = decorated.handler_name(),
                    "handler already consumed message, skipped"
                ),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<St: MessageStore> Job for MessageProcessor<St> {
    fn name(&self) -> &str {
        &self.job_name
    }

    fn feature_flag(&self) -> &str {
        &self.feature_flag
    }

    fn interval(&self) -> Duration {
        self.settings.interval()
    }

    async fn run(&self, token: &CancellationToken) -> DomainResult<()> {
        let report = self.run_once(token).await?;
        if report.fetched > 0 {
            info!(
                job = %self.job_name,
                fetched = report.fetched,
                processed = report.processed,
                retrying = report.retrying,
                abandoned = report.abandoned,
                skipped = report.skipped,
                "batch finished"
            );
        }
        Ok(())
    }
}
