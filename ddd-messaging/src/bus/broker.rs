//! 外部消息通道模式
//!
//! 发布端把信封序列化为字节交给 `BrokerChannel`；接收端由
//! `BrokerConsumerJob` 周期拉取，校验白名单后投递到订阅的 Inbox。
//! 无法解析或不在白名单内的载荷记录日志后丢弃，投递失败的载荷重新入队。
//!
use super::EventBus;
use crate::config::JobSettings;
use crate::inbox::InboxReceiver;
use crate::scheduler::Job;
use crate::serializer::{EventSerializer, IntegrationEnvelope};
use async_trait::async_trait;
use ddd_domain::error::DomainResult;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 接收端作业的特性开关路径
pub const BROKER_POLLING_FLAG: &str = "broker.polling";

/// 外部消息通道
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn send(&self, payload: Vec<u8>) -> DomainResult<()>;

    /// 取出至多 `max` 条载荷
    async fn poll(&self, max: usize) -> DomainResult<Vec<Vec<u8>>>;

    /// 放回一条未能投递的载荷
    async fn requeue(&self, payload: Vec<u8>) -> DomainResult<()>;
}

/// 进程内队列实现，用于测试与本地运行
#[derive(Default)]
pub struct InMemoryBroker {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn send(&self, payload: Vec<u8>) -> DomainResult<()> {
        self.queue.lock().await.push_back(payload);
        Ok(())
    }

    async fn poll(&self, max: usize) -> DomainResult<Vec<Vec<u8>>> {
        let mut queue = self.queue.lock().await;
        let n = max.min(queue.len());
        Ok(queue.drain(..n).collect())
    }

    async fn requeue(&self, payload: Vec<u8>) -> DomainResult<()> {
        self.queue.lock().await.push_back(payload);
        Ok(())
    }
}

/// 发布端
pub struct BrokerEventBus {
    serializer: EventSerializer,
    channel: Arc<dyn BrokerChannel>,
}

impl BrokerEventBus {
    pub fn new(serializer: EventSerializer, channel: Arc<dyn BrokerChannel>) -> Self {
        Self { serializer, channel }
    }
}

#[async_trait]
impl EventBus for BrokerEventBus {
    fn serializer(&self) -> &EventSerializer {
        &self.serializer
    }

    async fn publish(&self, envelope: IntegrationEnvelope) -> DomainResult<()> {
        let bytes = self.serializer.to_wire(&envelope)?;
        self.channel.send(bytes).await?;
        debug!(kind = %envelope.kind, message_id = %envelope.id, "integration event sent to broker");
        Ok(())
    }
}

/// 接收端轮询作业
pub struct BrokerConsumerJob {
    channel: Arc<dyn BrokerChannel>,
    serializer: EventSerializer,
    receivers: Vec<Arc<dyn InboxReceiver>>,
    settings: JobSettings,
}

/// 单轮轮询的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub received: usize,
    pub delivered: usize,
    pub rejected: usize,
    pub requeued: usize,
    /// 放回通道失败的载荷数
    pub requeue_failed: usize,
}

impl BrokerConsumerJob {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        serializer: EventSerializer,
        receivers: Vec<Arc<dyn InboxReceiver>>,
        settings: JobSettings,
    ) -> DomainResult<Self> {
        settings.validate("broker")?;
        Ok(Self {
            channel,
            serializer,
            receivers,
            settings,
        })
    }

    /// 拉取一批载荷并逐条投递；已取出的每条载荷都会被投递、丢弃或放回，
    /// 放回失败只记入报告，不中断其余载荷的处理
    pub async fn poll_once(&self, token: &CancellationToken) -> DomainResult<PollReport> {
        let payloads = self.channel.poll(self.settings.batch_size as usize).await?;
        let mut report = PollReport {
            received: payloads.len(),
            ..PollReport::default()
        };

        for payload in payloads {
            if token.is_cancelled() {
                self.requeue(payload, &mut report).await;
                continue;
            }

            let envelope = match self.serializer.from_wire(&payload) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, bytes = payload.len(), "dropping rejected broker payload");
                    report.rejected += 1;
                    continue;
                }
            };

            if self.deliver(&envelope).await {
                report.delivered += 1;
            } else {
                self.requeue(payload, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn requeue(&self, payload: Vec<u8>, report: &mut PollReport) {
        let bytes = payload.len();
        match self.channel.requeue(payload).await {
            Ok(()) => report.requeued += 1,
            Err(err) => {
                error!(error = %err, bytes, "failed to requeue broker payload");
                report.requeue_failed += 1;
            }
        }
    }

    /// 投递到全部订阅者；任一失败返回 false（已成功者在重投时去重）
    async fn deliver(&self, envelope: &IntegrationEnvelope) -> bool {
        let mut ok = true;
        for receiver in self.receivers.iter().filter(|r| r.accepts(&envelope.kind)) {
            if let Err(err) = receiver.receive(envelope).await {
                warn!(
                    module = receiver.module(),
                    kind = %envelope.kind,
                    message_id = %envelope.id,
                    error = %err,
                    "broker delivery failed, requeueing"
                );
                ok = false;
            }
        }
        ok
    }
}

#[async_trait]
impl Job for BrokerConsumerJob {
    fn name(&self) -> &str {
        "broker.consume"
    }

    fn feature_flag(&self) -> &str {
        BROKER_POLLING_FLAG
    }

    fn interval(&self) -> Duration {
        self.settings.interval()
    }

    async fn run(&self, token: &CancellationToken) -> DomainResult<()> {
        let report = self.poll_once(token).await?;
        if report.received > 0 {
            info!(
                received = report.received,
                delivered = report.delivered,
                rejected = report.rejected,
                requeued = report.requeued,
                requeue_failed = report.requeue_failed,
                "broker poll finished"
            );
        }
        Ok(())
    }
}
