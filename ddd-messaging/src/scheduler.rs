//! 周期作业调度（Scheduler）
//!
//! - 每个作业运行在自己的定时任务上，上一轮未结束时跳过错过的触发，
//!   因此同一作业不会重叠执行；不同作业互不影响；
//! - 每次触发前检查作业的特性开关，关闭时本轮跳过；
//! - 作业标识唯一，重复注册视为配置错误；
//! - `SchedulerHandle` 负责优雅关闭与等待。
//!
use crate::feature_flags::FeatureFlags;
use async_trait::async_trait;
use ddd_domain::error::{DomainError, DomainResult};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 可调度的周期作业
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// 作业标识，例如 `orders.process_outbox`
    fn name(&self) -> &str;

    /// 控制该作业的特性开关路径
    fn feature_flag(&self) -> &str;

    fn interval(&self) -> Duration;

    /// 执行一轮；应在消息边界观察取消信号
    async fn run(&self, token: &CancellationToken) -> DomainResult<()>;
}

pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    names: HashSet<String>,
    feature_flags: Arc<dyn FeatureFlags>,
}

impl Scheduler {
    pub fn new(feature_flags: Arc<dyn FeatureFlags>) -> Self {
        Self {
            jobs: Vec::new(),
            names: HashSet::new(),
            feature_flags,
        }
    }

    pub fn add(&mut self, job: Arc<dyn Job>) -> DomainResult<()> {
        if !self.names.insert(job.name().to_string()) {
            return Err(DomainError::invalid_config(format!(
                "duplicate job identity: {}",
                job.name()
            )));
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.name())
    }

    /// 启动全部作业，返回可用于关闭/等待的句柄
    pub fn start(self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(self.jobs.len());

        for job in self.jobs {
            let flags = self.feature_flags.clone();
            let job_token = token.clone();
            info!(job = job.name(), interval = ?job.interval(), "scheduling job");

            tasks.push(spawn_periodic(token.clone(), job.interval(), move || {
                let job = job.clone();
                let flags = flags.clone();
                let token = job_token.clone();
                async move {
                    if !flags.is_enabled(job.feature_flag()).await {
                        debug!(job = job.name(), flag = job.feature_flag(), "job disabled by feature flag");
                        return;
                    }
                    if let Err(err) = job.run(&token).await {
                        error!(job = job.name(), error = %err, "job run failed");
                    }
                }
            }));
        }

        SchedulerHandle { token, tasks }
    }
}

fn spawn_periodic<F, Fut>(token: CancellationToken, interval: Duration, mut f: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => f().await,
            }
        }
    })
}

/// 调度运行句柄
pub struct SchedulerHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
