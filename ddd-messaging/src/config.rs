//! 消息作业配置
//!
//! 每个模块的 Outbox/Inbox 作业各自配置轮询间隔、批量大小与最大重试次数，
//! 启动时统一校验，非法配置直接导致启动失败。
//!
//! ```json
//! {
//!   "Modules": {
//!     "orders": {
//!       "Outbox": { "IntervalInSeconds": 5, "BatchSize": 20, "MaxRetries": 5 },
//!       "Inbox":  { "IntervalInSeconds": 5, "BatchSize": 20, "MaxRetries": 5 }
//!     }
//!   },
//!   "Broker": { "IntervalInSeconds": 1, "BatchSize": 50, "MaxRetries": 0 }
//! }
//! ```
use crate::message::MessageBox;
use ddd_domain::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// 单个作业的配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSettings {
    /// 轮询间隔（秒），> 0
    pub interval_in_seconds: u64,
    /// 每次最多处理的消息数，> 0
    pub batch_size: u32,
    /// 最大重试次数，超过后放弃该消息
    pub max_retries: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            interval_in_seconds: 10,
            batch_size: 20,
            max_retries: 5,
        }
    }
}

impl JobSettings {
    pub fn validate(&self, job: &str) -> DomainResult<()> {
        if self.interval_in_seconds == 0 {
            return Err(DomainError::invalid_config(format!(
                "{job}: IntervalInSeconds must be greater than 0"
            )));
        }
        if self.batch_size == 0 {
            return Err(DomainError::invalid_config(format!(
                "{job}: BatchSize must be greater than 0"
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_in_seconds)
    }
}

/// 单个模块的 Outbox/Inbox 作业配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleSettings {
    #[serde(default)]
    pub outbox: JobSettings,
    #[serde(default)]
    pub inbox: JobSettings,
}

impl ModuleSettings {
    pub fn job(&self, mailbox: MessageBox) -> JobSettings {
        match mailbox {
            MessageBox::Outbox => self.outbox,
            MessageBox::Inbox => self.inbox,
        }
    }
}

/// 全部消息作业配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessagingSettings {
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleSettings>,
    /// 外部消息通道轮询作业（可选）
    #[serde(default)]
    pub broker: Option<JobSettings>,
}

impl MessagingSettings {
    pub fn from_json_str(raw: &str) -> DomainResult<Self> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::invalid_config(format!("read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> DomainResult<()> {
        for (name, module) in &self.modules {
            module.outbox.validate(&format!("{name}.outbox"))?;
            module.inbox.validate(&format!("{name}.inbox"))?;
        }
        if let Some(broker) = &self.broker {
            broker.validate("broker")?;
        }
        Ok(())
    }

    /// 未显式配置的模块使用默认值
    pub fn module(&self, name: &str) -> ModuleSettings {
        self.modules.get(name).copied().unwrap_or_default()
    }
}
