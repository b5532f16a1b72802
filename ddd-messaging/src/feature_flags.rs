//! 特性开关（FeatureFlags）
//!
//! 以点分层级路径为键的布尔开关，作业或外部通道轮询在执行前检查。
//! 未配置的开关视为关闭；任一显式关闭的上级路径会关闭其全部下级。
//!
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn is_enabled(&self, path: &str) -> bool;
}

/// 进程内开关表
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    flags: RwLock<HashMap<String, bool>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: impl Into<String>, enabled: bool) -> Self {
        self.set(path, enabled);
        self
    }

    pub fn set(&self, path: impl Into<String>, enabled: bool) {
        self.flags
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), enabled);
    }

    fn resolve(&self, path: &str) -> bool {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());

        // 自上而下检查祖先路径：a、a.b、a.b.c ...
        let mut end = 0;
        while let Some(pos) = path[end..].find('.') {
            end += pos;
            if flags.get(&path[..end]) == Some(&false) {
                return false;
            }
            end += 1;
        }

        flags.get(path).copied().unwrap_or(false)
    }
}

#[async_trait]
impl FeatureFlags for StaticFeatureFlags {
    async fn is_enabled(&self, path: &str) -> bool {
        self.resolve(path)
    }
}

/// 处理作业的开关路径：`modules.<module>.jobs.process_<mailbox>`
pub fn job_flag_path(module: &str, job: &str) -> String {
    format!("modules.{module}.jobs.{job}")
}
