//! 重试策略（RetryPolicy）
//!
//! 以固定的退避阶梯把失败次数映射为下一次重试时间，超过阶梯长度后
//! 一直沿用最后（最大）的间隔。纯函数，无 I/O。
//!
use chrono::{DateTime, Utc};
use ddd_domain::error::{DomainError, DomainResult};
use std::time::Duration;

/// 默认退避阶梯（秒）
pub const DEFAULT_BACKOFF_SECONDS: [u64; 5] = [5, 30, 120, 600, 3600];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    ladder: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_BACKOFF_SECONDS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// 自定义阶梯，至少包含一级
    pub fn new(ladder: Vec<Duration>) -> DomainResult<Self> {
        if ladder.is_empty() {
            return Err(DomainError::invalid_config("retry ladder must not be empty"));
        }
        Ok(Self { ladder })
    }

    /// `retry_count` 从 1 开始计数（本次失败累加之后的值）
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let last = self.ladder.len() - 1;
        let index = (retry_count.saturating_sub(1) as usize).min(last);
        self.ladder[index]
    }

    pub fn next_retry(&self, retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_for(retry_count))
            .unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn ladder(&self) -> &[Duration] {
        &self.ladder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn follows_default_ladder_and_caps() {
        let policy = RetryPolicy::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expected = [(1, 5), (2, 30), (3, 120), (4, 600), (5, 3600), (6, 3600), (50, 3600)];
        for (count, secs) in expected {
            assert_eq!(
                policy.next_retry(count, now),
                now + chrono::Duration::seconds(secs),
                "retry_count={count}"
            );
        }
    }

    #[test]
    fn zero_uses_first_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
    }

    #[test]
    fn empty_ladder_rejected() {
        assert!(RetryPolicy::new(vec![]).is_err());
        let single = RetryPolicy::new(vec![Duration::from_millis(10)]).unwrap();
        assert_eq!(single.delay_for(9), Duration::from_millis(10));
    }
}
