//! 固定窗口限流器
//! 每个客户端键一个窗口，计数更新在 DashMap 分片锁内完成

use crate::config::RateLimitSettings;
use dashmap::DashMap;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

/// 限流配置（启动后不可变）
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 时间窗口长度
    pub window: Duration,
    /// 窗口内的最大请求数
    pub max_requests: NonZeroU32,
}

impl RateLimitConfig {
    pub fn from_settings(settings: &RateLimitSettings) -> Option<Self> {
        Some(Self {
            window: Duration::from_secs(settings.window_secs),
            max_requests: NonZeroU32::new(settings.max_requests)?,
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            max_requests: NonZeroU32::MIN.saturating_add(199),
        }
    }
}

/// 单个客户端的窗口状态
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub count: u32,
    pub started_at: Instant,
}

impl RateWindow {
    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.started_at) > window
    }
}

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u32 },
    Throttled { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn admit(&self, client_key: &str) -> Admission {
        self.admit_at(client_key, Instant::now())
    }

    /// 以给定时刻判定；被拒绝的请求同样计数
    pub fn admit_at(&self, client_key: &str, now: Instant) -> Admission {
        let window = self.config.window;
        let max = self.config.max_requests.get();

        let mut entry = self
            .windows
            .entry(client_key.to_string())
            .or_insert_with(|| RateWindow {
                count: 0,
                started_at: now,
            });

        if entry.is_expired(now, window) {
            entry.count = 0;
            entry.started_at = now;
        }

        entry.count = entry.count.saturating_add(1);

        if entry.count > max {
            let elapsed = now.saturating_duration_since(entry.started_at);
            Admission::Throttled {
                retry_after: window.saturating_sub(elapsed),
            }
        } else {
            Admission::Admitted {
                remaining: max - entry.count,
            }
        }
    }

    /// 清理已完全过期的窗口，返回清理数量
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now, window));
        before.saturating_sub(self.windows.len())
    }

    /// 当前跟踪的客户端数量
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
