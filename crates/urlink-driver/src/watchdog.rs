//! 速度流安全看门狗
//!
//! 每解码一帧实时数据计数加一；任何非零速度命令把计数清零。
//! 计数越过上限的那一帧触发一次零速度命令，之后不再重复触发，
//! 直到新的非零速度命令清零计数。

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct SafetyWatchdog {
    count: AtomicU32,
    max: AtomicU32,
}

impl SafetyWatchdog {
    pub fn new(max: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            max: AtomicU32::new(max),
        }
    }

    /// 记录一帧；返回 `true` 表示本帧应发送零速度命令
    pub fn on_frame(&self) -> bool {
        let prev = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c.saturating_add(1)))
            .unwrap_or(u32::MAX);
        prev == self.max.load(Ordering::Relaxed)
    }

    /// 收到非零速度命令
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u32 {
        self.max.load(Ordering::Relaxed)
    }

    pub fn set_max(&self, max: u32) {
        self.max.store(max, Ordering::Relaxed);
    }
}
