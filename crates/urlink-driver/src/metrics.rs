//! 通道性能指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 单个通道的实时指标
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// 收到的帧/消息总数
    pub frames_received: AtomicU64,

    /// 成功解码并发布的帧数
    pub frames_decoded: AtomicU64,

    /// 因长度或格式错误丢弃的帧数
    pub frames_dropped: AtomicU64,

    /// 可读等待超时次数（无数据时的正常现象）
    pub poll_timeouts: AtomicU64,

    /// 看门狗自动发送零速度的次数
    pub watchdog_trips: AtomicU64,

    /// 发出的命令数（脚本、速度命令）
    pub commands_sent: AtomicU64,
}

impl ChannelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取所有计数器的快照
    ///
    /// # 性能
    ///
    /// 使用 `Ordering::Relaxed`，不同计数器之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            watchdog_trips: self.watchdog_trips.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_decoded.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.poll_timeouts.store(0, Ordering::Relaxed);
        self.watchdog_trips.store(0, Ordering::Relaxed);
        self.commands_sent.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub poll_timeouts: u64,
    pub watchdog_trips: u64,
    pub commands_sent: u64,
}

impl MetricsSnapshot {
    /// 丢帧率（百分比），未收到任何帧时为 0
    pub fn drop_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        (self.frames_dropped as f64 / self.frames_received as f64) * 100.0
    }
}
