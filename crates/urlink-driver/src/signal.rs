//! 更新信号
//!
//! 接收线程每发布一次新状态就递增序号并唤醒所有等待者。
//! 等待者记住上次看到的序号，因此不会漏掉在等待之前发生的更新。

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct UpdateSignal {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl UpdateSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前序号
    pub fn sequence(&self) -> u64 {
        *self.seq.lock()
    }

    /// 发布一次更新
    pub fn notify(&self) {
        let mut seq = self.seq.lock();
        *seq = seq.wrapping_add(1);
        self.cond.notify_all();
    }

    /// 等待序号越过 `last_seen`，超时返回当前序号（可能等于 `last_seen`）
    pub fn wait_timeout(&self, last_seen: u64, timeout: Duration) -> u64 {
        let mut seq = self.seq.lock();
        if *seq == last_seen {
            let _ = self.cond.wait_for(&mut seq, timeout);
        }
        *seq
    }
}
