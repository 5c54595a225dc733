//! # urlink Net
//!
//! 阻塞式 TCP 传输层：连接、监听/接受、精确读取、完整写入、带超时的可读检测。
//!
//! 所有网络错误都以 [`NetError`] 返回，不会跨线程 panic；
//! 读取到 0 字节（对端关闭）统一报告为 [`NetError::Disconnected`]。

use std::time::Duration;
use thiserror::Error;

mod listener;
mod poll;
mod tcp;

pub use listener::ReverseListener;
pub use tcp::{TcpRx, TcpTransport, TcpTx};

/// 传输层错误类型
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to resolve address: {0}")]
    Resolve(String),

    #[error("Operation timeout")]
    Timeout,

    /// 对端关闭或读取到 0 字节
    #[error("Peer disconnected")]
    Disconnected,

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("poll failed: {0}")]
    Poll(String),
}

impl NetError {
    /// 是否意味着连接已不可用
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            NetError::Disconnected | NetError::ShortWrite { .. } | NetError::Io(_)
        )
    }
}

/// 字节流读取端
pub trait StreamRx {
    /// 等待可读，超时返回 `Ok(false)`
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, NetError>;

    /// 读满 `buf`；中途对端关闭返回 `NetError::Disconnected`
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<(), NetError>;

    /// 单次读取，返回读到的字节数（至少 1）
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, NetError>;
}

/// 字节流写入端
pub trait StreamTx {
    /// 写出全部字节
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), NetError>;
}
