//! 带超时的可读检测

use crate::NetError;
use std::time::Duration;

/// 超时毫秒数（poll 的上限为 u16 毫秒）
fn timeout_ms(timeout: Duration) -> u16 {
    timeout.as_millis().min(u16::MAX as u128) as u16
}

#[cfg(unix)]
pub(crate) fn wait_readable(fd: std::os::fd::BorrowedFd<'_>, timeout: Duration) -> Result<bool, NetError> {
    use nix::errno::Errno;
    use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(timeout_ms(timeout))) {
        Ok(0) => Ok(false),
        // 对端关闭时 POLLIN/POLLHUP 置位，随后的读取会得到 0 字节
        Ok(_) => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(NetError::Poll(e.to_string())),
    }
}

/// 非 unix 平台：用读超时 + peek 模拟
#[cfg(not(unix))]
pub(crate) fn wait_stream_readable(
    stream: &std::net::TcpStream,
    timeout: Duration,
) -> Result<bool, NetError> {
    use std::io::ErrorKind;

    let timeout = Duration::from_millis(timeout_ms(timeout).max(1) as u64);
    stream.set_read_timeout(Some(timeout))?;
    let mut peek_buf = [0u8; 1];
    let result = match stream.peek(&mut peek_buf) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
        Err(e) => Err(NetError::Io(e)),
    };
    stream.set_read_timeout(None)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_clamped() {
        assert_eq!(timeout_ms(Duration::from_millis(500)), 500);
        assert_eq!(timeout_ms(Duration::from_secs(3600)), u16::MAX);
    }
}
