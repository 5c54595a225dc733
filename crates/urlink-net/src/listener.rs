//! 反向连接监听端
//!
//! 控制器内运行的脚本主动连接回本机，本端只需监听并接受一次连接。

use crate::{NetError, TcpTransport};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ReverseListener {
    listener: TcpListener,
    port: u16,
}

impl ReverseListener {
    /// 在所有网卡上监听 `port`（0 表示由系统分配）
    pub fn bind(port: u16) -> Result<Self, NetError> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        let port = listener.local_addr()?.port();
        debug!("Reverse listener bound on port {}", port);
        Ok(Self { listener, port })
    }

    /// 实际监听的端口
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// 等待一个入站连接
    ///
    /// # 错误
    /// - `NetError::Timeout`: `timeout` 内无人连接
    pub fn accept(&self, timeout: Duration) -> Result<TcpTransport, NetError> {
        let stream = self.accept_stream(timeout)?;
        let transport = TcpTransport::from_stream(stream)?;
        info!("Accepted reverse connection from {}", transport.peer_addr());
        Ok(transport)
    }

    #[cfg(unix)]
    fn accept_stream(&self, timeout: Duration) -> Result<TcpStream, NetError> {
        use std::os::fd::AsFd;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NetError::Timeout);
            }
            if crate::poll::wait_readable(self.listener.as_fd(), remaining)? {
                let (stream, _) = self.listener.accept()?;
                return Ok(stream);
            }
        }
    }

    #[cfg(not(unix))]
    fn accept_stream(&self, timeout: Duration) -> Result<TcpStream, NetError> {
        use std::io::ErrorKind;

        let deadline = Instant::now() + timeout;
        self.listener.set_nonblocking(true)?;
        let result = loop {
            match self.listener.accept() {
                Ok((stream, _)) => break Ok(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        break Err(NetError::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                },
                Err(e) => break Err(NetError::Io(e)),
            }
        };
        self.listener.set_nonblocking(false)?;
        let stream = result?;
        stream.set_nonblocking(false)?;
        Ok(stream)
    }
}
