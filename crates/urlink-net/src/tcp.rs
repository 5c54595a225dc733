//! TCP 连接及其读写分离

use crate::{NetError, StreamRx, StreamTx};
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// 单条 TCP 连接
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// 连接 `host:port`，依次尝试解析出的每个地址
    ///
    /// # 错误
    /// - `NetError::Resolve`: 无法解析出任何地址
    /// - `NetError::Timeout`: 所有地址均连接超时
    /// - `NetError::Io`: 其他连接错误（如连接被拒绝）
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, NetError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| NetError::Resolve(format!("{host}:{port}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::Resolve(format!("{host}:{port}")));
        }

        let mut last_err = NetError::Resolve(format!("{host}:{port}"));
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    debug!("Connected to {}", addr);
                    return Self::from_stream(stream);
                },
                Err(e) if e.kind() == ErrorKind::TimedOut => last_err = NetError::Timeout,
                Err(e) => last_err = NetError::Io(e),
            }
        }
        Err(last_err)
    }

    /// 包装已建立的连接（例如 `accept` 得到的）
    pub fn from_stream(stream: TcpStream) -> Result<Self, NetError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 本端地址（对端可回连的本机 IP）
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.stream.local_addr()?)
    }

    pub fn local_ip(&self) -> Result<IpAddr, NetError> {
        Ok(self.local_addr()?.ip())
    }

    /// 拆分为独立的读、写两端（共享同一个 socket）
    pub fn split(self) -> Result<(TcpRx, TcpTx), NetError> {
        let tx_stream = self.stream.try_clone()?;
        Ok((
            TcpRx {
                stream: self.stream,
            },
            TcpTx { stream: tx_stream },
        ))
    }

    /// 关闭连接（两个方向）
    pub fn close(&self) {
        shutdown(&self.stream);
    }
}

fn shutdown(stream: &TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        // 对端已先关闭时 shutdown 会返回 NotConnected
        trace!("shutdown: {}", e);
    }
}

fn poll_stream(stream: &TcpStream, timeout: Duration) -> Result<bool, NetError> {
    #[cfg(unix)]
    {
        use std::os::fd::AsFd;
        crate::poll::wait_readable(stream.as_fd(), timeout)
    }
    #[cfg(not(unix))]
    {
        crate::poll::wait_stream_readable(stream, timeout)
    }
}

fn read_exact(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), NetError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(NetError::Disconnected),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(NetError::Timeout);
            },
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                return Err(NetError::Disconnected);
            },
            Err(e) => return Err(NetError::Io(e)),
        }
    }
    Ok(())
}

fn read_available(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, NetError> {
    loop {
        match stream.read(buf) {
            Ok(0) => return Err(NetError::Disconnected),
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                return Err(NetError::Disconnected);
            },
            Err(e) => return Err(NetError::Io(e)),
        }
    }
}

fn write_all(stream: &mut TcpStream, bytes: &[u8]) -> Result<(), NetError> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(NetError::ShortWrite {
                    written,
                    expected: bytes.len(),
                });
            },
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) => {
                return Err(NetError::ShortWrite {
                    written,
                    expected: bytes.len(),
                });
            },
            Err(e) => return Err(NetError::Io(e)),
        }
    }
    Ok(())
}

impl StreamRx for TcpTransport {
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, NetError> {
        poll_stream(&self.stream, timeout)
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        read_exact(&mut self.stream, buf)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        read_available(&mut self.stream, buf)
    }
}

impl StreamTx for TcpTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        write_all(&mut self.stream, bytes)
    }
}

/// 读取端（由接收线程独占）
#[derive(Debug)]
pub struct TcpRx {
    stream: TcpStream,
}

impl StreamRx for TcpRx {
    fn poll_readable(&mut self, timeout: Duration) -> Result<bool, NetError> {
        poll_stream(&self.stream, timeout)
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        read_exact(&mut self.stream, buf)
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        read_available(&mut self.stream, buf)
    }
}

/// 写入端
#[derive(Debug)]
pub struct TcpTx {
    stream: TcpStream,
}

impl TcpTx {
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.stream.local_addr()?)
    }

    /// 关闭连接；阻塞在读取端的线程会随之得到 `Disconnected`
    pub fn close(&self) {
        shutdown(&self.stream);
    }
}

impl StreamTx for TcpTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        write_all(&mut self.stream, bytes)
    }
}
