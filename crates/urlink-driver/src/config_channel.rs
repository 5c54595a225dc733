//! 配置通道
//!
//! 构造时先连接探测端口读取版本消息并关闭该连接，
//! 再连接稳态端口启动接收线程。接收线程把字节流缓存起来按长度前缀拆包，
//! 被 TCP 分段拆开的消息会在下一次读取后完整解码。

use crate::config::ChannelConfig;
use crate::connection::ConnectionState;
use crate::error::DriverError;
use crate::metrics::MetricsSnapshot;
use crate::state::{ConfigContext, ConfigSnapshot};
use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use urlink_net::{StreamRx, StreamTx, TcpTransport, TcpTx};
use urlink_protocol::{
    Capabilities, HANDSHAKE_READ_LEN, ProtocolVersion, SecondaryLayout, SecondaryMessage,
    find_version_message, unpack,
};

/// 单次读取的块大小
const READ_CHUNK: usize = 4096;

/// 连接探测端口并读取控制器版本
///
/// 读取控制器最先发送的数据（最多 512 字节），在其中查找版本消息。
/// 找到后等待 `handshake_settle_ms` 再关闭连接。
///
/// # 错误
/// - `DriverError::Handshake`: 超时前未收到版本消息
/// - `DriverError::UnsupportedVersion`: 主版本号低于支持下限
pub fn query_version(config: &ChannelConfig) -> Result<ProtocolVersion, DriverError> {
    let mut primary = TcpTransport::connect(&config.host, config.primary_port, config.connect_timeout())?;
    let deadline = Instant::now() + config.connect_timeout();
    let mut buf = [0u8; HANDSHAKE_READ_LEN];
    let mut len = 0;

    let message = loop {
        if let Some(message) = find_version_message(&buf[..len]) {
            break message;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || len == buf.len() {
            primary.close();
            return Err(DriverError::Handshake(format!(
                "no version message in {len} bytes from {}:{}",
                config.host, config.primary_port
            )));
        }
        if primary.poll_readable(remaining)? {
            len += primary.read_available(&mut buf[len..])?;
        }
    };

    let version = message.version;
    info!(
        "Controller {} version {} (built {})",
        message.project_name, version, message.build_date
    );
    if version.ensure_supported().is_err() {
        primary.close();
        return Err(DriverError::UnsupportedVersion(version));
    }

    thread::sleep(config.handshake_settle());
    primary.close();
    Ok(version)
}

/// 配置通道
///
/// 持有稳态连接的写端（用于上传脚本）和接收线程。
pub struct ConfigChannel {
    version: ProtocolVersion,
    caps: Capabilities,
    ctx: Arc<ConfigContext>,
    tx: Mutex<TcpTx>,
    keepalive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigChannel {
    /// 握手并启动接收线程
    pub fn connect(config: &ChannelConfig) -> Result<Self, DriverError> {
        let version = query_version(config)?;
        Self::connect_with_version(config, version)
    }

    /// 以已知版本连接稳态端口（跳过握手）
    pub fn connect_with_version(
        config: &ChannelConfig,
        version: ProtocolVersion,
    ) -> Result<Self, DriverError> {
        let caps = Capabilities::for_version(version);
        let ctx = Arc::new(ConfigContext::new(&caps.secondary));
        ctx.connection.set(ConnectionState::Connecting);

        let transport = match TcpTransport::connect(
            &config.host,
            config.secondary_port,
            config.connect_timeout(),
        ) {
            Ok(t) => t,
            Err(e) => {
                ctx.connection.set(ConnectionState::Disconnected);
                return Err(e.into());
            },
        };
        let (rx, tx) = transport.split()?;

        let keepalive = Arc::new(AtomicBool::new(true));
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let handle = {
            let ctx = ctx.clone();
            let keepalive = keepalive.clone();
            let layout = caps.secondary;
            let poll_timeout = config.poll_timeout();
            thread::Builder::new()
                .name("urlink-config-rx".into())
                .spawn(move || {
                    ctx.connection.set(ConnectionState::Streaming);
                    let _ = started_tx.send(());
                    config_rx_loop(rx, ctx, layout, poll_timeout, keepalive);
                })
                .map_err(|e| DriverError::Thread(e.to_string()))?
        };
        started_rx
            .recv_timeout(Duration::from_secs(1))
            .map_err(|_| DriverError::Thread("config receive thread did not start".into()))?;

        Ok(Self {
            version,
            caps,
            ctx,
            tx: Mutex::new(tx),
            keepalive,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn context(&self) -> &Arc<ConfigContext> {
        &self.ctx
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.ctx.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.connection.get()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 原样发送脚本文本
    ///
    /// # 错误
    /// - `DriverError::NotConnected`: 通道不处于 Streaming 状态
    pub fn send_script(&self, text: &str) -> Result<(), DriverError> {
        if !self.connection_state().is_streaming() {
            return Err(DriverError::NotConnected);
        }
        self.tx.lock().write_all(text.as_bytes())?;
        self.ctx.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
        debug!("Uploaded {} bytes of script over config channel", text.len());
        Ok(())
    }

    /// 停止接收线程并关闭连接
    ///
    /// 最坏延迟为一个 poll 超时。重复调用无副作用。
    pub fn halt(&self) {
        self.keepalive.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!("Config receive thread panicked");
        }
        self.tx.lock().close();
    }
}

impl Drop for ConfigChannel {
    fn drop(&mut self) {
        self.halt();
    }
}

/// 配置通道接收循环
///
/// # 参数
/// - `rx`: 稳态连接读取端
/// - `ctx`: 共享状态上下文
/// - `layout`: 握手确定的消息布局
/// - `poll_timeout`: 可读等待超时
/// - `keepalive`: 运行标志
fn config_rx_loop(
    mut rx: impl StreamRx,
    ctx: Arc<ConfigContext>,
    layout: SecondaryLayout,
    poll_timeout: Duration,
    keepalive: Arc<AtomicBool>,
) {
    info!("Config channel: receive loop started");
    let mut pending = BytesMut::with_capacity(READ_CHUNK * 2);
    let mut chunk = [0u8; READ_CHUNK];

    while keepalive.load(Ordering::Acquire) {
        match rx.poll_readable(poll_timeout) {
            Ok(true) => {},
            Ok(false) => {
                ctx.metrics.poll_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                error!("Config channel: poll failed: {}", e);
                break;
            },
        }

        match rx.read_available(&mut chunk) {
            Ok(n) => pending.extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!("Config channel: read failed: {}", e);
                break;
            },
        }

        let mut unpacked = unpack(&pending, &layout);
        pending.advance(unpacked.consumed);
        if let Some(e) = unpacked.corrupt.take() {
            // 帧头损坏后无法在字节流中重新定位，只丢弃损坏处之后的数据
            warn!("Config channel: corrupt message header ({}), dropping {} bytes", e, pending.len());
            ctx.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
            pending.clear();
        }

        let received = (unpacked.messages.len() + unpacked.malformed) as u64;
        ctx.metrics.frames_received.fetch_add(received, Ordering::Relaxed);
        if unpacked.malformed > 0 {
            warn!("Config channel: dropped {} malformed messages", unpacked.malformed);
            ctx.metrics
                .frames_dropped
                .fetch_add(unpacked.malformed as u64, Ordering::Relaxed);
        }

        for message in unpacked.messages {
            match message {
                SecondaryMessage::RobotState(packages) => {
                    {
                        let mut snapshot = ctx.snapshot.write();
                        if let Some(mode) = packages.robot_mode {
                            snapshot.robot_mode = mode;
                        }
                        if let Some(board) = packages.masterboard {
                            snapshot.masterboard = board;
                        }
                        snapshot.new_data = true;
                    }
                    ctx.metrics.frames_decoded.fetch_add(1, Ordering::Relaxed);
                    ctx.signal.notify();
                },
                SecondaryMessage::Version(v) => {
                    debug!("Config channel: version message {}", v.version);
                },
                other => trace!("Config channel: ignored {:?}", other),
            }
        }
    }

    ctx.snapshot.write().set_disconnected();
    ctx.connection.set(ConnectionState::Disconnected);
    ctx.signal.notify();
    info!("Config channel: receive loop exited");
}
