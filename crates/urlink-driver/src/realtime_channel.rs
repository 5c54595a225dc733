//! 实时通道
//!
//! ~125Hz 定长遥测帧。接收线程按长度前缀读取整帧，交给版本布局解码，
//! 成功后依次：写入三缓冲、更新最新值、唤醒等待者、运行安全看门狗。
//!
//! 速度命令以脚本文本（`speedj(...)`）经同一连接发送，不是二进制帧。

use crate::config::ChannelConfig;
use crate::connection::ConnectionState;
use crate::error::DriverError;
use crate::metrics::MetricsSnapshot;
use crate::state::RealtimeContext;
use crate::triple_buffer::{TripleReader, TripleWriter, triple_buffer};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use urlink_net::{StreamRx, StreamTx, TcpTransport, TcpTx};
use urlink_protocol::{Capabilities, JointVector, RealtimeState, decode_realtime, script};

/// 声明长度的合理上限（超出视为帧头损坏）
const MAX_FRAME_LEN: usize = 4096;

/// 接收线程与调用方共享的部分
struct Shared {
    ctx: RealtimeContext,
    tx: Mutex<TcpTx>,
    caps: Capabilities,
}

impl Shared {
    fn send(&self, text: &str) -> Result<(), DriverError> {
        if !self.ctx.connection.get().is_streaming() {
            return Err(DriverError::NotConnected);
        }
        self.write(text)
    }

    fn write(&self, text: &str) -> Result<(), DriverError> {
        self.tx.lock().write_all(text.as_bytes())?;
        self.ctx.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
        trace!("Realtime channel: sent {:?}", text.trim_end());
        Ok(())
    }

    fn zero_speed_command(&self, acceleration: f64) -> String {
        script::speedj(&self.caps, &[0.0; 6], acceleration)
    }
}

/// 实时通道
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    reader: Mutex<Option<TripleReader<RealtimeState>>>,
    keepalive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    local_ip: IpAddr,
    acceleration: f64,
}

impl RealtimeChannel {
    /// 连接实时端口并启动接收线程
    ///
    /// # 参数
    /// - `config`: 连接参数（端口、超时、看门狗上限、默认加速度）
    /// - `caps`: 握手确定的版本能力
    pub fn connect(config: &ChannelConfig, caps: Capabilities) -> Result<Self, DriverError> {
        let ctx = RealtimeContext::new(config.safety_count_max);
        ctx.connection.set(ConnectionState::Connecting);

        let transport =
            TcpTransport::connect(&config.host, config.realtime_port, config.connect_timeout())?;
        let local_ip = transport.local_ip()?;
        let (rx, tx) = transport.split()?;

        if caps.realtime.is_none() {
            warn!(
                "Realtime channel: no frame layout for version {}, all frames will be dropped",
                caps.version
            );
        }

        let shared = Arc::new(Shared {
            ctx,
            tx: Mutex::new(tx),
            caps,
        });
        let (writer, reader) = triple_buffer(RealtimeState::default());
        let keepalive = Arc::new(AtomicBool::new(true));
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);

        let handle = {
            let shared = shared.clone();
            let keepalive = keepalive.clone();
            let poll_timeout = config.poll_timeout();
            let acceleration = config.speed_acceleration;
            thread::Builder::new()
                .name("urlink-realtime-rx".into())
                .spawn(move || {
                    shared.ctx.connection.set(ConnectionState::Streaming);
                    let _ = started_tx.send(());
                    realtime_rx_loop(rx, writer, shared, poll_timeout, acceleration, keepalive);
                })
                .map_err(|e| DriverError::Thread(e.to_string()))?
        };
        started_rx
            .recv_timeout(Duration::from_secs(1))
            .map_err(|_| DriverError::Thread("realtime receive thread did not start".into()))?;

        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
            keepalive,
            handle: Mutex::new(Some(handle)),
            local_ip,
            acceleration: config.speed_acceleration,
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.shared.caps
    }

    /// 本端地址（控制器可回连的本机 IP）
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.ctx.connection.get()
    }

    pub fn context(&self) -> &RealtimeContext {
        &self.shared.ctx
    }

    /// 最新解码帧
    pub fn latest(&self) -> Arc<RealtimeState> {
        self.shared.ctx.latest()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.ctx.metrics.snapshot()
    }

    /// 取走三缓冲读端（只能取一次，单读者）
    pub fn take_reader(&self) -> Option<TripleReader<RealtimeState>> {
        self.reader.lock().take()
    }

    pub fn set_safety_count_max(&self, max: u32) {
        self.shared.ctx.watchdog.set_max(max);
    }

    /// 发送任意脚本文本，缺少结尾换行时补上
    ///
    /// # 错误
    /// - `DriverError::NotConnected`: 通道不处于 Streaming 状态
    pub fn send_command(&self, text: &str) -> Result<(), DriverError> {
        if text.ends_with('\n') {
            self.shared.send(text)
        } else {
            self.shared.send(&format!("{text}\n"))
        }
    }

    /// 关节速度命令
    ///
    /// 发送成功的非零速度会清零看门狗计数；调用方需持续刷新，
    /// 否则 `safety_count_max` 帧后通道自动发送零速度。
    pub fn set_speed(&self, qd: &JointVector, acceleration: f64) -> Result<(), DriverError> {
        let command = script::speedj(&self.shared.caps, qd, acceleration);
        self.shared.send(&command)?;
        if qd.iter().any(|v| *v != 0.0) {
            self.shared.ctx.watchdog.reset();
        }
        Ok(())
    }

    /// 使用默认加速度的速度命令
    pub fn set_speed_default(&self, qd: &JointVector) -> Result<(), DriverError> {
        self.set_speed(qd, self.acceleration)
    }

    /// 停止接收线程并关闭连接
    ///
    /// 线程退出前若仍连接，会发送一次零速度命令。重复调用无副作用。
    pub fn halt(&self) {
        self.keepalive.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!("Realtime receive thread panicked");
        }
        self.shared.tx.lock().close();
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.halt();
    }
}

/// 实时通道接收循环
///
/// # 参数
/// - `rx`: 实时连接读取端
/// - `writer`: 三缓冲写端（本线程独占）
/// - `shared`: 共享上下文与命令写端
/// - `poll_timeout`: 可读等待超时
/// - `acceleration`: 看门狗零速度命令使用的加速度
/// - `keepalive`: 运行标志
fn realtime_rx_loop(
    mut rx: impl StreamRx,
    mut writer: TripleWriter<RealtimeState>,
    shared: Arc<Shared>,
    poll_timeout: Duration,
    acceleration: f64,
    keepalive: Arc<AtomicBool>,
) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Realtime RX thread priority set to MAX"),
            Err(e) => warn!(
                "Failed to set realtime RX thread priority: {:?}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            ),
        }
    }

    info!("Realtime channel: receive loop started");
    let ctx = &shared.ctx;
    let layout = shared.caps.realtime;
    let mut frame = Vec::with_capacity(MAX_FRAME_LEN);

    let disconnected = loop {
        if !keepalive.load(Ordering::Acquire) {
            break false;
        }

        match rx.poll_readable(poll_timeout) {
            Ok(true) => {},
            Ok(false) => {
                ctx.metrics.poll_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                error!("Realtime channel: poll failed: {}", e);
                break true;
            },
        }

        let mut prefix = [0u8; 4];
        if let Err(e) = rx.read_exact_into(&mut prefix) {
            warn!("Realtime channel: read failed: {}", e);
            break true;
        }
        let declared = i32::from_be_bytes(prefix);
        if declared < 4 || declared as usize > MAX_FRAME_LEN {
            // 长度前缀损坏，无法按帧边界重新同步
            error!("Realtime channel: corrupt frame length {}", declared);
            break true;
        }

        frame.clear();
        frame.extend_from_slice(&prefix);
        frame.resize(declared as usize, 0);
        if let Err(e) = rx.read_exact_into(&mut frame[4..]) {
            warn!("Realtime channel: read failed mid-frame: {}", e);
            break true;
        }
        ctx.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

        let Some(layout) = layout.as_ref() else {
            ctx.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        };
        let state = match decode_realtime(&frame, layout) {
            Ok(state) => state,
            Err(e) => {
                debug!("Realtime channel: dropped frame: {}", e);
                ctx.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            },
        };

        ctx.latest.store(Arc::new(state.clone()));
        writer.publish(state);
        ctx.metrics.frames_decoded.fetch_add(1, Ordering::Relaxed);
        ctx.signal.notify();

        if ctx.watchdog.on_frame() {
            warn!(
                "Realtime channel: no speed command for {} frames, stopping",
                ctx.watchdog.max()
            );
            ctx.metrics.watchdog_trips.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = shared.write(&shared.zero_speed_command(acceleration)) {
                error!("Realtime channel: failed to send zero speed: {}", e);
                break true;
            }
        }
    };

    if !disconnected && let Err(e) = shared.write(&shared.zero_speed_command(acceleration)) {
        warn!("Realtime channel: final zero speed not sent: {}", e);
    }
    ctx.connection.set(ConnectionState::Disconnected);
    shared.tx.lock().close();
    ctx.signal.notify();
    info!("Realtime channel: receive loop exited");
}
