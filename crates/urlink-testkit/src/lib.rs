//! # urlink Testkit
//!
//! 本地回环上的模拟控制器，供集成测试使用：
//! - 探测端口：每个连接先发送一条 RobotState，再发送版本消息
//! - 配置端口：周期发送 RobotState，记录收到的脚本文本；
//!   脚本中出现 `socket_open("host", port)` 时主动回连并记录设定点帧
//! - 实时端口：按版本布局周期（或按需）发送实时帧，记录收到的命令文本
//!
//! 所有端口都由系统分配。

use bytes::BytesMut;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use urlink_protocol::reverse::REVERSE_FRAME_LEN;
use urlink_protocol::{
    ProtocolVersion, RealtimeLayout, RealtimeState, RobotModeData, RobotStatePackages,
    SecondaryLayout, SetpointFrame, VersionMessage,
};

/// 模拟控制器参数
#[derive(Debug, Clone)]
pub struct FakeControllerConfig {
    /// 握手时报告的版本
    pub version: ProtocolVersion,
    /// 实时帧周期；`None` 表示只发送 [`FakeController::push_realtime_frames`] 排队的帧
    pub realtime_period: Option<Duration>,
    /// RobotState 发送周期
    pub robot_state_period: Duration,
}

impl Default for FakeControllerConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::with_revision(3, 1, 18024),
            realtime_period: Some(Duration::from_millis(8)),
            robot_state_period: Duration::from_millis(20),
        }
    }
}

struct Inner {
    config: FakeControllerConfig,
    running: AtomicBool,
    realtime_state: Mutex<RealtimeState>,
    robot_mode: Mutex<RobotModeData>,
    script_text: Mutex<String>,
    command_text: Mutex<String>,
    setpoints: Mutex<Vec<SetpointFrame>>,
    reverse_started: AtomicBool,
    reverse_closed: AtomicBool,
    realtime_frames_sent: AtomicU64,
    drop_realtime: AtomicBool,
    queue_tx: Sender<Vec<u8>>,
    queue_rx: Receiver<Vec<u8>>,
}

impl Inner {
    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn encode_realtime(&self) -> Option<Vec<u8>> {
        let layout = RealtimeLayout::for_version(self.config.version)?;
        let mut buf = BytesMut::new();
        self.realtime_state.lock().pack_to(&mut buf, &layout);
        Some(buf.to_vec())
    }

    fn encode_robot_state(&self) -> Vec<u8> {
        let layout = SecondaryLayout::for_version(self.config.version);
        let mut buf = BytesMut::new();
        RobotStatePackages {
            robot_mode: Some(self.robot_mode.lock().clone()),
            masterboard: Some(Default::default()),
        }
        .pack_to(&mut buf, &layout);
        buf.to_vec()
    }

    fn encode_version(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        VersionMessage {
            timestamp: 0,
            source: -2,
            project_name: "URControl".to_string(),
            version: self.config.version,
            build_date: "01-01-2016, 00:00:00".to_string(),
        }
        .pack_to(&mut buf);
        buf.to_vec()
    }
}

/// 模拟控制器
///
/// Drop 时停止所有线程。
pub struct FakeController {
    inner: Arc<Inner>,
    primary_port: u16,
    secondary_port: u16,
    realtime_port: u16,
    threads: Vec<JoinHandle<()>>,
}

impl FakeController {
    pub fn start(config: FakeControllerConfig) -> Self {
        let (queue_tx, queue_rx) = unbounded();
        let inner = Arc::new(Inner {
            config,
            running: AtomicBool::new(true),
            realtime_state: Mutex::new(RealtimeState::default()),
            robot_mode: Mutex::new(RobotModeData {
                is_robot_connected: true,
                is_real_robot_enabled: true,
                is_power_on_robot: true,
                robot_mode: 7,
                speed_scaling: 1.0,
                target_speed_fraction: 1.0,
                ..Default::default()
            }),
            script_text: Mutex::new(String::new()),
            command_text: Mutex::new(String::new()),
            setpoints: Mutex::new(Vec::new()),
            reverse_started: AtomicBool::new(false),
            reverse_closed: AtomicBool::new(false),
            realtime_frames_sent: AtomicU64::new(0),
            drop_realtime: AtomicBool::new(false),
            queue_tx,
            queue_rx,
        });

        let primary = bind();
        let secondary = bind();
        let realtime = bind();
        let primary_port = port_of(&primary);
        let secondary_port = port_of(&secondary);
        let realtime_port = port_of(&realtime);

        let threads = vec![
            spawn_accept(primary, inner.clone(), serve_primary),
            spawn_accept(secondary, inner.clone(), serve_secondary),
            spawn_accept(realtime, inner.clone(), serve_realtime),
        ];

        Self {
            inner,
            primary_port,
            secondary_port,
            realtime_port,
            threads,
        }
    }

    pub fn with_version(major: u8, minor: u8) -> Self {
        Self::start(FakeControllerConfig {
            version: ProtocolVersion::with_revision(major, minor, 1),
            ..Default::default()
        })
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn primary_port(&self) -> u16 {
        self.primary_port
    }

    pub fn secondary_port(&self) -> u16 {
        self.secondary_port
    }

    pub fn realtime_port(&self) -> u16 {
        self.realtime_port
    }

    pub fn version(&self) -> ProtocolVersion {
        self.inner.config.version
    }

    /// 修改之后发送的实时帧内容
    pub fn set_realtime_state(&self, update: impl FnOnce(&mut RealtimeState)) {
        update(&mut self.inner.realtime_state.lock());
    }

    pub fn set_robot_mode(&self, update: impl FnOnce(&mut RobotModeData)) {
        update(&mut self.inner.robot_mode.lock());
    }

    /// 排队 `n` 个按当前状态编码的实时帧
    pub fn push_realtime_frames(&self, n: usize) {
        for _ in 0..n {
            if let Some(frame) = self.inner.encode_realtime() {
                let _ = self.inner.queue_tx.send(frame);
            }
        }
    }

    /// 排队一段原始字节（例如长度错误的帧）
    pub fn push_raw_realtime(&self, bytes: Vec<u8>) {
        let _ = self.inner.queue_tx.send(bytes);
    }

    /// 已发送的实时帧（含原始字节）数
    pub fn realtime_frames_sent(&self) -> u64 {
        self.inner.realtime_frames_sent.load(Ordering::Acquire)
    }

    /// 关闭当前实时连接（模拟控制器断开）
    pub fn drop_realtime_connection(&self) {
        self.inner.drop_realtime.store(true, Ordering::Release);
    }

    /// 配置端口收到的全部文本
    pub fn script_text(&self) -> String {
        self.inner.script_text.lock().clone()
    }

    /// 实时端口收到的全部文本
    pub fn command_text(&self) -> String {
        self.inner.command_text.lock().clone()
    }

    /// 已收到的设定点帧
    pub fn setpoints(&self) -> Vec<SetpointFrame> {
        self.inner.setpoints.lock().clone()
    }

    pub fn reverse_started(&self) -> bool {
        self.inner.reverse_started.load(Ordering::Acquire)
    }

    /// 回连已由本地端关闭
    pub fn reverse_closed(&self) -> bool {
        self.inner.reverse_closed.load(Ordering::Acquire)
    }

    /// 轮询直到条件成立或超时
    pub fn wait_until(&self, timeout: Duration, mut predicate: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        predicate(self)
    }
}

impl Drop for FakeController {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// 统计文本中零速度命令的次数
pub fn count_zero_speed(text: &str) -> usize {
    text.matches("speedj([0.00000, 0.00000, 0.00000, 0.00000, 0.00000, 0.00000]")
        .count()
}

fn bind() -> TcpListener {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    listener.set_nonblocking(true).expect("nonblocking listener");
    listener
}

fn port_of(listener: &TcpListener) -> u16 {
    listener.local_addr().expect("local addr").port()
}

fn spawn_accept(
    listener: TcpListener,
    inner: Arc<Inner>,
    serve: fn(TcpStream, Arc<Inner>),
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut workers = Vec::new();
        while inner.running() {
            match listener.accept() {
                Ok((stream, _)) => {
                    let _ = stream.set_nonblocking(false);
                    let _ = stream.set_nodelay(true);
                    let inner = inner.clone();
                    workers.push(thread::spawn(move || serve(stream, inner)));
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(2));
                },
                Err(_) => break,
            }
        }
        for w in workers {
            let _ = w.join();
        }
    })
}

fn script_sink(inner: &Inner) -> &Mutex<String> {
    &inner.script_text
}

fn command_sink(inner: &Inner) -> &Mutex<String> {
    &inner.command_text
}

/// 读取对端写入的文本，直到对端关闭或控制器停止
fn spawn_text_reader(
    mut stream: TcpStream,
    inner: Arc<Inner>,
    sink: fn(&Inner) -> &Mutex<String>,
    on_text: Option<fn(&Arc<Inner>)>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let _ = stream.set_read_timeout(Some(Duration::from_millis(10)));
        let mut buf = [0u8; 4096];
        while inner.running() {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    sink(&inner).lock().push_str(&String::from_utf8_lossy(&buf[..n]));
                    if let Some(f) = on_text {
                        f(&inner);
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
                Err(_) => break,
            }
        }
    })
}

fn serve_primary(mut stream: TcpStream, inner: Arc<Inner>) {
    let mut reply = inner.encode_robot_state();
    reply.extend_from_slice(&inner.encode_version());
    if stream.write_all(&reply).is_err() {
        return;
    }
    // 保持连接直到对端关闭
    let _ = stream.set_read_timeout(Some(Duration::from_millis(10)));
    let mut buf = [0u8; 64];
    while inner.running() {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => {},
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
            Err(_) => break,
        }
    }
}

fn serve_secondary(mut stream: TcpStream, inner: Arc<Inner>) {
    let reader = match stream.try_clone() {
        Ok(s) => spawn_text_reader(s, inner.clone(), script_sink, Some(maybe_connect_back as fn(&Arc<Inner>))),
        Err(_) => return,
    };
    let period = inner.config.robot_state_period;
    while inner.running() {
        if stream.write_all(&inner.encode_robot_state()).is_err() {
            break;
        }
        thread::sleep(period);
    }
    let _ = stream.shutdown(Shutdown::Both);
    let _ = reader.join();
}

fn serve_realtime(mut stream: TcpStream, inner: Arc<Inner>) {
    inner.drop_realtime.store(false, Ordering::Release);
    let reader = match stream.try_clone() {
        Ok(s) => spawn_text_reader(s, inner.clone(), command_sink, None),
        Err(_) => return,
    };
    let mut next_periodic = Instant::now();
    while inner.running() && !inner.drop_realtime.load(Ordering::Acquire) {
        let frame = if let Ok(raw) = inner.queue_rx.try_recv() {
            Some(raw)
        } else if let Some(period) = inner.config.realtime_period
            && Instant::now() >= next_periodic
        {
            next_periodic += period;
            inner.encode_realtime()
        } else {
            None
        };

        match frame {
            Some(bytes) => {
                if stream.write_all(&bytes).is_err() {
                    break;
                }
                inner.realtime_frames_sent.fetch_add(1, Ordering::AcqRel);
            },
            None => thread::sleep(Duration::from_millis(1)),
        }
    }
    debug!("Fake realtime connection closing");
    let _ = stream.shutdown(Shutdown::Both);
    let _ = reader.join();
}

/// 从脚本文本中提取 `socket_open("host", port)`
pub fn parse_socket_open(text: &str) -> Option<(String, u16)> {
    let start = text.find("socket_open(\"")? + "socket_open(\"".len();
    let rest = &text[start..];
    let host_end = rest.find('"')?;
    let host = &rest[..host_end];
    let after = rest[host_end + 1..].trim_start_matches([',', ' ']);
    let port_end = after.find(')')?;
    let port = after[..port_end].trim().parse().ok()?;
    Some((host.to_string(), port))
}

fn maybe_connect_back(inner: &Arc<Inner>) {
    let target = {
        let text = inner.script_text.lock();
        // 只在完整程序到达后回连
        if !text.contains("\nend\n") {
            return;
        }
        parse_socket_open(&text)
    };
    let Some((host, port)) = target else {
        return;
    };
    if inner.reverse_started.swap(true, Ordering::AcqRel) {
        return;
    }

    let inner = inner.clone();
    thread::spawn(move || {
        let mut stream = match TcpStream::connect((host.as_str(), port)) {
            Ok(s) => s,
            Err(e) => {
                debug!("Fake controller failed to connect back: {}", e);
                return;
            },
        };
        let _ = stream.set_read_timeout(Some(Duration::from_millis(10)));
        let mut frame = [0u8; REVERSE_FRAME_LEN];
        let mut filled = 0;
        while inner.running() {
            match stream.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == REVERSE_FRAME_LEN {
                        filled = 0;
                        if let Ok(setpoint) = SetpointFrame::decode(&frame) {
                            trace!("Fake controller setpoint {:?}", setpoint);
                            inner.setpoints.lock().push(setpoint);
                        }
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
                Err(_) => break,
            }
        }
        inner.reverse_closed.store(true, Ordering::Release);
    });
}
