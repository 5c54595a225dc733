//! Commander - 控制程序上传与反向设定点通道
//!
//! 执行轨迹前的建立顺序：
//! 1. 反向端口在构造时已经监听
//! 2. 生成驱动程序文本，经配置通道上传，程序内会回连本机
//! 3. 接受控制器的回连；超时即失败，轨迹不会开始
//!
//! 之后以 `servoj_time / 4` 的周期发送设定点帧（28 字节），
//! 结束或被抢占时发送 keepalive = 0 的帧（位置取最新实际关节角）并关闭连接。
//!
//! IO / 负载 / 停止等命令包装为 secondary program 经实时通道发送。

use crate::config::{
    CommanderConfig, clamp_gain, clamp_lookahead_time, clamp_servoj_time,
};
use crate::error::ClientError;
use crate::trajectory::Trajectory;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use urlink_driver::{ConfigChannel, DriverError, RealtimeChannel};
use urlink_net::{NetError, ReverseListener, StreamTx, TcpTransport};
use urlink_protocol::{Capabilities, JointVector, ProtocolVersion, ServoParams, SetpointFrame, script};

/// 轨迹执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryOutcome {
    /// 时间走到最后一个路点
    Completed,
    /// 执行中被 [`Commander::stop_trajectory`] 或 [`Commander::halt`] 打断
    Preempted,
}

/// 命令端
///
/// 持有配置通道和实时通道；所有方法取 `&self`，可在多个线程间共享
/// （例如一个线程执行轨迹，另一个线程调用 `stop_trajectory`）。
pub struct Commander {
    config_channel: ConfigChannel,
    realtime: RealtimeChannel,
    listener: Mutex<Option<Arc<ReverseListener>>>,
    reverse_port: u16,
    reverse: Mutex<Option<TcpTransport>>,
    /// halt 后为 false
    keepalive: AtomicBool,
    executing: AtomicBool,
    servo: Mutex<ServoParams>,
    min_payload: f64,
    max_payload: f64,
    accept_timeout: Duration,
    poll_timeout: Duration,
}

impl Commander {
    /// 握手、连接两个通道并监听反向端口
    ///
    /// # 错误
    /// - `ClientError::Driver(DriverError::UnsupportedVersion)`: 固件版本过低
    /// - `ClientError::Net`: 反向端口无法监听
    pub fn connect(config: &CommanderConfig) -> Result<Self, ClientError> {
        let listener = ReverseListener::bind(config.reverse_port)?;
        let reverse_port = listener.local_port();

        let config_channel = ConfigChannel::connect(&config.channel)?;
        let caps = *config_channel.capabilities();
        let realtime = RealtimeChannel::connect(&config.channel, caps)?;
        info!(
            "Commander ready: firmware {}, reverse port {}",
            caps.version, reverse_port
        );

        Ok(Self {
            config_channel,
            realtime,
            listener: Mutex::new(Some(Arc::new(listener))),
            reverse_port,
            reverse: Mutex::new(None),
            keepalive: AtomicBool::new(true),
            executing: AtomicBool::new(false),
            servo: Mutex::new(config.servo_params()),
            min_payload: config.min_payload,
            max_payload: config.max_payload,
            accept_timeout: config.accept_timeout(),
            poll_timeout: config.channel.poll_timeout(),
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.config_channel.version()
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.config_channel.capabilities()
    }

    pub fn config_channel(&self) -> &ConfigChannel {
        &self.config_channel
    }

    pub fn realtime(&self) -> &RealtimeChannel {
        &self.realtime
    }

    /// 实际监听的反向端口
    pub fn reverse_port(&self) -> u16 {
        self.reverse_port
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    pub fn servo_params(&self) -> ServoParams {
        *self.servo.lock()
    }

    /// 上传驱动程序并等待控制器回连
    ///
    /// # 错误
    /// - `ClientError::ReverseAccept`: 超时内没有回连
    /// - `ClientError::Driver(DriverError::NotConnected)`: 已 halt
    pub fn open_servo(&self) -> Result<(), ClientError> {
        if self.accept_reverse(|| false)? {
            Ok(())
        } else {
            Err(DriverError::NotConnected.into())
        }
    }

    /// 上传驱动程序后按 `poll_timeout` 分段等待回连，每段之间检查 halt 和 `abort`
    ///
    /// 返回 `Ok(false)` 表示等待被放弃，此时没有保留反向连接。
    fn accept_reverse(&self, abort: impl Fn() -> bool) -> Result<bool, ClientError> {
        // 不能持锁等待，否则 halt 要等到接受超时
        let listener = self
            .listener
            .lock()
            .clone()
            .ok_or(DriverError::NotConnected)?;
        let port = listener.local_port();

        let host = self.realtime.local_ip().to_string();
        let program = script::driver_program(self.capabilities(), &host, port, &self.servo_params());
        self.config_channel.send_script(&program)?;
        debug!("Driver program uploaded, waiting for {}:{}", host, port);

        let deadline = Instant::now() + self.accept_timeout;
        let connection = loop {
            if !self.keepalive.load(Ordering::Acquire) || abort() {
                debug!("Stopped waiting for reverse connection");
                return Ok(false);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match listener.accept(remaining.min(self.poll_timeout)) {
                Ok(connection) => break connection,
                Err(NetError::Timeout) if Instant::now() < deadline => continue,
                Err(source) => return Err(ClientError::ReverseAccept { port, source }),
            }
        };
        *self.reverse.lock() = Some(connection);

        // halt 可能发生在接受之后、保存之前
        if !self.keepalive.load(Ordering::Acquire) {
            self.close_servo();
            return Ok(false);
        }
        Ok(true)
    }

    /// 发送一帧设定点
    ///
    /// 反向连接未建立时记录错误并直接返回。
    pub fn servoj(&self, positions: &JointVector, keepalive: i32) -> Result<(), ClientError> {
        let mut reverse = self.reverse.lock();
        let Some(connection) = reverse.as_mut() else {
            error!("servoj: reverse connection is not open");
            return Ok(());
        };
        connection.write_all(&SetpointFrame::new(*positions, keepalive).encode())?;
        Ok(())
    }

    /// 发送 keepalive = 0 帧（最新实际关节角）并关闭反向连接
    pub fn close_servo(&self) {
        let Some(mut connection) = self.reverse.lock().take() else {
            return;
        };
        let frame = SetpointFrame::shutdown(self.realtime.latest().q_actual);
        if let Err(e) = connection.write_all(&frame.encode()) {
            warn!("Shutdown setpoint not sent: {}", e);
        }
        connection.close();
        debug!("Reverse connection closed");
    }

    /// 按列给出的路点执行轨迹（阻塞到结束或被抢占）
    ///
    /// # 参数
    /// - `timestamps`: 路点时间（秒，非递减，从 ≥0 开始）
    /// - `positions`: 路点关节角，每项 6 个元素
    /// - `velocities`: 路点关节速度，每项 6 个元素
    pub fn execute_trajectory(
        &self,
        timestamps: &[f64],
        positions: &[Vec<f64>],
        velocities: &[Vec<f64>],
    ) -> Result<TrajectoryOutcome, ClientError> {
        let trajectory = Trajectory::from_columns(timestamps, positions, velocities)?;
        self.execute(&trajectory)
    }

    /// 执行已校验的轨迹
    ///
    /// # 错误
    /// - `ClientError::Busy`: 已有轨迹在执行
    /// - `ClientError::ReverseAccept`: 控制器未回连
    pub fn execute(&self, trajectory: &Trajectory) -> Result<TrajectoryOutcome, ClientError> {
        if self.executing.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Busy);
        }
        let result = self.run(trajectory);
        self.executing.store(false, Ordering::Release);
        result
    }

    fn run(&self, trajectory: &Trajectory) -> Result<TrajectoryOutcome, ClientError> {
        if !self.accept_reverse(|| !self.executing.load(Ordering::Acquire))? {
            info!("Trajectory preempted before the controller connected back");
            return Ok(TrajectoryOutcome::Preempted);
        }

        let tick = Duration::from_secs_f64(self.servo_params().time / 4.0);
        let end = trajectory.duration();
        let mut cursor = trajectory.cursor();
        info!(
            "Executing trajectory: {} waypoints over {:.3}s",
            trajectory.waypoints().len(),
            end
        );

        let start = Instant::now();
        let outcome = loop {
            if !self.executing.load(Ordering::Acquire) {
                break TrajectoryOutcome::Preempted;
            }
            let t = start.elapsed().as_secs_f64();
            if t > end {
                break TrajectoryOutcome::Completed;
            }
            let q = trajectory.sample(&mut cursor, t);
            if let Err(e) = self.servoj(&q, 1) {
                error!("Trajectory aborted: {}", e);
                self.close_servo();
                return Err(e);
            }
            spin_sleep::sleep(tick);
        };

        self.close_servo();
        info!("Trajectory finished: {:?}", outcome);
        Ok(outcome)
    }

    /// 打断正在执行的轨迹并让控制器停止关节运动
    pub fn stop_trajectory(&self) -> Result<(), ClientError> {
        self.executing.store(false, Ordering::Release);
        self.realtime.send_command(script::STOP_TRAJECTORY)?;
        Ok(())
    }

    /// 关节速度命令（实时通道）
    pub fn set_speed(&self, qd: &JointVector, acceleration: f64) -> Result<(), ClientError> {
        self.realtime.set_speed(qd, acceleration)?;
        Ok(())
    }

    pub fn set_digital_out(&self, pin: u32, value: bool) -> Result<(), ClientError> {
        self.send(&script::digital_out(self.capabilities(), pin, value))
    }

    pub fn set_analog_out(&self, pin: u32, value: f64) -> Result<(), ClientError> {
        self.send(&script::analog_out(self.capabilities(), pin, value))
    }

    pub fn set_tool_voltage(&self, volts: u32) -> Result<(), ClientError> {
        self.send(&script::tool_voltage(volts))
    }

    pub fn set_flag(&self, index: u32, value: bool) -> Result<(), ClientError> {
        self.send(&script::flag(index, value))
    }

    /// 设置负载；超出 `(min_payload, max_payload)` 时不发送并返回 `false`
    pub fn set_payload(&self, kg: f64) -> Result<bool, ClientError> {
        if !(kg > self.min_payload && kg < self.max_payload) {
            warn!(
                "Payload {} kg outside ({}, {}), ignored",
                kg, self.min_payload, self.max_payload
            );
            return Ok(false);
        }
        self.send(&script::payload(kg))?;
        Ok(true)
    }

    /// 下限 0.008 秒，只影响之后上传的驱动程序
    pub fn set_servoj_time(&self, t: f64) {
        self.servo.lock().time = clamp_servoj_time(t);
    }

    /// 限制在 0.03..=0.2 秒
    pub fn set_servoj_lookahead_time(&self, t: f64) {
        self.servo.lock().lookahead_time = clamp_lookahead_time(t);
    }

    /// 限制在 100..=2000
    pub fn set_servoj_gain(&self, gain: f64) {
        self.servo.lock().gain = clamp_gain(gain);
    }

    fn send(&self, program: &str) -> Result<(), ClientError> {
        self.realtime.send_command(program)?;
        Ok(())
    }

    /// 停止轨迹、关闭反向连接和监听端口、停止两个通道
    ///
    /// 重复调用无副作用。
    pub fn halt(&self) {
        self.keepalive.store(false, Ordering::Release);
        self.executing.store(false, Ordering::Release);
        self.close_servo();
        self.listener.lock().take();
        self.realtime.halt();
        self.config_channel.halt();
    }
}

impl Drop for Commander {
    fn drop(&mut self) {
        self.halt();
    }
}
