//! RobotDriverFacade - 面向可视化层的位姿发布
//!
//! 独立消费线程等待实时通道的更新信号，每次取出最新帧：
//! 1. 复制实际关节角并加上安装偏置（J2、J4 各 +π/2）
//! 2. 按固定关节轴表计算每个关节的旋转四元数
//! 3. 发布到自己的三缓冲，外部非阻塞读取

use crate::commander::Commander;
use crate::config::CommanderConfig;
use crate::error::ClientError;
use nalgebra::{Unit, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};
use urlink_driver::{ConnectionState, TripleReader, TripleWriter, UpdateSignal, triple_buffer};
use urlink_protocol::{JOINT_COUNT, JointVector, RealtimeState};

/// 安装偏置（rad），加到实际关节角上
pub const MOUNTING_OFFSETS: JointVector = [0.0, FRAC_PI_2, 0.0, FRAC_PI_2, 0.0, 0.0];

/// 关节旋转轴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointAxis {
    Y,
    Z,
}

impl JointAxis {
    fn unit(self) -> Unit<Vector3<f64>> {
        match self {
            JointAxis::Y => Vector3::y_axis(),
            JointAxis::Z => Vector3::z_axis(),
        }
    }
}

/// 基座、肩、肘、腕 1、腕 2、腕 3
pub const JOINT_AXES: [JointAxis; JOINT_COUNT] = [
    JointAxis::Z,
    JointAxis::Y,
    JointAxis::Y,
    JointAxis::Y,
    JointAxis::Z,
    JointAxis::Y,
];

/// 发布给外部的位姿记录
#[derive(Debug, Clone, PartialEq)]
pub struct JointPose {
    /// 控制器时间（秒）
    pub time: f64,
    /// 加偏置后的关节角（rad）
    pub angles: JointVector,
    /// 各关节绕自身轴的旋转
    pub rotations: [UnitQuaternion<f64>; JOINT_COUNT],
    /// 工具位置（m）
    pub tool_position: [f64; 3],
    /// 工具姿态旋转向量（rad）
    pub tool_rotation: [f64; 3],
}

impl Default for JointPose {
    fn default() -> Self {
        Self {
            time: 0.0,
            angles: [0.0; JOINT_COUNT],
            rotations: [UnitQuaternion::identity(); JOINT_COUNT],
            tool_position: [0.0; 3],
            tool_rotation: [0.0; 3],
        }
    }
}

impl JointPose {
    /// 工具姿态（由旋转向量转换）
    pub fn tool_orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_scaled_axis(Vector3::from(self.tool_rotation))
    }
}

/// 由实时帧计算位姿
pub fn compute_pose(state: &RealtimeState) -> JointPose {
    let mut angles = state.q_actual;
    for (angle, offset) in angles.iter_mut().zip(MOUNTING_OFFSETS) {
        *angle += offset;
    }
    let rotations =
        std::array::from_fn(|i| UnitQuaternion::from_axis_angle(&JOINT_AXES[i].unit(), angles[i]));
    let tool = &state.tool_vector_actual;

    JointPose {
        time: state.time,
        angles,
        rotations,
        tool_position: [tool[0], tool[1], tool[2]],
        tool_rotation: [tool[3], tool[4], tool[5]],
    }
}

/// 驱动门面
///
/// 持有一个 [`Commander`]（它又持有两个通道）和位姿消费线程。
pub struct RobotDriverFacade {
    commander: Arc<Commander>,
    poses: Mutex<TripleReader<JointPose>>,
    pose_signal: Arc<UpdateSignal>,
    keepalive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RobotDriverFacade {
    /// 建立 Commander 并启动位姿线程
    pub fn connect(config: &CommanderConfig) -> Result<Self, ClientError> {
        let commander = Commander::connect(config)?;
        Self::new(commander, config.channel.poll_timeout())
    }

    /// 接管已连接的 Commander
    ///
    /// # 参数
    /// - `commander`: 已连接的命令端，其实时通道的读端必须未被取走
    /// - `poll_timeout`: 等待更新信号的上限，也是 `halt()` 的最坏延迟
    pub fn new(commander: Commander, poll_timeout: Duration) -> Result<Self, ClientError> {
        let realtime_reader = commander
            .realtime()
            .take_reader()
            .ok_or(ClientError::ReaderTaken)?;
        let commander = Arc::new(commander);
        let (writer, poses) = triple_buffer(JointPose::default());
        let pose_signal = Arc::new(UpdateSignal::new());
        let keepalive = Arc::new(AtomicBool::new(true));

        let handle = {
            let commander = commander.clone();
            let pose_signal = pose_signal.clone();
            let keepalive = keepalive.clone();
            thread::Builder::new()
                .name("urlink-pose".into())
                .spawn(move || {
                    pose_loop(
                        commander,
                        realtime_reader,
                        writer,
                        pose_signal,
                        poll_timeout,
                        keepalive,
                    )
                })
                .map_err(|e| ClientError::Thread(e.to_string()))?
        };

        Ok(Self {
            commander,
            poses: Mutex::new(poses),
            pose_signal,
            keepalive,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    /// 有新位姿时返回它，否则立即返回 `None`
    pub fn poll_pose(&self) -> Option<JointPose> {
        let mut poses = self.poses.lock();
        poses.swap_front().then(|| poses.front().clone())
    }

    /// 最近一次取到的位姿（不检查是否更新）
    pub fn latest_pose(&self) -> JointPose {
        let mut poses = self.poses.lock();
        poses.swap_front();
        poses.front().clone()
    }

    /// 每发布一个位姿递增一次
    pub fn pose_signal(&self) -> &UpdateSignal {
        &self.pose_signal
    }

    /// 停止位姿线程和 Commander
    pub fn halt(&self) {
        self.keepalive.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!("Pose thread panicked");
        }
        self.commander.halt();
    }
}

impl Drop for RobotDriverFacade {
    fn drop(&mut self) {
        self.halt();
    }
}

fn pose_loop(
    commander: Arc<Commander>,
    mut realtime: TripleReader<RealtimeState>,
    mut writer: TripleWriter<JointPose>,
    pose_signal: Arc<UpdateSignal>,
    poll_timeout: Duration,
    keepalive: Arc<AtomicBool>,
) {
    info!("Pose loop started");
    let signal = &commander.realtime().context().signal;
    let mut seen = signal.sequence();

    while keepalive.load(Ordering::Acquire) {
        let seq = signal.wait_timeout(seen, poll_timeout);
        if seq == seen {
            continue;
        }
        seen = seq;

        if realtime.swap_front() {
            writer.publish(compute_pose(realtime.front()));
            pose_signal.notify();
        }
        if commander.realtime().connection_state() == ConnectionState::Disconnected {
            debug!("Pose loop: realtime channel disconnected");
        }
    }
    info!("Pose loop exited");
}
