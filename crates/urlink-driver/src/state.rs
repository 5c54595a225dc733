//! 通道共享状态
//!
//! - 配置通道：低频、多字段一起更新，使用 RwLock 保证一致性
//! - 实时通道：高频，最新帧通过 ArcSwap 无锁读取；
//!   逐帧不丢的消费通过三缓冲（见 [`crate::triple_buffer`]）

use crate::connection::AtomicConnectionState;
use crate::metrics::ChannelMetrics;
use crate::signal::UpdateSignal;
use crate::watchdog::SafetyWatchdog;
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::Arc;
use urlink_protocol::{MasterboardData, RealtimeState, RobotModeData, SecondaryLayout};

pub type RobotModeSnapshot = RobotModeData;
pub type MasterboardSnapshot = MasterboardData;

/// 配置通道状态快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    pub robot_mode: RobotModeSnapshot,
    pub masterboard: MasterboardSnapshot,
    /// 当前版本下"运行中"对应的 robot mode 编号
    pub running_mode: u8,
    /// 自上次 [`ConfigContext::take_new_data`] 以来是否有更新
    pub new_data: bool,
}

impl ConfigSnapshot {
    /// 机器人处于运行模式
    pub fn is_ready(&self) -> bool {
        self.robot_mode.robot_mode == self.running_mode
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.robot_mode.is_emergency_stopped
    }

    pub fn is_protective_stopped(&self) -> bool {
        self.robot_mode.is_protective_stopped
    }

    /// 连接断开时清除连接/使能/上电标志
    pub fn set_disconnected(&mut self) {
        self.robot_mode.is_robot_connected = false;
        self.robot_mode.is_real_robot_enabled = false;
        self.robot_mode.is_power_on_robot = false;
    }
}

/// 配置通道共享上下文
#[derive(Debug)]
pub struct ConfigContext {
    pub snapshot: RwLock<ConfigSnapshot>,
    pub signal: UpdateSignal,
    pub connection: AtomicConnectionState,
    pub metrics: ChannelMetrics,
}

impl ConfigContext {
    pub fn new(layout: &SecondaryLayout) -> Self {
        Self {
            snapshot: RwLock::new(ConfigSnapshot {
                running_mode: layout.running_mode,
                ..Default::default()
            }),
            signal: UpdateSignal::new(),
            connection: AtomicConnectionState::default(),
            metrics: ChannelMetrics::new(),
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.snapshot.read().clone()
    }

    /// 读取快照并清除 `new_data`
    pub fn take_new_data(&self) -> Option<ConfigSnapshot> {
        let mut guard = self.snapshot.write();
        if !guard.new_data {
            return None;
        }
        guard.new_data = false;
        Some(guard.clone())
    }
}

/// 实时通道共享上下文
#[derive(Debug)]
pub struct RealtimeContext {
    /// 最新解码帧（无锁读取）
    pub latest: ArcSwap<RealtimeState>,
    pub signal: UpdateSignal,
    pub connection: AtomicConnectionState,
    pub metrics: ChannelMetrics,
    pub watchdog: SafetyWatchdog,
}

impl RealtimeContext {
    pub fn new(safety_count_max: u32) -> Self {
        Self {
            latest: ArcSwap::from_pointee(RealtimeState::default()),
            signal: UpdateSignal::new(),
            connection: AtomicConnectionState::default(),
            metrics: ChannelMetrics::new(),
            watchdog: SafetyWatchdog::new(safety_count_max),
        }
    }

    pub fn latest(&self) -> Arc<RealtimeState> {
        self.latest.load_full()
    }
}
