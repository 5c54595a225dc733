//! 驱动层模块
//!
//! 本模块维护与控制器之间的两个接收通道，包括：
//! - 版本握手（探测端口读取一次版本消息后关闭）
//! - 配置通道接收线程（机器人模式、主控板状态，RwLock 保护）
//! - 实时通道接收线程（~125Hz 定长帧，内嵌安全看门狗）
//! - 跨线程状态发布（ArcSwap 最新值 + 三缓冲 + 更新信号）
//!
//! # 使用场景
//!
//! 需要直接读取遥测或发送速度命令时使用本模块。
//! 需要脚本上传、轨迹执行时使用 `urlink-client` 提供的更高级接口。

mod config;
mod config_channel;
mod connection;
mod error;
pub mod metrics;
mod realtime_channel;
pub mod signal;
pub mod state;
pub mod triple_buffer;
pub mod watchdog;

pub use config::ChannelConfig;
pub use config_channel::{ConfigChannel, query_version};
pub use connection::{AtomicConnectionState, ConnectionState};
pub use error::DriverError;
pub use metrics::{ChannelMetrics, MetricsSnapshot};
pub use realtime_channel::RealtimeChannel;
pub use signal::UpdateSignal;
pub use state::{ConfigContext, ConfigSnapshot, MasterboardSnapshot, RealtimeContext, RobotModeSnapshot};
pub use triple_buffer::{TripleReader, TripleWriter, triple_buffer};
pub use watchdog::SafetyWatchdog;
