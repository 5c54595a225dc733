//! 客户端接口模块
//!
//! 本模块在两个遥测通道之上提供：
//! - 驱动程序上传与反向设定点通道（[`Commander`]）
//! - 分段三次 Hermite 轨迹插值与执行
//! - IO、负载、servoj 参数等命令
//! - 面向可视化层的位姿发布（[`RobotDriverFacade`]）
//!
//! # 使用场景
//!
//! 这是大多数应用应该使用的模块。
//! 只需要遥测或速度命令时，可以直接使用 `urlink-driver`。

pub mod commander;
pub mod config;
mod error;
pub mod facade;
pub mod trajectory;

pub use commander::{Commander, TrajectoryOutcome};
pub use config::CommanderConfig;
pub use error::ClientError;
pub use facade::{JointPose, RobotDriverFacade, compute_pose};
pub use trajectory::{SegmentCursor, Trajectory, Waypoint};
