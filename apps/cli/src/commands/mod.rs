//! 命令定义和实现

pub mod jog;
pub mod monitor;
pub mod play;
pub mod version;

pub use jog::JogCommand;
pub use monitor::MonitorCommand;
pub use play::PlayCommand;
pub use version::VersionCommand;
