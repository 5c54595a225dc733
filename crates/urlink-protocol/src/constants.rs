//! 协议常量定义

/// 版本探测端口（握手后立即关闭）
pub const PORT_PRIMARY: u16 = 30001;

/// 稳态配置通道端口（secondary interface）
pub const PORT_SECONDARY: u16 = 30002;

/// 实时遥测通道端口
pub const PORT_REALTIME: u16 = 30003;

/// 默认反向设定点端口（本地监听，写入生成的脚本）
pub const DEFAULT_REVERSE_PORT: u16 = 50001;

/// 反向帧关节角定点缩放系数（1e6）
pub const MULT_JOINTSTATE: i32 = 1_000_000;

/// 支持的最低主版本号（低于此版本在握手时即拒绝）
pub const MIN_SUPPORTED_MAJOR: u8 = 2;

/// 关节数量
pub const JOINT_COUNT: usize = 6;

/// 版本探测时单次读取上限
pub const HANDSHAKE_READ_LEN: usize = 512;

/// 配置通道单条消息长度上限（超出视为帧头损坏）
pub const MAX_SECONDARY_MESSAGE_LEN: usize = 64 * 1024;
