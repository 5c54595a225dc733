//! 协议版本与按版本选择的字段布局
//!
//! 版本在握手时确定一次，之后所有帧布局都由 [`Capabilities::for_version`]
//! 选出的布局表决定，解析函数内部不再散落版本分支。

use crate::constants::MIN_SUPPORTED_MAJOR;
use crate::ProtocolError;
use std::fmt;

/// 控制器协议版本（major.minor + 构建修订号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub revision: i32,
}

impl ProtocolVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self {
            major,
            minor,
            revision: 0,
        }
    }

    pub const fn with_revision(major: u8, minor: u8, revision: i32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// 是否不低于 `major.minor`（忽略修订号）
    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// 转为 semver 版本（修订号作为 patch，负数按 0 处理）
    pub fn to_semver(&self) -> semver::Version {
        semver::Version::new(
            self.major as u64,
            self.minor as u64,
            self.revision.max(0) as u64,
        )
    }

    /// 兼容性检查：主版本低于 [`MIN_SUPPORTED_MAJOR`] 即为致命错误
    pub fn ensure_supported(&self) -> Result<(), ProtocolError> {
        if self.major < MIN_SUPPORTED_MAJOR {
            return Err(ProtocolError::UnsupportedVersion {
                major: self.major,
                minor: self.minor,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// 实时帧布局代际
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeGeneration {
    /// 1.x：18 个保留字段 + TCP force / tool vector / TCP speed
    Legacy,
    /// 3.x：i_control + 实际/目标 tool vector 与 TCP speed
    Modern,
}

/// 实时帧布局（每个支持的版本区间一条）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeLayout {
    /// 帧总长度（含 4 字节长度前缀）
    pub frame_len: usize,
    pub generation: RealtimeGeneration,
    /// 1.x 保留区前 3 个字段携带工具加速度计（1.7 起）
    pub legacy_accelerometer: bool,
    /// robot mode（1.7 起），其前的测试值自 1.6 起始终存在
    pub robot_mode: bool,
    /// 关节模式（1.8 起）
    pub joint_modes: bool,
    /// 安全模式、加速度计、速度缩放、母线电压电流（3.0 起）
    pub safety_block: bool,
    /// 数字输出与程序状态（3.2 起）
    pub io_tail: bool,
}

/// 支持的实时帧布局表：`[from, to)` 版本区间 → 布局
const REALTIME_LAYOUTS: [((u8, u8), (u8, u8), RealtimeLayout); 5] = [
    (
        (1, 6),
        (1, 7),
        RealtimeLayout {
            frame_len: 756,
            generation: RealtimeGeneration::Legacy,
            legacy_accelerometer: false,
            robot_mode: false,
            joint_modes: false,
            safety_block: false,
            io_tail: false,
        },
    ),
    (
        (1, 7),
        (1, 8),
        RealtimeLayout {
            frame_len: 764,
            generation: RealtimeGeneration::Legacy,
            legacy_accelerometer: true,
            robot_mode: true,
            joint_modes: false,
            safety_block: false,
            io_tail: false,
        },
    ),
    (
        (1, 8),
        (1, 9),
        RealtimeLayout {
            frame_len: 812,
            generation: RealtimeGeneration::Legacy,
            legacy_accelerometer: true,
            robot_mode: true,
            joint_modes: true,
            safety_block: false,
            io_tail: false,
        },
    ),
    (
        (3, 0),
        (3, 2),
        RealtimeLayout {
            frame_len: 1044,
            generation: RealtimeGeneration::Modern,
            legacy_accelerometer: false,
            robot_mode: true,
            joint_modes: true,
            safety_block: true,
            io_tail: false,
        },
    ),
    (
        (3, 2),
        (3, 3),
        RealtimeLayout {
            frame_len: 1060,
            generation: RealtimeGeneration::Modern,
            legacy_accelerometer: false,
            robot_mode: true,
            joint_modes: true,
            safety_block: true,
            io_tail: true,
        },
    ),
];

impl RealtimeLayout {
    /// 查找版本对应的实时帧布局，不在支持区间内返回 `None`
    pub fn for_version(version: ProtocolVersion) -> Option<Self> {
        let key = (version.major, version.minor);
        REALTIME_LAYOUTS
            .iter()
            .find(|(from, to, _)| key >= *from && key < *to)
            .map(|(_, _, layout)| *layout)
    }
}

/// 配置通道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondaryLayout {
    /// RobotModeData 携带 control mode / target speed fraction / speed scaling（2.0 起）
    pub control_mode_block: bool,
    /// Masterboard 数字 IO 为 32 位，Euromap67 电压电流为 f32（3.0 起）
    pub wide_masterboard: bool,
    /// "运行中" 对应的 robot mode 编号
    pub running_mode: u8,
}

impl SecondaryLayout {
    pub fn for_version(version: ProtocolVersion) -> Self {
        let modern = version.at_least(2, 0);
        Self {
            control_mode_block: modern,
            wide_masterboard: version.at_least(3, 0),
            running_mode: if modern {
                crate::ids::RobotMode::Running.into()
            } else {
                crate::ids::LegacyRobotMode::Running.into()
            },
        }
    }
}

/// 握手后一次性确定的版本能力表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub version: ProtocolVersion,
    /// 实时帧布局；不支持的版本为 `None`（所有实时帧都会被拒绝）
    pub realtime: Option<RealtimeLayout>,
    pub secondary: SecondaryLayout,
    /// `speedj` 需要显式时间参数（3.1 之前）
    pub speedj_needs_time: bool,
    /// `servoj` 支持 lookahead_time / gain（3.1 起）
    pub servoj_extended: bool,
    /// IO 命令使用 standard/configurable/tool 分组命名（2.0 起）
    pub grouped_io: bool,
}

impl Capabilities {
    pub fn for_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            realtime: RealtimeLayout::for_version(version),
            secondary: SecondaryLayout::for_version(version),
            speedj_needs_time: !version.at_least(3, 1),
            servoj_extended: version.at_least(3, 1),
            grouped_io: version.at_least(2, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(ProtocolVersion::new(3, 1) > ProtocolVersion::new(3, 0));
        assert!(ProtocolVersion::new(3, 0) > ProtocolVersion::new(1, 8));
        assert!(ProtocolVersion::new(3, 2).at_least(3, 1));
        assert!(!ProtocolVersion::new(3, 0).at_least(3, 1));
    }

    #[test]
    fn test_minimum_major_is_fatal() {
        assert!(ProtocolVersion::new(1, 8).ensure_supported().is_err());
        assert!(ProtocolVersion::new(3, 0).ensure_supported().is_ok());
    }

    #[test]
    fn test_realtime_layout_table() {
        let lens: Vec<_> = [(1, 6), (1, 7), (1, 8), (3, 0), (3, 1), (3, 2)]
            .iter()
            .map(|&(ma, mi)| {
                RealtimeLayout::for_version(ProtocolVersion::new(ma, mi))
                    .map(|l| l.frame_len)
                    .unwrap()
            })
            .collect();
        assert_eq!(lens, vec![756, 764, 812, 1044, 1044, 1060]);

        assert!(RealtimeLayout::for_version(ProtocolVersion::new(1, 5)).is_none());
        assert!(RealtimeLayout::for_version(ProtocolVersion::new(3, 3)).is_none());
    }

    #[test]
    fn test_capabilities_gates() {
        let v30 = Capabilities::for_version(ProtocolVersion::new(3, 0));
        assert!(v30.speedj_needs_time);
        assert!(!v30.servoj_extended);
        assert!(v30.secondary.wide_masterboard);
        assert_eq!(v30.secondary.running_mode, 7);

        let v31 = Capabilities::for_version(ProtocolVersion::new(3, 1));
        assert!(!v31.speedj_needs_time);
        assert!(v31.servoj_extended);

        let v18 = Capabilities::for_version(ProtocolVersion::new(1, 8));
        assert!(!v18.grouped_io);
        assert_eq!(v18.secondary.running_mode, 0);
    }

    #[test]
    fn test_display_and_semver() {
        let v = ProtocolVersion::with_revision(3, 1, 18024);
        assert_eq!(v.to_string(), "3.1.18024");
        assert_eq!(v.to_semver(), semver::Version::new(3, 1, 18024));
    }
}
