//! 配置通道消息类型与数据包类型
//!
//! 顶层消息格式：`int32 length`（含头部 5 字节）+ `uint8 type` + payload。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 顶层消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// 机器人状态（内嵌 TLV 数据包）
    RobotState = 16,
    /// 机器人消息（文本、版本等）
    RobotMessage = 20,
    /// 程序状态消息（忽略）
    ProgramState = 25,
}

/// RobotState 内嵌数据包类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PackageType {
    RobotModeData = 0,
    JointData = 1,
    ToolData = 2,
    MasterboardData = 3,
    CartesianInfo = 4,
    KinematicsInfo = 5,
    ConfigurationData = 6,
    ForceModeData = 7,
    AdditionalInfo = 8,
    CalibrationData = 9,
}

/// RobotMessage 子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RobotMessageType {
    Text = 0,
    ProgramLabel = 1,
    VariableUpdate = 2,
    Version = 3,
    SafetyMode = 5,
    ErrorCode = 6,
    Key = 7,
    RequestValue = 9,
    RuntimeException = 10,
}

/// 机器人模式（2.0 及以上固件）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RobotMode {
    Disconnected = 0,
    ConfirmSafety = 1,
    Booting = 2,
    PowerOff = 3,
    PowerOn = 4,
    Idle = 5,
    Backdrive = 6,
    Running = 7,
    UpdatingFirmware = 8,
}

/// 机器人模式（1.x 固件，编号与 2.0 起不同）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LegacyRobotMode {
    Running = 0,
    Freedrive = 1,
    Ready = 2,
    Initializing = 3,
    SecurityStopped = 4,
    EmergencyStopped = 5,
    FatalError = 6,
    NoPower = 7,
    NotConnected = 8,
    Shutdown = 9,
    SafeguardStop = 10,
}

/// 控制模式（2.0 起）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ControlMode {
    Position = 0,
    Teach = 1,
    Force = 2,
    Torque = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_from_u8() {
        assert_eq!(MessageType::try_from(16).unwrap(), MessageType::RobotState);
        assert_eq!(MessageType::try_from(20).unwrap(), MessageType::RobotMessage);
        assert!(MessageType::try_from(99).is_err());
    }

    #[test]
    fn test_running_mode_numbering_differs() {
        assert_eq!(u8::from(RobotMode::Running), 7);
        assert_eq!(u8::from(LegacyRobotMode::Running), 0);
    }
}
