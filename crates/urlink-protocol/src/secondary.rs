//! 配置通道（30001/30002）消息解析
//!
//! 顶层消息：`i32 length`（含 5 字节头）+ `u8 type` + payload。
//! RobotState 内部再嵌套 TLV 数据包：`i32 length`（含 5 字节包头）+ `u8 type` + body。
//! 只解码 RobotModeData 和 MasterboardData，其余数据包按长度跳过。
//!
//! 解码与打包（`pack_to`）成对提供，后者供模拟控制器和诊断工具使用。

use crate::constants::MAX_SECONDARY_MESSAGE_LEN;
use crate::ids::{MessageType, PackageType, RobotMessageType};
use crate::reader::FrameReader;
use crate::version::{ProtocolVersion, SecondaryLayout};
use crate::ProtocolError;
use bytes::{BufMut, BytesMut};

/// 消息头 / 数据包头长度（i32 length + u8 type）
pub const HEADER_LEN: usize = 5;

/// 顶层消息头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 整条消息长度（含头部）
    pub length: usize,
    pub kind: u8,
}

/// 读取消息头
///
/// # 错误
/// - `ProtocolError::Truncated`: 不足 5 字节
/// - `ProtocolError::InvalidLength`: 声明长度小于头部或超过上限（帧头损坏）
pub fn decode_frame_header(buf: &[u8]) -> Result<FrameHeader, ProtocolError> {
    let mut r = FrameReader::new(buf);
    let length = r.i32()?;
    let kind = r.u8()?;
    if length < HEADER_LEN as i32 || length as usize > MAX_SECONDARY_MESSAGE_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: HEADER_LEN,
            actual: length.max(0) as usize,
        });
    }
    Ok(FrameHeader {
        length: length as usize,
        kind,
    })
}

/// 机器人模式数据包
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotModeData {
    pub timestamp: u64,
    pub is_robot_connected: bool,
    pub is_real_robot_enabled: bool,
    pub is_power_on_robot: bool,
    pub is_emergency_stopped: bool,
    pub is_protective_stopped: bool,
    pub is_program_running: bool,
    pub is_program_paused: bool,
    pub robot_mode: u8,
    /// 2.0 起
    pub control_mode: u8,
    /// 2.0 之前为 speed fraction
    pub target_speed_fraction: f64,
    /// 2.0 起
    pub speed_scaling: f64,
}

impl RobotModeData {
    pub fn decode(body: &[u8], layout: &SecondaryLayout) -> Result<Self, ProtocolError> {
        let mut r = FrameReader::new(body);
        let mut d = Self {
            timestamp: r.u64()?,
            is_robot_connected: r.bool()?,
            is_real_robot_enabled: r.bool()?,
            is_power_on_robot: r.bool()?,
            is_emergency_stopped: r.bool()?,
            is_protective_stopped: r.bool()?,
            is_program_running: r.bool()?,
            is_program_paused: r.bool()?,
            robot_mode: r.u8()?,
            ..Default::default()
        };
        if layout.control_mode_block {
            d.control_mode = r.u8()?;
            d.target_speed_fraction = r.f64()?;
            d.speed_scaling = r.f64()?;
        } else {
            d.target_speed_fraction = r.f64()?;
        }
        Ok(d)
    }

    pub fn pack_to(&self, buf: &mut BytesMut, layout: &SecondaryLayout) {
        buf.put_u64(self.timestamp);
        for flag in [
            self.is_robot_connected,
            self.is_real_robot_enabled,
            self.is_power_on_robot,
            self.is_emergency_stopped,
            self.is_protective_stopped,
            self.is_program_running,
            self.is_program_paused,
        ] {
            buf.put_u8(flag as u8);
        }
        buf.put_u8(self.robot_mode);
        if layout.control_mode_block {
            buf.put_u8(self.control_mode);
            buf.put_f64(self.target_speed_fraction);
            buf.put_f64(self.speed_scaling);
        } else {
            buf.put_f64(self.target_speed_fraction);
        }
    }
}

/// Euromap67 接口数据（仅在已安装时出现）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Euromap67 {
    pub input_bits: u32,
    pub output_bits: u32,
    pub voltage: f32,
    pub current: f32,
}

/// 主控板数据包
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MasterboardData {
    /// 3.0 之前线上为 16 位
    pub digital_input_bits: u32,
    pub digital_output_bits: u32,
    pub analog_input_range: [i8; 2],
    pub analog_input: [f64; 2],
    pub analog_output_domain: [i8; 2],
    pub analog_output: [f64; 2],
    pub masterboard_temperature: f32,
    pub robot_voltage_48v: f32,
    pub robot_current: f32,
    pub master_io_current: f32,
    /// 3.0 之前为 master safety state
    pub safety_mode: u8,
    /// 3.0 之前为 master on/off state
    pub in_reduced_mode: u8,
    pub euromap67: Option<Euromap67>,
}

impl MasterboardData {
    pub fn decode(body: &[u8], layout: &SecondaryLayout) -> Result<Self, ProtocolError> {
        let mut r = FrameReader::new(body);
        let mut d = Self::default();
        if layout.wide_masterboard {
            d.digital_input_bits = r.i32()? as u32;
            d.digital_output_bits = r.i32()? as u32;
        } else {
            d.digital_input_bits = r.i16()? as u16 as u32;
            d.digital_output_bits = r.i16()? as u16 as u32;
        }
        d.analog_input_range = [r.i8()?, r.i8()?];
        d.analog_input = r.f64_array()?;
        d.analog_output_domain = [r.i8()?, r.i8()?];
        d.analog_output = r.f64_array()?;
        d.masterboard_temperature = r.f32()?;
        d.robot_voltage_48v = r.f32()?;
        d.robot_current = r.f32()?;
        d.master_io_current = r.f32()?;
        d.safety_mode = r.u8()?;
        d.in_reduced_mode = r.u8()?;

        if r.i8()? != 0 {
            let input_bits = r.u32()?;
            let output_bits = r.u32()?;
            let (voltage, current) = if layout.wide_masterboard {
                (r.f32()?, r.f32()?)
            } else {
                (r.i16()? as f32, r.i16()? as f32)
            };
            d.euromap67 = Some(Euromap67 {
                input_bits,
                output_bits,
                voltage,
                current,
            });
        }
        Ok(d)
    }

    pub fn pack_to(&self, buf: &mut BytesMut, layout: &SecondaryLayout) {
        if layout.wide_masterboard {
            buf.put_i32(self.digital_input_bits as i32);
            buf.put_i32(self.digital_output_bits as i32);
        } else {
            buf.put_i16(self.digital_input_bits as u16 as i16);
            buf.put_i16(self.digital_output_bits as u16 as i16);
        }
        buf.put_i8(self.analog_input_range[0]);
        buf.put_i8(self.analog_input_range[1]);
        buf.put_f64(self.analog_input[0]);
        buf.put_f64(self.analog_input[1]);
        buf.put_i8(self.analog_output_domain[0]);
        buf.put_i8(self.analog_output_domain[1]);
        buf.put_f64(self.analog_output[0]);
        buf.put_f64(self.analog_output[1]);
        buf.put_f32(self.masterboard_temperature);
        buf.put_f32(self.robot_voltage_48v);
        buf.put_f32(self.robot_current);
        buf.put_f32(self.master_io_current);
        buf.put_u8(self.safety_mode);
        buf.put_u8(self.in_reduced_mode);
        match &self.euromap67 {
            Some(e) => {
                buf.put_i8(1);
                buf.put_u32(e.input_bits);
                buf.put_u32(e.output_bits);
                if layout.wide_masterboard {
                    buf.put_f32(e.voltage);
                    buf.put_f32(e.current);
                } else {
                    buf.put_i16(e.voltage as i16);
                    buf.put_i16(e.current as i16);
                }
            },
            None => buf.put_i8(0),
        }
    }
}

/// 版本消息（RobotMessage / Version）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub timestamp: u64,
    pub source: i8,
    pub project_name: String,
    pub version: ProtocolVersion,
    pub build_date: String,
}

impl VersionMessage {
    /// 打包为完整的顶层消息（含头部）
    pub fn pack_to(&self, buf: &mut BytesMut) {
        let name = self.project_name.as_bytes();
        let length = HEADER_LEN + 8 + 1 + 1 + 1 + name.len() + 1 + 1 + 4 + self.build_date.len();
        buf.put_i32(length as i32);
        buf.put_u8(MessageType::RobotMessage.into());
        buf.put_u64(self.timestamp);
        buf.put_i8(self.source);
        buf.put_u8(RobotMessageType::Version.into());
        buf.put_i8(name.len() as i8);
        buf.put_slice(name);
        buf.put_u8(self.version.major);
        buf.put_u8(self.version.minor);
        buf.put_i32(self.version.revision);
        buf.put_slice(self.build_date.as_bytes());
    }
}

/// RobotState 中本端关心的数据包
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotStatePackages {
    pub robot_mode: Option<RobotModeData>,
    pub masterboard: Option<MasterboardData>,
}

impl RobotStatePackages {
    /// 打包为完整的 RobotState 消息（含头部）
    pub fn pack_to(&self, buf: &mut BytesMut, layout: &SecondaryLayout) {
        let mut body = BytesMut::new();
        if let Some(mode) = &self.robot_mode {
            let mut pkg = BytesMut::new();
            mode.pack_to(&mut pkg, layout);
            put_package(&mut body, PackageType::RobotModeData, &pkg);
        }
        if let Some(board) = &self.masterboard {
            let mut pkg = BytesMut::new();
            board.pack_to(&mut pkg, layout);
            put_package(&mut body, PackageType::MasterboardData, &pkg);
        }
        buf.put_i32((HEADER_LEN + body.len()) as i32);
        buf.put_u8(MessageType::RobotState.into());
        buf.put_slice(&body);
    }
}

/// 写入一个 TLV 数据包（包头 + body）
pub fn put_package(buf: &mut BytesMut, kind: PackageType, body: &[u8]) {
    buf.put_i32((HEADER_LEN + body.len()) as i32);
    buf.put_u8(kind.into());
    buf.put_slice(body);
}

/// 单条配置通道消息的解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum SecondaryMessage {
    RobotState(RobotStatePackages),
    Version(VersionMessage),
    /// 其他 RobotMessage 子类型（文本、异常等），只保留子类型编号
    RobotMessage { subtype: u8 },
    ProgramState,
    Unknown { kind: u8 },
}

fn decode_robot_state(body: &[u8], layout: &SecondaryLayout) -> Result<RobotStatePackages, ProtocolError> {
    let mut packages = RobotStatePackages::default();
    let mut offset = 0;
    while offset < body.len() {
        let mut r = FrameReader::new(&body[offset..]);
        let len = r.i32()?;
        let kind = r.u8()?;
        if len < HEADER_LEN as i32 || offset + len as usize > body.len() {
            return Err(ProtocolError::InvalidLength {
                expected: body.len() - offset,
                actual: len.max(0) as usize,
            });
        }
        let len = len as usize;
        let pkg = &body[offset + HEADER_LEN..offset + len];
        match PackageType::try_from(kind) {
            Ok(PackageType::RobotModeData) => {
                packages.robot_mode = Some(RobotModeData::decode(pkg, layout)?);
            },
            Ok(PackageType::MasterboardData) => {
                packages.masterboard = Some(MasterboardData::decode(pkg, layout)?);
            },
            _ => {},
        }
        offset += len;
    }
    Ok(packages)
}

fn decode_robot_message(body: &[u8]) -> Result<SecondaryMessage, ProtocolError> {
    let mut r = FrameReader::new(body);
    let timestamp = r.u64()?;
    let source = r.i8()?;
    let subtype = r.u8()?;
    if subtype != u8::from(RobotMessageType::Version) {
        return Ok(SecondaryMessage::RobotMessage { subtype });
    }
    let name_len = r.i8()?;
    if name_len < 0 {
        return Err(ProtocolError::InvalidValue {
            field: "project_name_size",
            value: name_len as i64,
        });
    }
    let project_name = r.string(name_len as usize)?;
    let major = r.u8()?;
    let minor = r.u8()?;
    let revision = r.i32()?;
    let build_date = r.string(r.remaining())?;
    Ok(SecondaryMessage::Version(VersionMessage {
        timestamp,
        source,
        project_name,
        version: ProtocolVersion::with_revision(major, minor, revision),
        build_date,
    }))
}

/// 解码一条完整消息（含头部）
///
/// 版本消息的格式与版本无关，握手前可用任意布局解码。
pub fn decode_message(msg: &[u8], layout: &SecondaryLayout) -> Result<SecondaryMessage, ProtocolError> {
    let header = decode_frame_header(msg)?;
    if msg.len() != header.length {
        return Err(ProtocolError::InvalidLength {
            expected: header.length,
            actual: msg.len(),
        });
    }
    let body = &msg[HEADER_LEN..];
    match MessageType::try_from(header.kind) {
        Ok(MessageType::RobotState) => decode_robot_state(body, layout).map(SecondaryMessage::RobotState),
        Ok(MessageType::RobotMessage) => decode_robot_message(body),
        Ok(MessageType::ProgramState) => Ok(SecondaryMessage::ProgramState),
        Err(_) => Ok(SecondaryMessage::Unknown { kind: header.kind }),
    }
}

/// 缓冲区级拆包结果
#[derive(Debug, Default)]
pub struct Unpacked {
    pub messages: Vec<SecondaryMessage>,
    /// 已完整处理的字节数；之后的尾部为不完整消息，应保留到下次读取
    pub consumed: usize,
    /// 头部完整但内容格式错误而丢弃的消息数
    pub malformed: usize,
    /// `consumed` 处的帧头损坏，之后的字节无法重新同步
    pub corrupt: Option<ProtocolError>,
}

/// 从缓冲区中依次拆出完整消息
///
/// 缓冲区末尾不完整的消息不算作已消费，由调用方保留。
/// 遇到损坏的帧头时停止拆包，已拆出的消息照常返回，
/// 错误记录在 `corrupt` 中，`consumed` 指向损坏的位置。
pub fn unpack(buf: &[u8], layout: &SecondaryLayout) -> Unpacked {
    let mut out = Unpacked::default();
    while buf.len() - out.consumed >= HEADER_LEN {
        let rest = &buf[out.consumed..];
        let header = match decode_frame_header(rest) {
            Ok(header) => header,
            Err(e) => {
                out.corrupt = Some(e);
                break;
            },
        };
        if rest.len() < header.length {
            break;
        }
        match decode_message(&rest[..header.length], layout) {
            Ok(msg) => out.messages.push(msg),
            Err(_) => out.malformed += 1,
        }
        out.consumed += header.length;
    }
    out
}

/// 在探测读取到的字节中查找版本消息
///
/// 遇到不完整或损坏的消息即停止扫描。
pub fn find_version_message(buf: &[u8]) -> Option<VersionMessage> {
    let mut offset = 0;
    while let Ok(header) = decode_frame_header(&buf[offset..]) {
        let end = offset + header.length;
        if end > buf.len() {
            return None;
        }
        if header.kind == u8::from(MessageType::RobotMessage)
            && let Ok(SecondaryMessage::Version(v)) = decode_robot_message(&buf[offset + HEADER_LEN..end])
        {
            return Some(v);
        }
        offset = end;
    }
    None
}
