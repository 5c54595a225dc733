//! 控制脚本与命令片段生成
//!
//! 生成的文本由控制器内的解释器执行，属于外部兼容边界：
//! 缩进（制表符）、数值精度、函数名都必须与控制器期望完全一致。
//! 因此这里只有结构化的拼装，数值格式全部显式写出。

use crate::constants::MULT_JOINTSTATE;
use crate::version::Capabilities;
use crate::JointVector;
use std::fmt::Write as _;

/// 停止当前运动的命令
pub const STOP_TRAJECTORY: &str = "stopj(10)\n";

/// 按缩进层级逐行拼装脚本
///
/// 每行以 `depth` 个制表符开头、`\n` 结尾。
/// `open` 之后的行缩进加一层，`close` 输出 `end` 并回退一层。
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    text: String,
    depth: usize,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前层级输出一行
    pub fn line(&mut self, content: impl AsRef<str>) -> &mut Self {
        for _ in 0..self.depth {
            self.text.push('\t');
        }
        self.text.push_str(content.as_ref());
        self.text.push('\n');
        self
    }

    /// 输出块头（`def`/`thread`/`while`/`if`）并进入下一层
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(header);
        self.depth += 1;
        self
    }

    /// 同层分支（`elif`/`else`）
    pub fn branch(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.open(header)
    }

    /// 结束当前块
    pub fn close(&mut self) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line("end")
    }

    pub fn build(self) -> String {
        self.text
    }
}

/// `servoj` 参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoParams {
    /// 单次 servoj 阻塞时间（秒）
    pub time: f64,
    /// 前瞻时间（秒，3.1 起生效）
    pub lookahead_time: f64,
    /// 比例增益（3.1 起生效）
    pub gain: f64,
}

impl Default for ServoParams {
    fn default() -> Self {
        Self {
            time: 0.016,
            lookahead_time: 0.03,
            gain: 300.0,
        }
    }
}

fn servoj_line(caps: &Capabilities, servo: &ServoParams) -> String {
    if caps.servoj_extended {
        format!(
            "servoj(q, t={:.4}, lookahead_time={:.4}, gain={:.0})",
            servo.time, servo.lookahead_time, servo.gain
        )
    } else {
        format!("servoj(q, t={:.4})", servo.time)
    }
}

/// 生成上传到控制器的驱动程序
///
/// 程序启动后连接回 `host:port`，循环读取 7 个整数
/// （6 个定点关节角 + keepalive），交给伺服线程执行，
/// 直到 keepalive 为 0。
///
/// # 参数
/// - `caps`: 握手确定的版本能力，决定 `servoj` 的参数形式
/// - `host`: 控制器可达的本机地址
/// - `port`: 本机反向设定点端口
pub fn driver_program(caps: &Capabilities, host: &str, port: u16, servo: &ServoParams) -> String {
    let mut s = ScriptBuilder::new();
    s.open("def driverProg():");
    s.line(format!("MULT_jointstate = {MULT_JOINTSTATE}"))
        .line("SERVO_IDLE = 0")
        .line("SERVO_RUNNING = 1")
        .line("cmd_servo_state = SERVO_IDLE")
        .line("cmd_servo_q = get_actual_joint_positions()");

    s.open("def set_servo_setpoint(q):")
        .line("enter_critical")
        .line("cmd_servo_state = SERVO_RUNNING")
        .line("cmd_servo_q = q")
        .line("exit_critical")
        .close();

    s.open("thread servoThread():")
        .line("state = SERVO_IDLE")
        .open("while True:")
        .line("enter_critical")
        .line("q = cmd_servo_q")
        .line("do_brake = False")
        .open("if (state == SERVO_RUNNING) and (cmd_servo_state == SERVO_IDLE):")
        .line("do_brake = True")
        .close()
        .line("state = cmd_servo_state")
        .line("cmd_servo_state = SERVO_IDLE")
        .line("exit_critical")
        .open("if do_brake:")
        .line("stopj(1.0)")
        .line("sync()")
        .branch("elif state == SERVO_RUNNING:")
        .line(servoj_line(caps, servo))
        .branch("else:")
        .line("sync()")
        .close()
        .close()
        .close();

    let joints = (1..=6)
        .map(|i| format!("params_mult[{i}] / MULT_jointstate"))
        .collect::<Vec<_>>()
        .join(", ");

    s.line(format!("socket_open(\"{host}\", {port})"))
        .line("thread_servo = run servoThread()")
        .line("keepalive = 1")
        .open("while keepalive > 0:")
        .line("params_mult = socket_read_binary_integer(6+1)")
        .open("if params_mult[0] > 0:")
        .line(format!("q = [{joints}]"))
        .line("keepalive = params_mult[7]")
        .line("set_servo_setpoint(q)")
        .close()
        .close()
        .line("sleep(.1)")
        .line("socket_close()")
        .line("kill thread_servo")
        .close();
    s.build()
}

/// 关节速度命令
///
/// 3.1 之前需要显式的 0.02 秒时间参数。
pub fn speedj(caps: &Capabilities, qd: &JointVector, acceleration: f64) -> String {
    let mut out = String::from("speedj([");
    for (i, v) in qd.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{v:.5}");
    }
    if caps.speedj_needs_time {
        let _ = writeln!(out, "], {acceleration:.6}, 0.02)");
    } else {
        let _ = writeln!(out, "], {acceleration:.6})");
    }
    out
}

/// 把单条调用包装为 secondary program（不打断主程序执行）
pub fn secondary_program(call: &str) -> String {
    let mut s = ScriptBuilder::new();
    s.open("sec setOut():").line(call).close();
    s.build()
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// 数字输出
///
/// 2.0 起按引脚号分组：0–7 standard、8–15 configurable、16 起 tool。
pub fn digital_out(caps: &Capabilities, pin: u32, value: bool) -> String {
    let v = py_bool(value);
    let call = if !caps.grouped_io {
        format!("set_digital_out({pin}, {v})")
    } else if pin > 15 {
        format!("set_tool_digital_out({}, {v})", pin - 16)
    } else if pin > 7 {
        format!("set_configurable_digital_out({}, {v})", pin - 8)
    } else {
        format!("set_standard_digital_out({pin}, {v})")
    };
    secondary_program(&call)
}

pub fn analog_out(caps: &Capabilities, pin: u32, value: f64) -> String {
    let call = if caps.grouped_io {
        format!("set_standard_analog_out({pin}, {value:.4})")
    } else {
        format!("set_analog_out({pin}, {value:.4})")
    };
    secondary_program(&call)
}

pub fn tool_voltage(volts: u32) -> String {
    secondary_program(&format!("set_tool_voltage({volts})"))
}

pub fn flag(index: u32, value: bool) -> String {
    secondary_program(&format!("set_flag({index}, {})", py_bool(value)))
}

pub fn payload(kg: f64) -> String {
    secondary_program(&format!("set_payload({kg:.3})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolVersion;

    fn caps(major: u8, minor: u8) -> Capabilities {
        Capabilities::for_version(ProtocolVersion::new(major, minor))
    }

    const PROGRAM_V31: &str = "def driverProg():
\tMULT_jointstate = 1000000
\tSERVO_IDLE = 0
\tSERVO_RUNNING = 1
\tcmd_servo_state = SERVO_IDLE
\tcmd_servo_q = get_actual_joint_positions()
\tdef set_servo_setpoint(q):
\t\tenter_critical
\t\tcmd_servo_state = SERVO_RUNNING
\t\tcmd_servo_q = q
\t\texit_critical
\tend
\tthread servoThread():
\t\tstate = SERVO_IDLE
\t\twhile True:
\t\t\tenter_critical
\t\t\tq = cmd_servo_q
\t\t\tdo_brake = False
\t\t\tif (state == SERVO_RUNNING) and (cmd_servo_state == SERVO_IDLE):
\t\t\t\tdo_brake = True
\t\t\tend
\t\t\tstate = cmd_servo_state
\t\t\tcmd_servo_state = SERVO_IDLE
\t\t\texit_critical
\t\t\tif do_brake:
\t\t\t\tstopj(1.0)
\t\t\t\tsync()
\t\t\telif state == SERVO_RUNNING:
\t\t\t\tservoj(q, t=0.0160, lookahead_time=0.0300, gain=300)
\t\t\telse:
\t\t\t\tsync()
\t\t\tend
\t\tend
\tend
\tsocket_open(\"192.168.1.10\", 50001)
\tthread_servo = run servoThread()
\tkeepalive = 1
\twhile keepalive > 0:
\t\tparams_mult = socket_read_binary_integer(6+1)
\t\tif params_mult[0] > 0:
\t\t\tq = [params_mult[1] / MULT_jointstate, params_mult[2] / MULT_jointstate, params_mult[3] / MULT_jointstate, params_mult[4] / MULT_jointstate, params_mult[5] / MULT_jointstate, params_mult[6] / MULT_jointstate]
\t\t\tkeepalive = params_mult[7]
\t\t\tset_servo_setpoint(q)
\t\tend
\tend
\tsleep(.1)
\tsocket_close()
\tkill thread_servo
end
";

    #[test]
    fn test_driver_program_golden_v31() {
        let text = driver_program(&caps(3, 1), "192.168.1.10", 50001, &ServoParams::default());
        assert_eq!(text, PROGRAM_V31);
    }

    #[test]
    fn test_driver_program_v30_plain_servoj() {
        let text = driver_program(&caps(3, 0), "10.0.0.2", 50002, &ServoParams::default());
        assert!(text.contains("\t\t\t\tservoj(q, t=0.0160)\n"));
        assert!(!text.contains("lookahead_time"));
        assert!(text.contains("socket_open(\"10.0.0.2\", 50002)"));
    }

    #[test]
    fn test_speedj_time_argument_by_version() {
        let qd = [0.1, 0.0, 0.0, 0.0, 0.0, -0.25];
        assert_eq!(
            speedj(&caps(3, 0), &qd, 100.0),
            "speedj([0.10000, 0.00000, 0.00000, 0.00000, 0.00000, -0.25000], 100.000000, 0.02)\n"
        );
        assert_eq!(
            speedj(&caps(3, 2), &qd, 100.0),
            "speedj([0.10000, 0.00000, 0.00000, 0.00000, 0.00000, -0.25000], 100.000000)\n"
        );
    }

    #[test]
    fn test_digital_out_grouping() {
        let c = caps(3, 1);
        assert_eq!(
            digital_out(&c, 3, true),
            "sec setOut():\n\tset_standard_digital_out(3, True)\nend\n"
        );
        assert_eq!(
            digital_out(&c, 9, false),
            "sec setOut():\n\tset_configurable_digital_out(1, False)\nend\n"
        );
        assert_eq!(
            digital_out(&c, 17, true),
            "sec setOut():\n\tset_tool_digital_out(1, True)\nend\n"
        );
        assert_eq!(
            digital_out(&caps(1, 8), 9, true),
            "sec setOut():\n\tset_digital_out(9, True)\nend\n"
        );
    }

    #[test]
    fn test_misc_outputs() {
        assert_eq!(
            analog_out(&caps(3, 0), 1, 0.5),
            "sec setOut():\n\tset_standard_analog_out(1, 0.5000)\nend\n"
        );
        assert_eq!(
            analog_out(&caps(1, 8), 0, 0.25),
            "sec setOut():\n\tset_analog_out(0, 0.2500)\nend\n"
        );
        assert_eq!(tool_voltage(24), "sec setOut():\n\tset_tool_voltage(24)\nend\n");
        assert_eq!(flag(2, true), "sec setOut():\n\tset_flag(2, True)\nend\n");
        assert_eq!(payload(0.4), "sec setOut():\n\tset_payload(0.400)\nend\n");
    }
}
