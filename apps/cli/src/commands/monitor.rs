//! 监控命令

use crate::connection::{ConnectionArgs, interrupt_flag};
use anyhow::{Result, bail};
use clap::Args;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use urlink_client::{JointPose, RobotDriverFacade};

#[derive(Args, Debug)]
pub struct MonitorCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 打印频率（Hz）
    #[arg(short, long, default_value_t = 10.0)]
    pub rate: f64,
}

impl MonitorCommand {
    pub fn execute(&self) -> Result<()> {
        if !(self.rate > 0.0 && self.rate <= 125.0) {
            bail!("rate must be in (0, 125] Hz, got {}", self.rate);
        }
        let interrupted = interrupt_flag()?;
        let config = self.connection.load()?;
        let facade = RobotDriverFacade::connect(&config)?;
        let period = Duration::from_secs_f64(1.0 / self.rate);

        while !interrupted.load(Ordering::Acquire) {
            if let Some(pose) = facade.poll_pose() {
                println!("{}", format_pose(&pose));
            }
            let snapshot = facade.commander().config_channel().snapshot();
            if snapshot.is_emergency_stopped() || snapshot.is_protective_stopped() {
                println!("robot stopped (emergency: {})", snapshot.is_emergency_stopped());
            }
            if !facade.commander().realtime().connection_state().is_streaming() {
                bail!("realtime channel disconnected");
            }
            thread::sleep(period);
        }

        facade.halt();
        Ok(())
    }
}

fn format_pose(pose: &JointPose) -> String {
    let joints = pose
        .angles
        .iter()
        .map(|a| format!("{a:+.4}"))
        .collect::<Vec<_>>()
        .join(" ");
    let [x, y, z] = pose.tool_position;
    let [rx, ry, rz] = pose.tool_rotation;
    format!(
        "t={:.3} q=[{joints}] tool=({x:.4}, {y:.4}, {z:.4}) rot=({rx:.4}, {ry:.4}, {rz:.4})",
        pose.time
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pose() {
        let pose = JointPose {
            time: 1.5,
            angles: [0.0, 1.0, -1.0, 0.0, 0.0, 0.5],
            tool_position: [0.1, 0.2, 0.3],
            ..Default::default()
        };
        let line = format_pose(&pose);
        assert!(line.starts_with("t=1.500 q=[+0.0000 +1.0000 -1.0000"));
        assert!(line.contains("tool=(0.1000, 0.2000, 0.3000)"));
    }
}
