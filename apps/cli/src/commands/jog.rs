//! 点动命令
//!
//! 以固定周期刷新单关节速度命令；时间到后停止刷新，
//! 由实时通道的看门狗在若干帧后发出零速度。

use crate::connection::{ConnectionArgs, interrupt_flag};
use anyhow::{Result, bail};
use clap::Args;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use urlink_driver::{RealtimeChannel, query_version};
use urlink_protocol::{Capabilities, JOINT_COUNT};

/// 速度命令刷新周期
const REFRESH_PERIOD: Duration = Duration::from_millis(8);

#[derive(Args, Debug)]
pub struct JogCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 关节编号（0-5）
    #[arg(short, long)]
    pub joint: usize,

    /// 关节速度（rad/s）
    #[arg(short, long, allow_hyphen_values = true)]
    pub speed: f64,

    /// 点动时长（秒）
    #[arg(long, default_value_t = 1.0)]
    pub seconds: f64,
}

impl JogCommand {
    pub fn execute(&self) -> Result<()> {
        if self.joint >= JOINT_COUNT {
            bail!("joint must be 0..{}, got {}", JOINT_COUNT - 1, self.joint);
        }
        let interrupted = interrupt_flag()?;
        let config = self.connection.load()?;
        let version = query_version(&config.channel)?;
        let realtime = RealtimeChannel::connect(&config.channel, Capabilities::for_version(version))?;

        let mut qd = [0.0; JOINT_COUNT];
        qd[self.joint] = self.speed;
        let deadline = Instant::now() + Duration::from_secs_f64(self.seconds.max(0.0));
        info!("Jogging joint {} at {} rad/s", self.joint, self.speed);

        while Instant::now() < deadline && !interrupted.load(Ordering::Acquire) {
            realtime.set_speed_default(&qd)?;
            thread::sleep(REFRESH_PERIOD);
        }

        // 停止刷新，等待看门狗停车
        let trips = realtime.metrics().watchdog_trips;
        let settle = REFRESH_PERIOD * (config.channel.safety_count_max + 4);
        thread::sleep(settle);
        let metrics = realtime.metrics();
        println!(
            "jog finished: {} commands sent, watchdog stopped the arm: {}",
            metrics.commands_sent,
            metrics.watchdog_trips > trips
        );
        realtime.halt();
        Ok(())
    }
}
