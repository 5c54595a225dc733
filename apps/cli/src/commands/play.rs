//! 轨迹执行命令

use crate::connection::ConnectionArgs;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use urlink_client::{Commander, Trajectory, TrajectoryOutcome};

#[derive(Args, Debug)]
pub struct PlayCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 路点文件（TOML，`[[waypoint]]` 数组）
    #[arg(short, long)]
    pub file: PathBuf,

    /// 只打印插值结果，不连接控制器
    #[arg(long)]
    pub dry_run: bool,
}

impl PlayCommand {
    pub fn execute(&self) -> Result<()> {
        let trajectory = Trajectory::load_from_file(&self.file)
            .with_context(|| format!("failed to load trajectory {}", self.file.display()))?;

        if self.dry_run {
            for (t, q) in trajectory.samples(0.1) {
                println!("{t:.2}: {q:.4?}");
            }
            return Ok(());
        }

        let config = self.connection.load()?;
        let commander = Arc::new(Commander::connect(&config)?);
        {
            let commander = commander.clone();
            ctrlc::set_handler(move || {
                if let Err(e) = commander.stop_trajectory() {
                    warn!("stop request failed: {}", e);
                }
            })
            .context("failed to install Ctrl-C handler")?;
        }

        info!(
            "Playing {} ({} waypoints, {:.2}s)",
            self.file.display(),
            trajectory.waypoints().len(),
            trajectory.duration()
        );
        let outcome = commander.execute(&trajectory)?;
        match outcome {
            TrajectoryOutcome::Completed => println!("trajectory completed"),
            TrajectoryOutcome::Preempted => println!("trajectory interrupted"),
        }
        commander.halt();
        Ok(())
    }
}
