//! # urlink CLI
//!
//! 机械臂控制器链路的命令行工具。
//!
//! ```bash
//! # 只做版本握手
//! urlink-cli version --host 192.168.1.10
//!
//! # 打印关节角和工具位姿，Ctrl-C 退出
//! urlink-cli monitor --host 192.168.1.10 --rate 5
//!
//! # 执行路点文件，Ctrl-C 打断
//! urlink-cli play --host 192.168.1.10 --file traj.toml
//!
//! # 单关节点动，停止刷新后由看门狗停车
//! urlink-cli jog --host 192.168.1.10 --joint 0 --speed 0.1 --seconds 1
//! ```
//!
//! 日志级别由 `RUST_LOG` 控制。

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod connection;

use commands::{JogCommand, MonitorCommand, PlayCommand, VersionCommand};

const DEFAULT_LOG_FILTER: &str = "urlink_cli=info,urlink_driver=info,urlink_client=info";

/// urlink CLI - 机械臂链路命令行工具
#[derive(Parser, Debug)]
#[command(name = "urlink-cli")]
#[command(about = "Command-line interface for the arm controller link", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 读取控制器固件版本
    Version {
        #[command(flatten)]
        args: VersionCommand,
    },

    /// 监控关节角和工具位姿
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 执行路点文件
    Play {
        #[command(flatten)]
        args: PlayCommand,
    },

    /// 单关节速度点动
    Jog {
        #[command(flatten)]
        args: JogCommand,
    },
}

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version { args } => args.execute(),
        Commands::Monitor { args } => args.execute(),
        Commands::Play { args } => args.execute(),
        Commands::Jog { args } => args.execute(),
    }
}
