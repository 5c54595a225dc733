//! 连接参数（各子命令共用）

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use urlink_client::CommanderConfig;

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// 控制器地址（覆盖配置文件）
    #[arg(long)]
    pub host: Option<String>,

    /// TOML 配置文件
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// 合并配置文件和命令行参数（命令行优先）
    pub fn load(&self) -> Result<CommanderConfig> {
        let mut config = match &self.config {
            Some(path) => CommanderConfig::load_from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => CommanderConfig::default(),
        };
        if let Some(host) = &self.host {
            config.channel.host = host.clone();
        }
        Ok(config)
    }
}

/// 安装 Ctrl-C 处理，返回被置位的标志
pub fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Release))
        .context("failed to install Ctrl-C handler")?;
    Ok(flag)
}
