//! 版本握手命令

use crate::connection::ConnectionArgs;
use anyhow::Result;
use clap::Args;
use urlink_driver::query_version;
use urlink_protocol::Capabilities;

#[derive(Args, Debug)]
pub struct VersionCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl VersionCommand {
    pub fn execute(&self) -> Result<()> {
        let config = self.connection.load()?;
        let version = query_version(&config.channel)?;
        let caps = Capabilities::for_version(version);

        println!("firmware: {} (semver {})", version, version.to_semver());
        match caps.realtime {
            Some(layout) => println!("realtime frame: {} bytes", layout.frame_len),
            None => println!("realtime frame: unsupported"),
        }
        Ok(())
    }
}
