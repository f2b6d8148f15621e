use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use afcdisk_config::{Config, ConfigError, ConfigManager};
use afcdisk_fuse::{FuseConfig, FuserDriver, MountContext, ProxyFilesystem};
use afcdisk_logging::LogConfig;
use afcdisk_services::MemoryFs;
use afcdisk_stubs::{DeviceFileService, RemoteFsStub};
use afcdisk_types::{FsId, VolumeName};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

/// Mount one afcdisk volume and serve it until it is unmounted
#[derive(Parser, Debug)]
#[command(name = "afcdisk-mount", version, about)]
struct Args {
    /// Volume name, mounted at <mount_root>/<volume>
    volume: String,

    /// Icon shown for the volume (macOS)
    #[arg(long)]
    volicon: Option<PathBuf>,

    /// Device file server to proxy to, overriding the configuration
    #[arg(long, conflicts_with = "memory")]
    fs_server: Option<SocketAddr>,

    /// Serve an empty in-memory filesystem instead of a remote one
    #[arg(long)]
    memory: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "mount.toml")]
    config: String,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MountConfig {
    /// Identifier stamped on every request.
    #[serde(default = "default_fs_id")]
    fs_id: FsId,

    #[serde(default = "default_fs_server")]
    fs_server: SocketAddr,

    #[serde(default)]
    fuse: FuseConfig,

    #[serde(default)]
    log: LogConfig,
}

fn default_fs_id() -> FsId {
    FsId::from("afcdisk")
}

fn default_fs_server() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9100))
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_id: default_fs_id(),
            fs_server: default_fs_server(),
            fuse: FuseConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config for MountConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.fuse.validate()?;
        self.log.validate()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", MountConfig::default().to_toml_string()?);
        return Ok(());
    }

    let manager = ConfigManager::<MountConfig>::load_or_default(&args.config)?;
    let mut config = (*manager.get()).clone();
    if let Some(addr) = args.fs_server {
        config.fs_server = addr;
    }

    let _guard = afcdisk_logging::init_logging(&config.log)?;

    let service: Arc<dyn DeviceFileService> = if args.memory {
        tracing::info!("proxying to an in-memory filesystem");
        Arc::new(MemoryFs::new())
    } else {
        tracing::info!(fs_server = %config.fs_server, "proxying to device file server");
        Arc::new(RemoteFsStub::connect(config.fs_server))
    };
    let context = Arc::new(MountContext::new(
        service,
        config.fs_id.clone(),
        Handle::current(),
        config.fuse.clone(),
    ));
    let proxy = Arc::new(ProxyFilesystem::new(
        context,
        Arc::new(FuserDriver),
        VolumeName::from(args.volume),
        args.volicon,
    ));

    let mounting = proxy.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || mounting.mount()).await? {
        tracing::error!(volume = %proxy.volume(), error = %e, "mount failed");
        return Err(e.into());
    }

    let waiting = proxy.clone();
    let mut wait = tokio::task::spawn_blocking(move || waiting.wait_for_unmount());
    tokio::select! {
        joined = &mut wait => joined?,
        _ = afcdisk_app::wait_for_shutdown_signal() => {
            proxy.unmount();
            wait.await?;
        }
    }
    tracing::info!(volume = %proxy.volume(), "volume unmounted, exiting");
    Ok(())
}
