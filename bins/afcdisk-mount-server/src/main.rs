use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use afcdisk_app::Application;
use afcdisk_config::{Config, ConfigError, ConfigManager};
use afcdisk_fuse::{FuseConfig, FuserDriver};
use afcdisk_logging::LogConfig;
use afcdisk_mount::{DeviceEvent, DeviceWatcher, MountManager};
use afcdisk_net::Server;
use afcdisk_stubs::{MountServiceHandler, RemoteFsStub};
use afcdisk_types::{make_error_msg, FsId, Result, StatusCode, VolumeName};
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// afcdisk mount server
#[derive(Parser, Debug)]
#[command(name = "afcdisk-mount-server", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mount-server.toml")]
    config: String,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

/// A device to mount at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceEntry {
    fs_id: FsId,
    volume: VolumeName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MountServerConfig {
    #[serde(default = "default_listen")]
    listen: SocketAddr,

    /// The device file server every mount proxies to.
    #[serde(default = "default_fs_server")]
    fs_server: SocketAddr,

    #[serde(default)]
    volicon: Option<PathBuf>,

    #[serde(default)]
    devices: Vec<DeviceEntry>,

    #[serde(default)]
    fuse: FuseConfig,

    #[serde(default)]
    log: LogConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9200))
}

fn default_fs_server() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9100))
}

impl Default for MountServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            fs_server: default_fs_server(),
            volicon: None,
            devices: Vec::new(),
            fuse: FuseConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config for MountServerConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some(dup) = self
            .devices
            .iter()
            .enumerate()
            .find(|(i, d)| self.devices[..*i].iter().any(|o| o.volume == d.volume))
        {
            return Err(ConfigError::invalid(
                "devices",
                format!("volume {} listed twice", dup.1.volume),
            ));
        }
        self.fuse.validate()?;
        self.log.validate()
    }
}

#[derive(Default)]
struct MountServer {
    server: Server,
    config: Option<MountServerConfig>,
    manager: Option<MountManager>,
    events: Option<mpsc::Sender<DeviceEvent>>,
    watcher: Option<JoinHandle<()>>,
}

#[async_trait]
impl Application for MountServer {
    type Config = MountServerConfig;

    fn name(&self) -> &str {
        "afcdisk-mount-server"
    }

    async fn init(&mut self, config: &MountServerConfig) -> Result<()> {
        tracing::info!(fs_server = %config.fs_server, "proxying to device file server");
        let service = Arc::new(RemoteFsStub::connect(config.fs_server));
        self.manager = Some(MountManager::new(
            service,
            Arc::new(FuserDriver),
            Handle::current(),
            config.fuse.clone(),
            config.volicon.clone(),
        ));
        self.config = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let (Some(manager), Some(config)) = (self.manager.clone(), self.config.as_ref()) else {
            return make_error_msg(StatusCode::INVALID_CONFIG, "mount server started before init");
        };
        self.server
            .register_service(Arc::new(MountServiceHandler::new(manager.clone())));
        self.server
            .start(config.listen)
            .await
            .map_err(|e| e.into_status())?;

        let (tx, watcher) = DeviceWatcher::channel(manager, 16);
        self.watcher = Some(tokio::spawn(watcher.run()));
        for device in &config.devices {
            let event = DeviceEvent::Connected {
                fs_id: device.fs_id.clone(),
                volume: device.volume.clone(),
            };
            if tx.send(event).await.is_err() {
                tracing::warn!("device watcher stopped early");
                break;
            }
        }
        self.events = Some(tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.server.stop();
        // Closing the channel ends the watcher once queued events are done.
        self.events = None;
        if let Some(watcher) = self.watcher.take() {
            if let Err(e) = watcher.await {
                tracing::warn!(error = %e, "device watcher task failed");
            }
        }
        if let Some(manager) = self.manager.clone() {
            if let Err(e) = tokio::task::spawn_blocking(move || manager.unmount_all()).await {
                tracing::warn!(error = %e, "unmount on shutdown failed");
            }
        }
        Ok(())
    }

    fn addresses(&self) -> Vec<SocketAddr> {
        self.server.local_addr().into_iter().collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", MountServerConfig::default().to_toml_string()?);
        return Ok(());
    }

    let manager = ConfigManager::<MountServerConfig>::load_or_default(&args.config)?;
    let config = (*manager.get()).clone();

    let _guard = afcdisk_logging::init_logging(&config.log)?;
    tracing::info!(
        config = %args.config,
        listen = %config.listen,
        mount_root = %config.fuse.mount_root.display(),
        "Starting afcdisk mount server"
    );

    afcdisk_app::run_application(MountServer::default(), config).await?;
    tracing::info!("mount server shut down");
    Ok(())
}
