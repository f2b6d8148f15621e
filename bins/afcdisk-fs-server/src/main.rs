use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use afcdisk_app::Application;
use afcdisk_config::{Config, ConfigError, ConfigManager};
use afcdisk_logging::LogConfig;
use afcdisk_net::Server;
use afcdisk_services::{LoopbackFs, MemoryFs};
use afcdisk_stubs::{DeviceFileService, FsServiceHandler};
use afcdisk_types::{make_error_msg, Result, StatusCode};
use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// afcdisk device file server
#[derive(Parser, Debug)]
#[command(name = "afcdisk-fs-server", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fs-server.toml")]
    config: String,

    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Directory to serve, overriding the configuration
    #[arg(short, long, conflicts_with = "memory")]
    root: Option<PathBuf>,

    /// Serve an empty in-memory filesystem
    #[arg(long)]
    memory: bool,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FsServerConfig {
    #[serde(default = "default_listen")]
    listen: SocketAddr,

    /// Directory served to clients. An in-memory filesystem when unset.
    #[serde(default)]
    root: Option<PathBuf>,

    #[serde(default)]
    log: LogConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9100))
}

impl Default for FsServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root: None,
            log: LogConfig::default(),
        }
    }
}

impl Config for FsServerConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if let Some(root) = &self.root {
            if !root.is_absolute() {
                return Err(ConfigError::invalid("root", "must be an absolute path"));
            }
        }
        self.log.validate()
    }
}

#[derive(Default)]
struct FsServer {
    server: Server,
    listen: Option<SocketAddr>,
    service: Option<Arc<dyn DeviceFileService>>,
}

#[async_trait]
impl Application for FsServer {
    type Config = FsServerConfig;

    fn name(&self) -> &str {
        "afcdisk-fs-server"
    }

    async fn init(&mut self, config: &FsServerConfig) -> Result<()> {
        let service: Arc<dyn DeviceFileService> = match &config.root {
            Some(root) => {
                tracing::info!(root = %root.display(), "serving directory");
                Arc::new(LoopbackFs::new(root.clone())?)
            }
            None => {
                tracing::info!("serving in-memory filesystem");
                Arc::new(MemoryFs::new())
            }
        };
        self.service = Some(service);
        self.listen = Some(config.listen);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let (Some(service), Some(listen)) = (self.service.clone(), self.listen) else {
            return make_error_msg(StatusCode::INVALID_CONFIG, "fs server started before init");
        };
        self.server
            .register_service(Arc::new(FsServiceHandler::new(service)));
        let addr = self
            .server
            .start(listen)
            .await
            .map_err(|e| e.into_status())?;
        self.listen = Some(addr);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.server.stop();
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
        print!("{}", FsServerConfig::default().to_toml_string()?);
        return Ok(());
    }

    let manager = ConfigManager::<FsServerConfig>::load_or_default(&args.config)?;
    let mut config = (*manager.get()).clone();
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.memory {
        config.root = None;
    } else if let Some(root) = args.root {
        config.root = Some(std::fs::canonicalize(&root)?);
    }
    config.validate()?;

    let _guard = afcdisk_logging::init_logging(&config.log)?;
    tracing::info!(config = %args.config, listen = %config.listen, "Starting afcdisk fs server");

    afcdisk_app::run_application(FsServer::default(), config).await?;
    tracing::info!("fs server shut down");
    Ok(())
}
