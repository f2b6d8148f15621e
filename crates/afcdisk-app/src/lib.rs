use std::future::Future;
use std::net::SocketAddr;

use async_trait::async_trait;
use afcdisk_types::Result;
use tokio::signal::unix::{signal, SignalKind};

/// What a running service instance looks like from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    pub pid: u32,
    pub addresses: Vec<SocketAddr>,
}

impl AppInfo {
    pub fn current(name: impl Into<String>, addresses: Vec<SocketAddr>) -> Self {
        Self {
            name: name.into(),
            pid: std::process::id(),
            addresses,
        }
    }
}

/// Lifecycle of a long-running afcdisk service.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    type Config: afcdisk_config::Config + Clone;

    fn name(&self) -> &str;
    async fn init(&mut self, config: &Self::Config) -> Result<()>;
    async fn start(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;

    /// Addresses the service listens on once started.
    fn addresses(&self) -> Vec<SocketAddr> {
        Vec::new()
    }
}

/// Wait for CTRL+C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received CTRL+C");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => { tracing::info!("Received CTRL+C"); }
        _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
    }
}

/// Run an application through its full lifecycle: init, start, wait for shutdown, stop.
pub async fn run_application<A: Application>(app: A, config: A::Config) -> Result<()> {
    run_application_until(app, config, wait_for_shutdown_signal()).await
}

/// [`run_application`] with a caller-chosen shutdown trigger.
pub async fn run_application_until<A, F>(mut app: A, config: A::Config, shutdown: F) -> Result<()>
where
    A: Application,
    F: Future<Output = ()>,
{
    app.init(&config).await?;
    app.start().await?;
    let info = AppInfo::current(app.name(), app.addresses());
    tracing::info!(?info, "{} started", info.name);
    shutdown.await;
    tracing::info!("{} stopping", info.name);
    app.stop().await?;
    Ok(())
}
