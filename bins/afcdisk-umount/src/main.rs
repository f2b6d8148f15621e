use std::net::SocketAddr;

use afcdisk_logging::LogConfig;
use afcdisk_proto::mount::UnmountReq;
use afcdisk_stubs::{MountServiceStub, RemoteMountStub};
use afcdisk_types::{FsId, VolumeName};
use clap::Parser;

/// Ask a mount server to unmount a volume
#[derive(Parser, Debug)]
#[command(name = "afcdisk-umount", version, about)]
struct Args {
    /// Volume to unmount
    volume: String,

    /// Only unmount if the volume belongs to this filesystem
    #[arg(long, default_value = "")]
    fs_id: String,

    /// Mount server address
    #[arg(short, long, default_value = "127.0.0.1:9200")]
    server: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log = LogConfig {
        level: "warn".into(),
        ..Default::default()
    };
    let _guard = afcdisk_logging::init_logging(&log)?;

    let stub = RemoteMountStub::connect(args.server);
    let req = UnmountReq {
        fs_id: FsId::from(args.fs_id),
        volume: VolumeName::from(args.volume),
    };
    let volume = req.volume.clone();
    match stub.unmount(req).await {
        Ok(_) => {
            afcdisk_logging::info!(%volume, "unmounted");
            Ok(())
        }
        Err(status) => {
            eprintln!("afcdisk-umount: {}: {}", volume, status.describe());
            std::process::exit(1);
        }
    }
}
