//! The OS mount registration of one volume.

use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use afcdisk_types::{FsId, VolumeName};

use crate::config::FuseConfig;
use crate::driver::{MountArg, MountChannel, MountDriver};
use crate::error::MountError;

/// Owns `<mount_root>/<volume>` and the driver registration on it.
///
/// Dropping a `MountPoint` unregisters the mount (exactly once) and then
/// removes the directory.
pub struct MountPoint {
    volume: VolumeName,
    path: PathBuf,
    args: Vec<MountArg>,
    channel: Option<Box<dyn MountChannel>>,
}

impl MountPoint {
    /// Prepare a fresh mount directory and register the mount on it.
    pub fn create(
        driver: &dyn MountDriver,
        config: &FuseConfig,
        volume: &VolumeName,
        volicon: Option<&Path>,
        fs_id: &FsId,
    ) -> Result<Self, MountError> {
        let path = config.mount_root.join(volume.as_str());
        let args = mount_args(config, volume, volicon, fs_id);

        // Leftovers of a previous run that did not clean up.
        if let Err(e) = std::fs::remove_dir(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "stale mount directory not removed");
            }
        }
        if let Err(e) = make_mount_dir(&path) {
            tracing::error!(path = %path.display(), error = %e, "failed to create mount directory");
            return Err(MountError::MountPoint { path, source: e });
        }

        // From here on, dropping `mount_point` removes the directory.
        let mut mount_point = Self {
            volume: volume.clone(),
            path,
            args,
            channel: None,
        };
        match driver.mount(&mount_point.path, &mount_point.args) {
            Ok(channel) => {
                tracing::info!(
                    volume = %mount_point.volume,
                    path = %mount_point.path.display(),
                    "mounted"
                );
                mount_point.channel = Some(channel);
                Ok(mount_point)
            }
            Err(e) => {
                tracing::error!(
                    volume = %mount_point.volume,
                    path = %mount_point.path.display(),
                    error = %e,
                    "mount failed"
                );
                Err(MountError::MountPoint {
                    path: mount_point.path.clone(),
                    source: e,
                })
            }
        }
    }

    pub fn volume(&self) -> &VolumeName {
        &self.volume
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[MountArg] {
        &self.args
    }

    /// The registration, present from a successful `create` until drop.
    pub fn channel_mut(&mut self) -> Option<&mut (dyn MountChannel + 'static)> {
        self.channel.as_deref_mut()
    }
}

impl Drop for MountPoint {
    fn drop(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.unregister();
        }
        if let Err(e) = std::fs::remove_dir(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "mount directory not removed");
        }
    }
}

fn make_mount_dir(path: &Path) -> io::Result<()> {
    match DirBuilder::new().mode(0o755).create(path) {
        Ok(()) => Ok(()),
        // Something we could not remove, e.g. a directory still mounted.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// The argument list in its fixed order.
pub fn mount_args(
    config: &FuseConfig,
    volume: &VolumeName,
    volicon: Option<&Path>,
    fs_id: &FsId,
) -> Vec<MountArg> {
    let mut args = Vec::new();
    if config.debug_enabled() {
        args.push(MountArg::Debug);
    }
    if config.defer_permissions {
        args.push(MountArg::DeferPermissions);
    }
    args.push(MountArg::VolName(volume.to_string()));
    if let Some(icon) = volicon {
        args.push(MountArg::VolIcon(icon.to_path_buf()));
    }
    args.push(MountArg::FsName(format!("afcdisk:{}", fs_id)));
    if config.allow_other {
        args.push(MountArg::AllowOther);
    }
    if config.auto_unmount {
        args.push(MountArg::AutoUnmount);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;

    fn config(root: &Path) -> FuseConfig {
        FuseConfig {
            mount_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_mount_args_order() {
        let cfg = FuseConfig {
            debug: true,
            ..Default::default()
        };
        let args = mount_args(
            &cfg,
            &VolumeName::from("Test"),
            Some(Path::new("/tmp/icon.icns")),
            &FsId::from("dev-1"),
        );
        let rendered: Vec<String> = args.iter().map(MountArg::as_option_string).collect();
        assert_eq!(
            rendered,
            vec![
                "debug",
                "defer_permissions",
                "volname=Test",
                "volicon=/tmp/icon.icns",
                "fsname=afcdisk:dev-1",
            ]
        );
    }

    #[test]
    fn test_create_and_drop() {
        let root = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        let volume = VolumeName::from("Test");
        let expected = root.path().join("Test");

        let mount_point =
            MountPoint::create(&driver, &config(root.path()), &volume, None, &FsId::from("dev-1"))
                .unwrap();
        assert_eq!(mount_point.path(), expected);
        assert!(expected.is_dir());
        assert!(driver.is_mounted(&expected));
        assert!(mount_point
            .args()
            .contains(&MountArg::VolName("Test".into())));

        drop(mount_point);
        assert!(!driver.is_mounted(&expected));
        assert!(!expected.exists());
    }

    #[test]
    fn test_stale_directory_replaced() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("Test");
        std::fs::create_dir(&stale).unwrap();

        let driver = MemoryDriver::new();
        let mount_point = MountPoint::create(
            &driver,
            &config(root.path()),
            &VolumeName::from("Test"),
            None,
            &FsId::from("dev-1"),
        )
        .unwrap();
        assert!(driver.is_mounted(&stale));
        drop(mount_point);
        assert!(!stale.exists());
    }

    #[test]
    fn test_mount_failure_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        driver.fail_next_mount();

        let err = MountPoint::create(
            &driver,
            &config(root.path()),
            &VolumeName::from("Test"),
            None,
            &FsId::from("dev-1"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MountError::MountPoint { .. }));
        assert!(driver.mounted_paths().is_empty());
        assert!(!root.path().join("Test").exists());
    }

    #[test]
    fn test_missing_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::new();
        let err = MountPoint::create(
            &driver,
            &config(&root.path().join("absent")),
            &VolumeName::from("Test"),
            None,
            &FsId::from("dev-1"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MountError::MountPoint { .. }));
    }
}
