//! Mount service messages.

use afcdisk_types::{FsId, VolumeName};
use serde::{Deserialize, Serialize};

pub const MOUNT_SERVICE_ID: u16 = 2;

#[allow(non_snake_case)]
pub mod MountMethod {
    pub const MOUNT: u16 = 1;
    pub const UNMOUNT: u16 = 2;
    pub const LIST_MOUNTS: u16 = 3;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MountReq {
    pub fs_id: FsId,
    pub volume: VolumeName,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MountRsp {
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnmountReq {
    pub fs_id: FsId,
    pub volume: VolumeName,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnmountRsp {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListMountsReq {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MountInfo {
    pub fs_id: FsId,
    pub volume: VolumeName,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListMountsRsp {
    pub mounts: Vec<MountInfo>,
}
