use afcdisk_types::FsId;
use serde::{Deserialize, Serialize};

/// Header carried by every device file service request.
///
/// `fs_id` names the filesystem the request targets so one service process
/// can back several mounts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestHeader {
    pub fs_id: FsId,
}

impl RequestHeader {
    pub fn new(fs_id: impl Into<FsId>) -> Self {
        Self {
            fs_id: fs_id.into(),
        }
    }
}

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: u32,
}

impl Timespec {
    pub fn to_system_time(self) -> std::time::SystemTime {
        let base = std::time::UNIX_EPOCH;
        if self.tv_sec >= 0 {
            base + std::time::Duration::new(self.tv_sec as u64, self.tv_nsec)
        } else {
            base - std::time::Duration::from_secs(self.tv_sec.unsigned_abs())
        }
    }
}

impl From<std::time::SystemTime> for Timespec {
    fn from(t: std::time::SystemTime) -> Self {
        match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => Self {
                tv_sec: d.as_secs() as i64,
                tv_nsec: d.subsec_nanos(),
            },
            Err(e) => Self {
                tv_sec: -(e.duration().as_secs() as i64),
                tv_nsec: 0,
            },
        }
    }
}
