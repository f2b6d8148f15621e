/// Numeric status code carried by [`Status`](crate::Status).
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const DATA_CORRUPTION: status_code_t = 2;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const INTERRUPTED: status_code_t = 27;
    pub const INVALID_FORMAT: status_code_t = 33;
    pub const IO_ERROR: status_code_t = 69;
    pub const CONFIG_PARSE_ERROR: status_code_t = 71;
    pub const OS_ERROR: status_code_t = 72;
    pub const UNKNOWN: status_code_t = 999;
}

/// Transport and framing codes (2xxx).
pub mod RPCCode {
    use super::status_code_t;

    pub const INVALID_MESSAGE_TYPE: status_code_t = 2000;
    pub const REQUEST_IS_EMPTY: status_code_t = 2001;
    pub const VERIFY_REQUEST_FAILED: status_code_t = 2002;
    pub const VERIFY_RESPONSE_FAILED: status_code_t = 2003;
    pub const TIMEOUT: status_code_t = 2005;
    pub const SEND_FAILED: status_code_t = 2007;
    pub const INVALID_SERVICE_ID: status_code_t = 2008;
    pub const INVALID_METHOD_ID: status_code_t = 2009;
    pub const SOCKET_ERROR: status_code_t = 2010;
    pub const SOCKET_CLOSED: status_code_t = 2013;
    pub const CONNECT_FAILED: status_code_t = 2014;
}

/// Device file service codes (3xxx).
pub mod FsCode {
    use super::status_code_t;

    pub const NOT_FOUND: status_code_t = 3000;
    pub const NOT_EMPTY: status_code_t = 3001;
    pub const NOT_DIRECTORY: status_code_t = 3003;
    pub const IS_DIRECTORY: status_code_t = 3006;
    pub const EXISTS: status_code_t = 3007;
    pub const NO_PERMISSION: status_code_t = 3008;
    pub const BAD_HANDLE: status_code_t = 3010;
    pub const NAME_TOO_LONG: status_code_t = 3017;
    pub const READ_TOO_LARGE: status_code_t = 3020;
    pub const MISSING_KEYS: status_code_t = 3021;
    pub const UNKNOWN_FILE_TYPE: status_code_t = 3022;
    pub const DEVICE_GONE: status_code_t = 3023;
    pub const NO_SPACE: status_code_t = 3024;
}

/// Mount orchestration codes (4xxx).
pub mod MountCode {
    use super::status_code_t;

    pub const ALREADY_MOUNTED: status_code_t = 4000;
    pub const NOT_MOUNTED: status_code_t = 4001;
    pub const MOUNT_FAILED: status_code_t = 4002;
    pub const SESSION_FAILED: status_code_t = 4003;
    pub const WORKER_SPAWN_FAILED: status_code_t = 4004;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCodeType {
    Invalid = -1,
    Common = 0,
    RPC = 2,
    Fs = 3,
    Mount = 4,
}

/// Determine the category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        2000..=2999 => StatusCodeType::RPC,
        3000..=3999 => StatusCodeType::Fs,
        4000..=4999 => StatusCodeType::Mount,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::DATA_CORRUPTION => "DataCorruption",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::INTERRUPTED => "Interrupted",
        StatusCode::INVALID_FORMAT => "InvalidFormat",
        StatusCode::IO_ERROR => "IOError",
        StatusCode::CONFIG_PARSE_ERROR => "ConfigParseError",
        StatusCode::OS_ERROR => "OSError",
        StatusCode::UNKNOWN => "Unknown",

        RPCCode::INVALID_MESSAGE_TYPE => "RPC::InvalidMessageType",
        RPCCode::REQUEST_IS_EMPTY => "RPC::RequestIsEmpty",
        RPCCode::VERIFY_REQUEST_FAILED => "RPC::VerifyRequestFailed",
        RPCCode::VERIFY_RESPONSE_FAILED => "RPC::VerifyResponseFailed",
        RPCCode::TIMEOUT => "RPC::Timeout",
        RPCCode::SEND_FAILED => "RPC::SendFailed",
        RPCCode::INVALID_SERVICE_ID => "RPC::InvalidServiceId",
        RPCCode::INVALID_METHOD_ID => "RPC::InvalidMethodId",
        RPCCode::SOCKET_ERROR => "RPC::SocketError",
        RPCCode::SOCKET_CLOSED => "RPC::SocketClosed",
        RPCCode::CONNECT_FAILED => "RPC::ConnectFailed",

        FsCode::NOT_FOUND => "Fs::NotFound",
        FsCode::NOT_EMPTY => "Fs::NotEmpty",
        FsCode::NOT_DIRECTORY => "Fs::NotDirectory",
        FsCode::IS_DIRECTORY => "Fs::IsDirectory",
        FsCode::EXISTS => "Fs::Exists",
        FsCode::NO_PERMISSION => "Fs::NoPermission",
        FsCode::BAD_HANDLE => "Fs::BadHandle",
        FsCode::NAME_TOO_LONG => "Fs::NameTooLong",
        FsCode::READ_TOO_LARGE => "Fs::ReadTooLarge",
        FsCode::MISSING_KEYS => "Fs::MissingKeys",
        FsCode::UNKNOWN_FILE_TYPE => "Fs::UnknownFileType",
        FsCode::DEVICE_GONE => "Fs::DeviceGone",
        FsCode::NO_SPACE => "Fs::NoSpace",

        MountCode::ALREADY_MOUNTED => "Mount::AlreadyMounted",
        MountCode::NOT_MOUNTED => "Mount::NotMounted",
        MountCode::MOUNT_FAILED => "Mount::MountFailed",
        MountCode::SESSION_FAILED => "Mount::SessionFailed",
        MountCode::WORKER_SPAWN_FAILED => "Mount::WorkerSpawnFailed",

        _ => "UnknownStatusCode",
    }
}

/// Map a status code onto the errno a filesystem caller should see.
pub fn to_errno(code: status_code_t) -> i32 {
    if type_of(code) == StatusCodeType::RPC {
        return libc::EIO;
    }

    match code {
        StatusCode::INVALID_ARG => libc::EINVAL,
        StatusCode::NOT_IMPLEMENTED => libc::ENOSYS,
        StatusCode::INTERRUPTED => libc::EINTR,

        FsCode::NOT_FOUND => libc::ENOENT,
        FsCode::NOT_EMPTY => libc::ENOTEMPTY,
        FsCode::NOT_DIRECTORY => libc::ENOTDIR,
        FsCode::IS_DIRECTORY => libc::EISDIR,
        FsCode::EXISTS => libc::EEXIST,
        FsCode::NO_PERMISSION => libc::EACCES,
        FsCode::BAD_HANDLE => libc::EBADF,
        FsCode::NAME_TOO_LONG => libc::ENAMETOOLONG,
        FsCode::READ_TOO_LARGE => libc::EINVAL,
        FsCode::DEVICE_GONE => libc::ENXIO,
        FsCode::NO_SPACE => libc::ENOSPC,

        MountCode::ALREADY_MOUNTED => libc::EBUSY,

        _ => libc::EIO,
    }
}
