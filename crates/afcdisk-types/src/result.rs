use crate::status::Status;
use crate::status_code::status_code_t;

/// Result type used by services and stubs, with `Status` as the error.
pub type Result<T> = std::result::Result<T, Status>;

/// Unit payload for operations whose response carries no data.
pub type Void = ();

pub fn make_error<T>(code: status_code_t) -> Result<T> {
    Err(Status::new(code))
}

pub fn make_error_msg<T>(code: status_code_t, msg: impl Into<String>) -> Result<T> {
    Err(Status::with_message(code, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::FsCode;

    #[test]
    fn test_make_error() {
        let r: Result<u64> = make_error(FsCode::BAD_HANDLE);
        assert_eq!(r.unwrap_err().code(), FsCode::BAD_HANDLE);
    }

    #[test]
    fn test_make_error_msg() {
        let r: Result<Void> = make_error_msg(FsCode::READ_TOO_LARGE, "Read request too large");
        let err = r.unwrap_err();
        assert_eq!(err.code(), FsCode::READ_TOO_LARGE);
        assert_eq!(err.message(), Some("Read request too large"));
    }
}
