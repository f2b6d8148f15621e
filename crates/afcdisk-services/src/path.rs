//! Device path handling shared by the backends.

use afcdisk_types::{make_error_msg, FsCode, Result, StatusCode};

/// Longest single path component accepted.
pub const NAME_MAX: usize = 255;

/// Normalize an absolute device path: collapse repeated separators, drop
/// `.` components and any trailing `/`. `..` is rejected rather than
/// resolved so a path can never leave the store.
pub fn normalize(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return make_error_msg(StatusCode::INVALID_ARG, format!("not absolute: {:?}", path));
    }
    let mut out = String::with_capacity(path.len());
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return make_error_msg(FsCode::NO_PERMISSION, format!("'..' in path {:?}", path))
            }
            name if name.len() > NAME_MAX => {
                return make_error_msg(FsCode::NAME_TOO_LONG, name.to_string());
            }
            name => {
                out.push('/');
                out.push_str(name);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Split a normalized path into parent and final component. The root has
/// no parent.
pub fn split(path: &str) -> Option<(&str, &str)> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// Whether `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("//DCIM/./100APPLE/").unwrap(), "/DCIM/100APPLE");
        assert_eq!(
            normalize("relative").unwrap_err().code(),
            StatusCode::INVALID_ARG
        );
        assert_eq!(normalize("/a/../b").unwrap_err().code(), FsCode::NO_PERMISSION);
        let long = format!("/{}", "x".repeat(NAME_MAX + 1));
        assert_eq!(normalize(&long).unwrap_err().code(), FsCode::NAME_TOO_LONG);
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/"), None);
        assert_eq!(split("/a"), Some(("/", "a")));
        assert_eq!(split("/a/b"), Some(("/a", "b")));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }
}
