//! Inode number to path mapping for the kernel driver.
//!
//! The service is addressed by path while the kernel speaks inode numbers.
//! Numbers are handed out on first sight of a path and stay stable until
//! the path is removed; renames carry the numbers of the whole subtree.

use std::collections::HashMap;

use crate::types::ROOT_INO;

#[derive(Debug)]
pub struct InodeTable {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next_ino: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.by_ino.insert(ROOT_INO, "/".to_string());
        table.by_path.insert("/".to_string(), ROOT_INO);
        table
    }

    pub fn path(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_ino.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ino.is_empty()
    }

    /// Absolute path of `name` inside the directory `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let dir = self.path(parent)?;
        Some(join(dir, name))
    }

    pub fn get_or_insert(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Forget `path` and everything below it.
    pub fn remove(&mut self, path: &str) {
        let doomed: Vec<String> = self
            .by_path
            .keys()
            .filter(|p| is_within(p, path))
            .cloned()
            .collect();
        for p in doomed {
            if p == "/" {
                continue;
            }
            if let Some(ino) = self.by_path.remove(&p) {
                self.by_ino.remove(&ino);
            }
        }
    }

    /// Move `from` and its subtree to `to`, replacing whatever was there.
    pub fn rename(&mut self, from: &str, to: &str) {
        self.remove(to);
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(p, _)| is_within(p, from))
            .map(|(p, &ino)| (p.clone(), ino))
            .collect();
        for (old, ino) in moved {
            let new = format!("{}{}", to, &old[from.len()..]);
            self.by_path.remove(&old);
            self.by_path.insert(new.clone(), ino);
            self.by_ino.insert(ino, new);
        }
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn is_within(path: &str, ancestor: &str) -> bool {
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
    fn test_root() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INO), Some("/"));
        assert_eq!(table.child_path(ROOT_INO, "DCIM").as_deref(), Some("/DCIM"));
        assert_eq!(table.child_path(42, "x"), None);
    }

    #[test]
    fn test_stable_numbers() {
        let mut table = InodeTable::new();
        let a = table.get_or_insert("/a");
        let b = table.get_or_insert("/a/b");
        assert_ne!(a, b);
        assert_eq!(table.get_or_insert("/a"), a);
        assert_eq!(table.child_path(a, "b").as_deref(), Some("/a/b"));
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut table = InodeTable::new();
        let a = table.get_or_insert("/a");
        let ab = table.get_or_insert("/a/b");
        let other = table.get_or_insert("/ab");
        table.rename("/a", "/z");
        assert_eq!(table.path(a), Some("/z"));
        assert_eq!(table.path(ab), Some("/z/b"));
        assert_eq!(table.path(other), Some("/ab"));
        assert_eq!(table.get_or_insert("/z/b"), ab);
    }

    #[test]
    fn test_remove() {
        let mut table = InodeTable::new();
        let a = table.get_or_insert("/a");
        let ab = table.get_or_insert("/a/b");
        table.remove("/a");
        assert_eq!(table.path(a), None);
        assert_eq!(table.path(ab), None);
        assert_eq!(table.len(), 1);
        assert_ne!(table.get_or_insert("/a"), a);
    }
}
