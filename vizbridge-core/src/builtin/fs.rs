//! In-memory module filesystem with host directory mounts
//!
//! Everything outside a mount lives in memory and disappears with the module.
//! Paths at or below a mount point are forwarded to the bound host directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::engine::module::ModuleFs;
use crate::error::ModuleError;

struct FsState {
    dirs: BTreeSet<String>,
    files: HashMap<String, Vec<u8>>,
    mounts: BTreeMap<String, PathBuf>,
    cwd: String,
}

/// Sandboxed filesystem of the built-in module.
pub struct VirtualFs {
    state: Mutex<FsState>,
}

enum Location {
    Memory(String),
    Host(PathBuf),
}

impl VirtualFs {
    /// A filesystem containing `/`, `/tmp` and `/dev`, with `/` as cwd.
    pub fn new() -> Self {
        let dirs = ["/", "/tmp", "/dev"].into_iter().map(String::from).collect();
        Self {
            state: Mutex::new(FsState {
                dirs,
                files: HashMap::new(),
                mounts: BTreeMap::new(),
                cwd: "/".to_string(),
            }),
        }
    }

    /// Number of active host mounts.
    pub fn mount_count(&self) -> usize {
        self.lock().mounts.len()
    }

    fn lock(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FsState {
    /// Absolute, `.`/`..`-free form of `path`.
    fn normalize(&self, path: &str) -> String {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.cwd, path)
        };
        let mut parts: Vec<&str> = Vec::new();
        for component in joined.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                c => parts.push(c),
            }
        }
        format!("/{}", parts.join("/"))
    }

    /// Longest mount covering `path`.
    fn host_path(&self, path: &str) -> Option<PathBuf> {
        self.mounts
            .iter()
            .filter(|(point, _)| {
                path == point.as_str()
                    || path
                        .strip_prefix(point.as_str())
                        .map_or(false, |rest| rest.starts_with('/'))
            })
            .max_by_key(|(point, _)| point.len())
            .map(|(point, host)| {
                let rest = path[point.len()..].trim_start_matches('/');
                if rest.is_empty() {
                    host.clone()
                } else {
                    host.join(rest)
                }
            })
    }

    fn locate(&self, path: &str) -> Location {
        let path = self.normalize(path);
        match self.host_path(&path) {
            Some(host) => Location::Host(host),
            None => Location::Memory(path),
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        match self.locate(path) {
            Location::Host(host) => host.is_dir(),
            Location::Memory(p) => self.dirs.contains(&p),
        }
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

impl ModuleFs for VirtualFs {
    fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        match state.locate(path) {
            Location::Host(host) => host.exists(),
            Location::Memory(p) => state.dirs.contains(&p) || state.files.contains_key(&p),
        }
    }

    fn mkdir(&self, path: &str) -> Result<(), ModuleError> {
        let mut state = self.lock();
        match state.locate(path) {
            Location::Host(host) => {
                std::fs::create_dir(&host)?;
                Ok(())
            }
            Location::Memory(p) => {
                if state.dirs.contains(&p) || state.files.contains_key(&p) {
                    return Err(ModuleError::AlreadyExists(p));
                }
                let parent = parent_of(&p);
                if !state.is_dir(parent) {
                    return Err(ModuleError::NotFound(parent.to_string()));
                }
                debug!(path = %p, "mkdir");
                state.dirs.insert(p);
                Ok(())
            }
        }
    }

    fn mount_host(&self, host_root: &Path, virtual_root: &str) -> Result<(), ModuleError> {
        let mut state = self.lock();
        let point = state.normalize(virtual_root);
        if state.mounts.contains_key(&point) {
            return Err(ModuleError::AlreadyExists(format!("{point} is already a mount point")));
        }
        if !state.is_dir(&point) {
            return Err(ModuleError::NotADirectory(point));
        }
        if !host_root.is_dir() {
            return Err(ModuleError::NotADirectory(host_root.display().to_string()));
        }
        debug!(point = %point, host = ?host_root, "mount");
        state.mounts.insert(point, host_root.to_path_buf());
        Ok(())
    }

    fn chdir(&self, path: &str) -> Result<(), ModuleError> {
        let mut state = self.lock();
        let target = state.normalize(path);
        if !state.is_dir(&target) {
            return Err(ModuleError::NotFound(target));
        }
        state.cwd = target;
        Ok(())
    }

    fn cwd(&self) -> String {
        self.lock().cwd.clone()
    }

    fn resolve_host(&self, path: &str) -> Result<PathBuf, ModuleError> {
        match self.lock().locate(path) {
            Location::Host(host) => Ok(host),
            Location::Memory(p) => Err(ModuleError::NotMounted(p)),
        }
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, ModuleError> {
        let state = self.lock();
        match state.locate(path) {
            Location::Host(host) => Ok(std::fs::read(host)?),
            Location::Memory(p) => state.files.get(&p).cloned().ok_or(ModuleError::NotFound(p)),
        }
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<(), ModuleError> {
        let mut state = self.lock();
        match state.locate(path) {
            Location::Host(host) => Ok(std::fs::write(host, data)?),
            Location::Memory(p) => {
                if state.dirs.contains(&p) {
                    return Err(ModuleError::AlreadyExists(p));
                }
                let parent = parent_of(&p);
                if !state.is_dir(parent) {
                    return Err(ModuleError::NotFound(parent.to_string()));
                }
                state.files.insert(p, data.to_vec());
                Ok(())
            }
        }
    }
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let fs = VirtualFs::new();
        let state = fs.lock();
        assert_eq!(state.normalize("a/./b/../c"), "/a/c");
        assert_eq!(state.normalize("/../x"), "/x");
        assert_eq!(state.normalize("/"), "/");
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
    }

    #[test]
    fn test_mkdir_requires_parent() {
        let fs = VirtualFs::new();
        assert!(matches!(fs.mkdir("/a/b"), Err(ModuleError::NotFound(_))));
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        assert!(fs.exists("/a/b"));
        assert!(matches!(fs.mkdir("/a"), Err(ModuleError::AlreadyExists(_))));
    }

    #[test]
    fn test_memory_files_and_cwd() {
        let fs = VirtualFs::new();
        fs.chdir("/tmp").unwrap();
        fs.write_file("note", b"abc").unwrap();
        assert_eq!(fs.read_file("/tmp/note").unwrap(), b"abc");
        assert!(matches!(fs.resolve_host("note"), Err(ModuleError::NotMounted(_))));
        assert!(fs.chdir("/nope").is_err());
    }

    #[test]
    fn test_mount_forwards_to_host() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = VirtualFs::new();
        fs.mkdir("/work").unwrap();
        fs.mount_host(tmp.path(), "/work").unwrap();
        assert_eq!(fs.mount_count(), 1);

        fs.write_file("/work/out.bin", &[1, 2, 3]).unwrap();
        assert_eq!(std::fs::read(tmp.path().join("out.bin")).unwrap(), vec![1, 2, 3]);

        fs.mkdir("/work/sub").unwrap();
        assert!(tmp.path().join("sub").is_dir());
        assert_eq!(fs.resolve_host("/work/sub").unwrap(), tmp.path().join("sub"));
        assert_eq!(fs.resolve_host("/work").unwrap(), tmp.path());
    }

    #[test]
    fn test_mount_prefix_is_component_wise() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = VirtualFs::new();
        fs.mkdir("/work").unwrap();
        fs.mkdir("/workshop").unwrap();
        fs.mount_host(tmp.path(), "/work").unwrap();
        assert!(fs.resolve_host("/workshop").is_err());
    }

    #[test]
    fn test_mount_requires_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = VirtualFs::new();
        assert!(matches!(
            fs.mount_host(tmp.path(), "/missing"),
            Err(ModuleError::NotADirectory(_))
        ));
        fs.mkdir("/work").unwrap();
        assert!(fs.mount_host(&tmp.path().join("absent"), "/work").is_err());
    }
}
