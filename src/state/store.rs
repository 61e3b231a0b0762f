//! 状态存储
//!
//! 按目标名称分区的键值存储，提供单键原子读-改-写。
//! 文件实现在同目录的锁文件上加排他 `flock`，写入先落临时文件再 rename。

use crate::error::StateError;
use crate::state::tracker::TargetState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// 一次更新前后的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub previous: TargetState,
    pub current: TargetState,
}

/// 状态存储trait
pub trait StateStore: Send + Sync {
    /// 读取全部记录
    fn load_all(&self) -> Result<BTreeMap<String, TargetState>, StateError>;

    /// 对单个键做原子读-改-写，键不存在时从默认状态开始
    fn update(
        &self,
        key: &str,
        apply: &(dyn Fn(&TargetState) -> TargetState + Send + Sync),
    ) -> Result<StateChange, StateError>;
}

/// 状态文件格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    targets: BTreeMap<String, TargetState>,
}

/// 基于 JSON 文件的状态存储
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStateStore {
    /// 使用指定的状态文件
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    /// 源站监控的默认位置：`<state_dir>/origin/state.json`
    pub fn for_origin(state_dir: &Path) -> Self {
        Self::new(state_dir.join("origin").join("state.json"))
    }

    /// 状态文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn ensure_dir(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    fn read_file(&self) -> Result<StateFile, StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => return Err(self.io_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(StateFile::default());
        }
        serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write_file(&self, state: &StateFile) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state).map_err(|source| StateError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;

        let tmp_path = self
            .path
            .with_extension(format!("json.tmp.{}", std::process::id()));
        let mut file = fs::File::create(&tmp_path).map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| self.io_error(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))
    }
}

impl StateStore for FileStateStore {
    fn load_all(&self) -> Result<BTreeMap<String, TargetState>, StateError> {
        Ok(self.read_file()?.targets)
    }

    fn update(
        &self,
        key: &str,
        apply: &(dyn Fn(&TargetState) -> TargetState + Send + Sync),
    ) -> Result<StateChange, StateError> {
        self.ensure_dir()?;
        let _lock = FileLock::acquire(&self.lock_path)?;

        let mut state = self.read_file()?;
        let previous = state.targets.get(key).cloned().unwrap_or_default();
        let current = apply(&previous);

        if current != previous {
            state.targets.insert(key.to_string(), current.clone());
            self.write_file(&state)?;
        } else if !state.targets.contains_key(key) {
            // 首次出现的目标也落盘，便于 `state show` 查看
            state.targets.insert(key.to_string(), current.clone());
            self.write_file(&state)?;
        }

        debug!("状态已更新: {} -> {:?}", key, current);
        Ok(StateChange { previous, current })
    }
}

/// 排他文件锁，drop 时释放
struct FileLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: fs::File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StateError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| StateError::Lock(format!("{}: {}", path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: fd 在 file 的生命周期内有效
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(StateError::Lock(format!(
                    "{}: {}",
                    path.display(),
                    std::io::Error::last_os_error()
                )));
            }
        }

        Ok(Self { file })
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        // SAFETY: fd 仍然有效，关闭文件本身也会释放锁
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// 内存状态存储，用于测试和 dry-run
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    targets: Mutex<BTreeMap<String, TargetState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置状态
    pub fn with_state(self, key: &str, state: TargetState) -> Self {
        if let Ok(mut targets) = self.targets.lock() {
            targets.insert(key.to_string(), state);
        }
        self
    }
}

impl StateStore for MemoryStateStore {
    fn load_all(&self) -> Result<BTreeMap<String, TargetState>, StateError> {
        self.targets
            .lock()
            .map(|t| t.clone())
            .map_err(|_| StateError::Lock("内存状态锁已损坏".to_string()))
    }

    fn update(
        &self,
        key: &str,
        apply: &(dyn Fn(&TargetState) -> TargetState + Send + Sync),
    ) -> Result<StateChange, StateError> {
        let mut targets = self
            .targets
            .lock()
            .map_err(|_| StateError::Lock("内存状态锁已损坏".to_string()))?;
        let previous = targets.get(key).cloned().unwrap_or_default();
        let current = apply(&previous);
        targets.insert(key.to_string(), current.clone());
        Ok(StateChange { previous, current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tracker::AlertState;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn bump(state: &TargetState) -> TargetState {
        TargetState {
            consecutive_failures: state.consecutive_failures + 1,
            ..state.clone()
        }
    }

    #[test]
    fn test_file_store_lazy_creation_and_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::for_origin(dir.path());
        assert!(store.load_all().unwrap().is_empty());

        let change = store.update("api", &bump).unwrap();
        assert_eq!(change.previous, TargetState::default());
        assert_eq!(change.current.consecutive_failures, 1);
        assert!(dir.path().join("origin").join("state.json").exists());

        // 新实例读取同一文件
        let reopened = FileStateStore::for_origin(dir.path());
        let all = reopened.load_all().unwrap();
        assert_eq!(all["api"].consecutive_failures, 1);
        assert_eq!(all["api"].alert_state, AlertState::Ok);
    }

    #[test]
    fn test_file_store_partitions_by_key() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));

        store.update("a", &bump).unwrap();
        store.update("a", &bump).unwrap();
        store.update("b", &bump).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all["a"].consecutive_failures, 2);
        assert_eq!(all["b"].consecutive_failures, 1);
    }

    #[test]
    fn test_file_store_keeps_stale_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"targets":{"removed":{"consecutive_failures":7,"alert_state":"alerting"}}}"#,
        )
        .unwrap();

        let store = FileStateStore::new(&path);
        store.update("api", &bump).unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all["removed"].consecutive_failures, 7);
        assert_eq!(all["removed"].alert_state, AlertState::Alerting);
        assert_eq!(all["api"].consecutive_failures, 1);
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStateStore::new(&path);
        assert!(matches!(
            store.update("api", &bump),
            Err(StateError::Corrupt { .. })
        ));
        // 损坏的文件不会被覆盖
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn test_file_store_concurrent_updates_are_serialized() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path().join("state.json")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store.update("api", &bump).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load_all().unwrap()["api"].consecutive_failures, 40);
    }

    #[test]
    fn test_memory_store_preset() {
        let store = MemoryStateStore::new().with_state(
            "api",
            TargetState {
                consecutive_failures: 4,
                alert_state: AlertState::Alerting,
                last_transition: None,
            },
        );
        let change = store.update("api", &bump).unwrap();
        assert_eq!(change.previous.consecutive_failures, 4);
        assert_eq!(change.current.consecutive_failures, 5);
    }
}
