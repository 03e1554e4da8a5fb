use crate::errors::StoreError;
use crate::models::DailyRecordMark;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub user_id: Option<i64>,
    pub phone: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expire_time_millis: Option<i64>,
    pub last_used_at_seconds: Option<f64>,
}

/// Everything the client keeps across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalData {
    #[serde(default)]
    pub session: StoredSession,
    /// Daily marks keyed by user id, or `guest`.
    #[serde(default)]
    pub marks: BTreeMap<String, DailyRecordMark>,
}

pub type LocalStore = JsonStore<LocalData>;

/// A JSON document mirrored in memory and rewritten on every update.
pub struct JsonStore<T> {
    path: PathBuf,
    data: Mutex<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let data = load_data(&path).await;
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let data = self.data.lock().await;
        f(&data)
    }

    /// Applies `f` to a copy, writes it out, and only then makes it visible.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let result = f(&mut next);
        persist_data(&self.path, &next).await?;
        *data = next;
        Ok(result)
    }
}

pub async fn load_data<T: DeserializeOwned + Default>(path: &Path) -> T {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file {}: {err}", path.display());
                T::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("no data file at {}, starting empty", path.display());
            T::default()
        }
        Err(err) => {
            error!("failed to read data file {}: {err}", path.display());
            T::default()
        }
    }
}

pub async fn persist_data<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(data)?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, payload).await?;
    fs::rename(&staging, path).await?;
    Ok(())
}

#[cfg(test)]
impl<T> JsonStore<T> {
    /// In-memory store backed by a fresh temp path.
    pub(crate) fn detached(data: T) -> Self {
        Self {
            path: unique_data_path("detached"),
            data: Mutex::new(data),
        }
    }
}

#[cfg(test)]
pub(crate) fn unique_data_path(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("fat_tracker_{tag}_{}_{}.json", std::process::id(), nanos));
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeightOption;

    #[tokio::test]
    async fn update_survives_reopen() {
        let path = unique_data_path("storage_reopen");
        let store = LocalStore::open(&path).await.unwrap();
        store
            .update(|data| {
                data.session.phone = Some("13800000000".to_string());
                data.marks.insert(
                    "7".to_string(),
                    DailyRecordMark {
                        date: "2024-01-01".to_string(),
                        option: WeightOption::Gained,
                    },
                );
            })
            .await
            .unwrap();

        let reopened = LocalStore::open(&path).await.unwrap();
        let data = reopened.read(|data| data.clone()).await;
        assert_eq!(data.session.phone.as_deref(), Some("13800000000"));
        assert_eq!(data.marks["7"].option, WeightOption::Gained);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_empty() {
        let path = unique_data_path("storage_corrupt");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = LocalStore::open(&path).await.unwrap();
        assert_eq!(store.read(|data| data.clone()).await, LocalData::default());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = unique_data_path("storage_dir");
        std::fs::create_dir_all(&dir).unwrap();
        // The target is a directory, so the rename cannot succeed.
        let store = LocalStore {
            path: dir.clone(),
            data: Mutex::new(LocalData::default()),
        };
        let result = store
            .update(|data| data.session.phone = Some("13800000000".to_string()))
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(store.read(|data| data.session.phone.clone()).await, None);
        let _ = std::fs::remove_file(dir.with_extension("json.tmp"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
