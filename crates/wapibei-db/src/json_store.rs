use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// A single JSON document on disk holding a `T`.
///
/// Missing or empty files read as `T::default()`. Updates are serialized
/// through an async mutex and written to a sibling temp file which is then
/// renamed over the original, so readers never observe a half-written file.
pub struct JsonStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub async fn load(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Read-modify-write under the store lock. The closure's return value
    /// is passed through.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut value = self.read().await?;
        let out = f(&mut value);
        self.write(&value).await?;
        Ok(out)
    }

    async fn read(&self) -> Result<T> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt JSON in {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn write(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<Vec<String>> = JsonStore::new(dir.path().join("nothing.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_persists_and_returns_closure_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clicks.json");
        let store: JsonStore<BTreeMap<String, u64>> = JsonStore::new(&path);

        for _ in 0..3 {
            store
                .update(|m| {
                    *m.entry("seller".into()).or_default() += 1;
                })
                .await
                .unwrap();
        }
        let total = store.update(|m| m["seller"]).await.unwrap();
        assert_eq!(total, 3);

        let reopened: JsonStore<BTreeMap<String, u64>> = JsonStore::new(&path);
        assert_eq!(reopened.load().await.unwrap()["seller"], 3);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let store: JsonStore<Vec<String>> = JsonStore::new(&path);
        assert!(store.load().await.is_err());
        assert!(store.update(|v| v.push("x".into())).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }
}
