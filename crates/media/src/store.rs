use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {thiserror::Error, tracing::debug};

use crate::mime;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to write media to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A stored inbound artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub path: PathBuf,
    /// Public URL the artifact is served under.
    pub url: String,
    /// Content type with parameters stripped.
    pub content_type: String,
}

/// Writes inbound media into the directory served under `/media`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
    public_base_url: String,
    retention: Duration,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            retention,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// How long an artifact stays on disk after its notification attempt.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub async fn ensure_dir(&self) -> Result<(), MediaError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MediaError::Write {
                path: self.dir.clone(),
                source,
            })
    }

    /// Persist `data` under a unique name derived from `mimetype`.
    pub async fn save(&self, data: &[u8], mimetype: &str) -> Result<StoredMedia, MediaError> {
        self.ensure_dir().await?;

        let file_name = unique_name(mime::extension_for(mimetype));
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|source| MediaError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = data.len(), "stored inbound media");

        Ok(StoredMedia {
            url: format!("{}/media/{file_name}", self.public_base_url),
            path,
            content_type: mime::normalize(mimetype).to_string(),
        })
    }
}

fn unique_name(extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{millis}-{}{extension}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_writes_file_and_builds_url() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::new(
            tmp.path().join("media"),
            "http://127.0.0.1:3000/",
            Duration::from_secs(60),
        );

        let stored = store
            .save(b"OggS-data", "audio/ogg; codecs=opus")
            .await
            .unwrap();

        assert_eq!(stored.content_type, "audio/ogg");
        assert!(stored.path.extension().is_some_and(|e| e == "ogg"));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"OggS-data");

        let name = stored.path.file_name().unwrap().to_str().unwrap();
        assert_eq!(stored.url, format!("http://127.0.0.1:3000/media/{name}"));
    }

    #[tokio::test]
    async fn unknown_type_gets_bin_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::new(tmp.path(), "http://localhost:3000", Duration::from_secs(60));
        let stored = store.save(b"x", "application/x-mystery").await.unwrap();
        assert!(stored.path.to_string_lossy().ends_with(".bin"));
    }

    #[tokio::test]
    async fn names_are_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::new(tmp.path(), "http://localhost:3000", Duration::from_secs(60));
        let a = store.save(b"a", "image/png").await.unwrap();
        let b = store.save(b"b", "image/png").await.unwrap();
        assert_ne!(a.path, b.path);
    }
}
