use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, warn};

/// Delete `path` after `delay`. Fire-and-forget; a file that is already gone
/// is not an error.
pub fn schedule_cleanup(path: PathBuf, delay: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        remove_if_present(&path).await;
    })
}

async fn remove_if_present(path: &Path) {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "media already removed");
        return;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "media removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "media removed concurrently");
        },
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove media"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_file_after_delay() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        tokio::fs::write(&path, b"x").await.unwrap();

        schedule_cleanup(path.clone(), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gone.bin");
        schedule_cleanup(path.clone(), Duration::ZERO).await.unwrap();
        assert!(!path.exists());
    }
}
