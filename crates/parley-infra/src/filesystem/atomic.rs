//! Write-to-temp-then-rename file replacement.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a partial one. The parent directory is created if needed.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::now_v7().simple()));

    let result = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}
