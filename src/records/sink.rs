//! Writing aggregated results to disk.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::StructuredError;

/// UTF-8 byte order mark, prepended so spreadsheet tools detect the
/// encoding of exported results.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Writes aggregated result bytes to `path` atomically.
///
/// The content lands in a temp file in the destination directory and is
/// renamed into place, so readers never observe a partial file. The
/// output starts with a UTF-8 BOM.
///
/// # Errors
///
/// `InternalError` on any filesystem failure.
pub async fn write_output(path: &Path, content: Vec<u8>) -> Result<(), StructuredError> {
    let path = path.to_owned();
    let written = content.len();

    tokio::task::spawn_blocking(move || write_output_blocking(&path, &content))
        .await
        .map_err(|e| StructuredError::internal(format!("Task join error: {}", e)))??;

    info!("[RECORDS] wrote {} result bytes", written);

    Ok(())
}

fn write_output_blocking(path: &Path, content: &[u8]) -> Result<(), StructuredError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .map_err(|e| StructuredError::internal(format!("Failed to create output directory: {}", e)))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| StructuredError::internal(format!("Failed to create temp file: {}", e)))?;

    temp_file
        .write_all(UTF8_BOM)
        .and_then(|_| temp_file.write_all(content))
        .and_then(|_| temp_file.flush())
        .map_err(|e| StructuredError::internal(format!("Failed to write output file: {}", e)))?;

    temp_file
        .persist(path)
        .map_err(|e| StructuredError::internal(format!("Failed to persist output file: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn output_starts_with_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");

        write_output(&path, b"Id,Name\n001,Acme\n".to_vec()).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], UTF8_BOM);
        assert_eq!(&bytes[3..], b"Id,Name\n001,Acme\n");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, b"stale").unwrap();

        write_output(&path, b"fresh\n".to_vec()).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[3..], b"fresh\n");
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out").join("results.csv");

        write_output(&path, b"Id\n".to_vec()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn no_partial_file_on_success_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");

        write_output(&path, b"Id\n001\n".to_vec()).await.unwrap();

        // Only the final file remains; the temp file was renamed away.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
