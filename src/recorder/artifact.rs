//! Finished recording artifact

use chrono::{DateTime, SecondsFormat, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// The whole recording, read back from storage after finalize
#[derive(Debug, Clone)]
pub struct RecordingBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub extension: String,
    pub created_at: DateTime<Utc>,
}

impl RecordingBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            extension: extension.into(),
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `meeting-recording-<ISO timestamp>.<ext>`, with `:` and `.` in the
    /// timestamp replaced so the name is valid everywhere
    pub fn download_name(&self) -> String {
        let stamp = self
            .created_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("meeting-recording-{}.{}", stamp, self.extension)
    }

    /// Write the blob into `dir` under its download name
    pub async fn save_to(&self, dir: &Path) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.download_name());
        tokio::fs::write(&path, &self.data).await?;
        tracing::info!("Saved recording ({} bytes) to {:?}", self.data.len(), path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_download_name() {
        let mut blob = RecordingBlob::new(vec![1, 2, 3], "video/webm", "webm");
        blob.created_at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(blob.download_name(), "meeting-recording-2024-03-05T14-07-09-000Z.webm");
    }

    #[tokio::test]
    async fn test_save_to() {
        let dir = tempfile::tempdir().unwrap();
        let blob = RecordingBlob::new(b"bytes".to_vec(), "video/mp4", "mp4");
        let path = blob.save_to(&dir.path().join("downloads")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        assert!(path.to_string_lossy().ends_with(".mp4"));
    }
}
