//! JSONL file sink.
//!
//! Every delivery creates a new file named after the local time of the
//! write:
//!
//! ```text
//! output_dir/
//! ├── arxiv_papers_20240115_083000.jsonl
//! └── arxiv_papers_20240115_083004.jsonl
//! ```
//!
//! Each line is one compact JSON object. Non-ASCII text is written as
//! literal UTF-8.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::models::Paper;
use crate::sink::{DeliveryReport, Sink, SinkError};

/// Upper bound on `_N` suffixes tried when a file name is taken
const MAX_NAME_ATTEMPTS: usize = 100;

/// Writes each batch to a fresh JSONL file
#[derive(Debug, Clone)]
pub struct LocalSink {
    output_dir: PathBuf,
}

impl LocalSink {
    /// Create a sink without touching the filesystem
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Create a sink and make sure its directory exists
    pub fn create(output_dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let sink = Self::new(output_dir);
        std::fs::create_dir_all(&sink.output_dir).map_err(|source| SinkError::Io {
            path: sink.output_dir.display().to_string(),
            source,
        })?;
        Ok(sink)
    }

    /// File name for a batch written at `now`; `attempt > 0` adds a suffix
    pub fn file_name(now: DateTime<Local>, attempt: usize) -> String {
        let stamp = now.format("%Y%m%d_%H%M%S");
        if attempt == 0 {
            format!("arxiv_papers_{stamp}.jsonl")
        } else {
            format!("arxiv_papers_{stamp}_{attempt}.jsonl")
        }
    }

    /// Encode papers as newline-delimited JSON
    pub fn encode_jsonl(papers: &[Paper]) -> Result<Vec<u8>, SinkError> {
        let mut buf = Vec::new();
        for paper in papers {
            serde_json::to_writer(&mut buf, paper)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }

    /// Create a file that does not exist yet, adding a suffix on collision
    async fn create_unique(&self, now: DateTime<Local>) -> Result<(fs::File, PathBuf), SinkError> {
        let mut last_err = None;
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.output_dir.join(Self::file_name(now, attempt));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => last_err = Some(e),
                Err(source) => {
                    return Err(SinkError::Io {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }

        Err(SinkError::Io {
            path: self.output_dir.display().to_string(),
            source: last_err.unwrap_or_else(|| std::io::ErrorKind::AlreadyExists.into()),
        })
    }
}

#[async_trait]
impl Sink for LocalSink {
    fn name(&self) -> &str {
        "local"
    }

    #[instrument(level = "info", skip_all, fields(output_dir = %self.output_dir.display()))]
    async fn deliver(&self, papers: &[Paper]) -> Result<DeliveryReport, SinkError> {
        let body = Self::encode_jsonl(papers)?;

        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.output_dir.display().to_string(),
                source,
            })?;

        let (mut file, path) = self.create_unique(Local::now()).await?;
        let io_err = |source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };
        file.write_all(&body).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        info!(count = papers.len(), path = %path.display(), "Saved papers to local file");

        Ok(DeliveryReport {
            delivered: papers.len(),
            destination: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperBuilder;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn paper(id: &str, title: &str) -> Paper {
        PaperBuilder::new(id, title)
            .author("Émilie du Châtelet")
            .abstract_text("Énergie cinétique ∝ v²")
            .category("cs.LG")
            .published_at(1_705_307_400)
            .build()
    }

    #[test]
    fn test_file_name() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 8, 30, 5).unwrap();
        assert_eq!(
            LocalSink::file_name(now, 0),
            "arxiv_papers_20240115_083005.jsonl"
        );
        assert_eq!(
            LocalSink::file_name(now, 2),
            "arxiv_papers_20240115_083005_2.jsonl"
        );
    }

    #[test]
    fn test_encode_jsonl_one_object_per_line() {
        let papers = vec![paper("2401.00001", "First"), paper("2401.00002", "Second")];
        let encoded = String::from_utf8(LocalSink::encode_jsonl(&papers).unwrap()).unwrap();

        let lines: Vec<&str> = encoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(encoded.ends_with('\n'));
        assert!(lines[0].contains("Émilie du Châtelet"));
        assert!(lines[0].contains("∝ v²"));
        assert!(!encoded.contains("\\u"));
    }

    #[tokio::test]
    async fn test_deliver_round_trips() {
        let dir = tempdir().unwrap();
        let sink = LocalSink::create(dir.path().join("nested/output")).unwrap();
        let papers = vec![paper("2401.00001", "图神经网络"), paper("2401.00002", "Second")];

        let report = sink.deliver(&papers).await.unwrap();
        assert_eq!(report.delivered, 2);

        let written = std::fs::read_to_string(&report.destination).unwrap();
        let decoded: Vec<Paper> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(decoded, papers);
        assert!(written.contains("图神经网络"));
    }

    #[tokio::test]
    async fn test_deliveries_never_overwrite() {
        let dir = tempdir().unwrap();
        let sink = LocalSink::new(dir.path());

        let first = sink.deliver(&[paper("2401.00001", "A")]).await.unwrap();
        let second = sink.deliver(&[paper("2401.00002", "B")]).await.unwrap();

        assert_ne!(first.destination, second.destination);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_directory_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let sink = LocalSink::new(&blocker);
        let result = sink.deliver(&[paper("2401.00001", "A")]).await;

        assert!(matches!(result, Err(SinkError::Io { .. })));
        assert!(LocalSink::create(&blocker).is_err());
    }
}
