//! Persistence sinks for trial records
//!
//! - `CsvFileSink`: append-only local CSV, header on first write
//! - `RemoteSink`: JSON row POSTed to a tabular-store webhook
//! - `FallbackSink`: primary first, secondary when the primary fails

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::types::TrialRecord;

/// Durable destination for trial rows
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &str;

    async fn append(&self, record: &TrialRecord) -> Result<(), SinkError>;
}

/// Local CSV file
#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    /// Serializes header check + append
    lock: Mutex<()>,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for CsvFileSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn append(&self, record: &TrialRecord) -> Result<(), SinkError> {
        let _guard = self.lock.lock().await;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let needs_header = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let mut out = String::new();
        if needs_header {
            out.push_str(&csv_line(TrialRecord::COLUMNS.iter().copied()));
        }
        let row = record.to_row();
        out.push_str(&csv_line(row.iter().map(String::as_str)));

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// One newline-terminated CSV line, fields quoted when needed
fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Remote tabular store reached over HTTP
#[derive(Debug, Clone)]
pub struct RemoteSink {
    client: reqwest::Client,
    url: String,
}

impl RemoteSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Sink for RemoteSink {
    fn name(&self) -> &str {
        "remote"
    }

    async fn append(&self, record: &TrialRecord) -> Result<(), SinkError> {
        let resp = self.client.post(&self.url).json(record).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Tries `primary`, falls back to `secondary`
pub struct FallbackSink {
    primary: Arc<dyn Sink>,
    secondary: Arc<dyn Sink>,
}

impl FallbackSink {
    pub fn new(primary: Arc<dyn Sink>, secondary: Arc<dyn Sink>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Sink for FallbackSink {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn append(&self, record: &TrialRecord) -> Result<(), SinkError> {
        match self.primary.append(record).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    sink = self.primary.name(),
                    fallback = self.secondary.name(),
                    error = %e,
                    "primary sink failed, using fallback"
                );
                self.secondary.append(record).await
            }
        }
    }
}

/// Local CSV alone, or remote with CSV fallback when a URL is configured
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn Sink>, SinkError> {
    let local: Arc<dyn Sink> = Arc::new(CsvFileSink::new(&config.local_path));
    match config.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let remote: Arc<dyn Sink> = Arc::new(RemoteSink::new(url)?);
            Ok(Arc::new(FallbackSink::new(remote, local)))
        }
        None => Ok(local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a, b"), "\"a, b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_line_ends_with_newline() {
        assert_eq!(csv_line(["a", "b,c"].into_iter()), "a,\"b,c\"\n");
    }

    #[test]
    fn test_build_sink_without_remote_is_csv() {
        let sink = build_sink(&SinkConfig::default()).unwrap();
        assert_eq!(sink.name(), "csv");
    }

    #[test]
    fn test_build_sink_with_remote_is_fallback() {
        let config = SinkConfig {
            local_path: "out.csv".into(),
            remote_url: Some("http://127.0.0.1:9/rows".into()),
        };
        assert_eq!(build_sink(&config).unwrap().name(), "fallback");
    }
}
