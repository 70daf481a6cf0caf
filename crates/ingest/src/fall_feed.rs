//! Newline-delimited JSON fall-event feed.
//!
//! The vision process writes one object per detection:
//! `{"confidence":0.87,"timestamp":"2024-05-01T10:00:00Z"}`. `timestamp` is
//! optional and defaults to the time the line was read. Malformed lines are
//! logged and skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::{info, warn};

use vigil_core::{Adapter, FallEvent, VigilError};

use crate::traits::{FallDetector, SourceError};

#[derive(Debug, Deserialize)]
struct FeedRecord {
    confidence: f64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

pub struct JsonLinesFeed<R> {
    lines: Lines<R>,
    name: String,
    line_no: u64,
}

pub type BoxedReader = BufReader<Box<dyn AsyncRead + Unpin + Send>>;

impl<R> JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            name: name.into(),
            line_no: 0,
        }
    }
}

impl JsonLinesFeed<BoxedReader> {
    /// Open `source`: `-` is stdin, anything else a path (file or FIFO).
    pub async fn open(source: &str) -> Result<Self, VigilError> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = if source == "-" {
            Box::new(tokio::io::stdin())
        } else {
            let file = tokio::fs::File::open(source)
                .await
                .map_err(|e| VigilError::adapter_init(Adapter::VisionFeed, format!("{source}: {e}")))?;
            Box::new(file)
        };
        let name = if source == "-" { "stdin" } else { source };
        info!(feed = %name, "fall feed opened");
        Ok(Self::new(BufReader::new(reader), name))
    }
}

fn parse_line(line: &str) -> Result<FallEvent, String> {
    let record: FeedRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;
    if !(0.0..=1.0).contains(&record.confidence) {
        return Err(format!("confidence {} outside [0, 1]", record.confidence));
    }
    Ok(FallEvent::new(
        record.confidence,
        record.timestamp.unwrap_or_else(Utc::now),
    ))
}

#[async_trait]
impl<R> FallDetector for JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<FallEvent>, SourceError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(event) => return Ok(Some(event)),
                Err(reason) => {
                    warn!(feed = %self.name, line = self.line_no, %reason, "skipping malformed fall event");
                }
            }
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
