//! The external decoder process on a client node.
//!
//! rtl_433 is started with arguments derived from the server's
//! [`DecoderConfig`] and `-F json`, and its stdout is read as one JSON record
//! per line. The resulting stream is lazy, unbounded and cannot be restarted:
//! when it ends the process is gone and a new one has to be launched.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{ready, Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};

use crate::config::DecoderConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Fields;

/// Default decoder binary, resolved through `PATH`
pub const DEFAULT_DECODER_BINARY: &str = "rtl_433";

/// Records produced by a running decoder.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Fields>> + Send>>;

/// Starts a decoder for a given configuration.
pub trait DecoderLauncher: Send + Sync {
    fn launch(&self, config: &DecoderConfig) -> Result<RecordStream>;
}

/// Runs rtl_433 as a child process.
#[derive(Debug, Clone)]
pub struct Rtl433Launcher {
    binary: PathBuf,
}

impl Default for Rtl433Launcher {
    fn default() -> Self {
        Self::new(DEFAULT_DECODER_BINARY)
    }
}

impl Rtl433Launcher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Full command line, binary first.
    pub fn command_line(&self, config: &DecoderConfig) -> Vec<String> {
        let mut line = vec![self.binary.to_string_lossy().into_owned()];
        line.extend(config.to_args());
        line.push("-F".to_string());
        line.push("json".to_string());
        line
    }
}

impl DecoderLauncher for Rtl433Launcher {
    fn launch(&self, config: &DecoderConfig) -> Result<RecordStream> {
        let line = self.command_line(config);
        info!(command = %line.join(" "), "Starting decoder");

        let mut child = Command::new(&self.binary)
            .args(&line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProtocolError::DecoderError(format!(
                    "failed to start {}: {e}",
                    self.binary.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProtocolError::DecoderError("decoder stdout not captured".into()))?;
        let lines = LinesStream::new(BufReader::new(stdout).lines());

        Ok(Box::pin(DecoderOutput {
            lines,
            child: Some(child),
        }))
    }
}

/// Turn a stream of output lines into records.
///
/// Blank lines and lines that are not JSON objects are skipped.
pub fn records_from_lines<S>(lines: S) -> RecordStream
where
    S: Stream<Item = io::Result<String>> + Unpin + Send + 'static,
{
    Box::pin(DecoderOutput { lines, child: None })
}

/// Parse one output line. `Ok(None)` for blank lines.
pub fn parse_record(line: &str) -> Result<Option<Fields>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(line)? {
        Value::Object(fields) => Ok(Some(fields)),
        _ => Err(ProtocolError::FrameMalformed(
            "decoder record is not a JSON object".into(),
        )),
    }
}

/// Line stream plus the process producing it; dropping one kills the other.
struct DecoderOutput<S> {
    lines: S,
    child: Option<Child>,
}

impl<S> Stream for DecoderOutput<S>
where
    S: Stream<Item = io::Result<String>> + Unpin,
{
    type Item = Result<Fields>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.lines).poll_next(cx)) {
                None => {
                    if let Some(child) = self.child.as_ref() {
                        debug!(pid = ?child.id(), "Decoder output ended");
                    }
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(ProtocolError::DecoderError(format!(
                        "reading decoder output: {e}"
                    )))))
                }
                Some(Ok(line)) => match parse_record(&line) {
                    Ok(Some(fields)) => return Poll::Ready(Some(Ok(fields))),
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, line = %line, "Skipping unreadable decoder line");
                        continue;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_command_line_wraps_args() {
        let mut config = DecoderConfig::default();
        config.params.insert("frequency".into(), json!("915M"));
        let launcher = Rtl433Launcher::new("/opt/rtl_433/bin/rtl_433");

        assert_eq!(
            launcher.command_line(&config),
            vec!["/opt/rtl_433/bin/rtl_433", "-f", "915M", "-F", "json"]
        );
    }

    #[test]
    fn test_parse_record() {
        assert!(parse_record("   ").unwrap().is_none());
        assert!(parse_record("[1]").is_err());
        assert!(parse_record("{oops").is_err());
        let fields = parse_record(r#"{"model":"Acurite-Tower","id":1234}"#)
            .unwrap()
            .unwrap();
        assert_eq!(fields["id"], json!(1234));
    }

    #[tokio::test]
    async fn test_records_skip_noise() {
        let lines = vec![
            Ok(String::new()),
            Ok(r#"{"model":"a"}"#.to_string()),
            Ok("rtl_433 version 23.11".to_string()),
            Ok(r#"{"model":"b"}"#.to_string()),
        ];
        let records: Vec<_> = records_from_lines(tokio_stream::iter(lines))
            .collect::<Vec<_>>()
            .await;

        let models: Vec<_> = records
            .into_iter()
            .map(|r| r.unwrap()["model"].clone())
            .collect();
        assert_eq!(models, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_decoder_error() {
        let launcher = Rtl433Launcher::new("/nonexistent/rtl_433_for_tests");
        let result = launcher.launch(&DecoderConfig::default());
        assert!(matches!(result, Err(ProtocolError::DecoderError(_))));
    }
}
