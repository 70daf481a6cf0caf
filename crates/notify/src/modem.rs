//! AT-command modem transport.
//!
//! Writes `ATD<number>;` / `ATH` and reads response lines until a final
//! result code. Works over any pair of async byte streams: the serial device
//! node opened twice (read and write) in production, an in-memory duplex in
//! tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tracing::{debug, warn};

use vigil_core::{Adapter, VigilError};

use crate::transport::{CallTransport, TransportCommand, TransportError};

/// Final result codes that mean the modem refused the command.
const ERROR_CODES: &[&str] = &["ERROR", "NO CARRIER", "BUSY", "NO DIALTONE", "NO ANSWER"];

/// How long to wait for result codes owed by cancelled commands before
/// writing the next one.
const RESYNC_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq, Eq)]
enum Response {
    Ok,
    Error(String),
    /// Command echo, blank line, or unsolicited output.
    Other,
}

fn classify(line: &str) -> Response {
    if line == "OK" {
        Response::Ok
    } else if ERROR_CODES.contains(&line) || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR") {
        Response::Error(line.to_string())
    } else {
        Response::Other
    }
}

fn encode(command: &TransportCommand) -> String {
    match command {
        TransportCommand::Dial(number) => format!("ATD{number};\r\n"),
        TransportCommand::Hangup => "ATH\r\n".to_string(),
    }
}

pub struct ModemTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
    name: String,
    /// Partial response line; `read_until` keeps bytes here across
    /// cancelled reads.
    line: Vec<u8>,
    /// Commands written whose final result code has not been read yet.
    /// Non-zero at the start of `send` only when an earlier `send` was
    /// dropped mid-flight (the dialer's command timeout).
    owed: usize,
}

impl<R, W> ModemTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, name: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            name: name.into(),
            line: Vec::new(),
            owed: 0,
        }
    }

    /// Read lines until a final result code. Echoes, blank lines and URCs
    /// are skipped.
    async fn read_result(&mut self) -> Result<(), TransportError> {
        loop {
            if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
                return Err(TransportError::Closed);
            }
            let response = {
                let text = String::from_utf8_lossy(&self.line);
                let trimmed = text.trim();
                let response = classify(trimmed);
                if response == Response::Other && !trimmed.is_empty() && !trimmed.starts_with("AT") {
                    debug!(modem = %self.name, line = %trimmed, "unsolicited modem output");
                }
                response
            };
            self.line.clear();

            match response {
                Response::Ok => return Ok(()),
                Response::Error(code) => return Err(TransportError::Rejected(code)),
                Response::Other => {}
            }
        }
    }

    /// Consume the late result codes of commands that timed out, so the next
    /// command is not acked by an earlier command's `OK`. Gives up after
    /// [`RESYNC_WINDOW`] when the modem never answered them.
    async fn resync(&mut self) -> Result<(), TransportError> {
        while self.owed > 0 {
            match tokio::time::timeout(RESYNC_WINDOW, self.read_result()).await {
                Ok(Ok(())) | Ok(Err(TransportError::Rejected(_))) => {
                    debug!(modem = %self.name, "discarded late result of a timed-out command");
                    self.owed -= 1;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(modem = %self.name, owed = self.owed, "modem never answered timed-out commands");
                    self.owed = 0;
                    self.line.clear();
                }
            }
        }
        Ok(())
    }
}

impl<S> ModemTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Build a transport over a single bidirectional stream.
    pub fn from_stream(stream: S, name: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer, name)
    }
}

impl ModemTransport<tokio::fs::File, tokio::fs::File> {
    /// Open the modem's device node. Line settings (speed, framing) are
    /// expected to be configured on the node already.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, VigilError> {
        let path = path.as_ref();
        let init_err =
            |e: std::io::Error| VigilError::adapter_init(Adapter::Transport, format!("{}: {e}", path.display()));

        let reader = tokio::fs::File::open(path).await.map_err(init_err)?;
        let writer = tokio::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(init_err)?;

        tracing::info!(device = %path.display(), "modem opened");
        Ok(Self::new(reader, writer, path.display().to_string()))
    }
}

#[async_trait]
impl<R, W> CallTransport for ModemTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, command: &TransportCommand) -> Result<(), TransportError> {
        self.resync().await?;

        self.owed += 1;
        let wire = encode(command);
        self.writer.write_all(wire.as_bytes()).await?;
        self.writer.flush().await?;

        let result = self.read_result().await;
        self.owed -= 1;
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use vigil_core::PhoneNumber;

    fn dial(number: &str) -> TransportCommand {
        TransportCommand::Dial(PhoneNumber::parse(number).unwrap())
    }

    fn modem() -> (ModemTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>, DuplexStream) {
        let (ours, theirs) = duplex(1024);
        (ModemTransport::from_stream(ours, "test-modem"), theirs)
    }

    #[test]
    fn encodes_at_commands() {
        assert_eq!(encode(&dial("0912345678")), "ATD0912345678;\r\n");
        assert_eq!(encode(&TransportCommand::Hangup), "ATH\r\n");
    }

    #[test]
    fn classifies_result_codes() {
        assert_eq!(classify("OK"), Response::Ok);
        assert_eq!(classify("BUSY"), Response::Error("BUSY".into()));
        assert_eq!(classify("+CME ERROR: 30"), Response::Error("+CME ERROR: 30".into()));
        assert_eq!(classify("ATD111;"), Response::Other);
        assert_eq!(classify("RING"), Response::Other);
    }

    #[tokio::test]
    async fn dial_is_acked_by_ok_after_echo() {
        let (mut modem, mut device) = modem();
        device.write_all(b"ATD111;\r\r\nOK\r\n").await.unwrap();

        modem.send(&dial("111")).await.unwrap();

        let mut written = vec![0u8; 9];
        device.read_exact(&mut written).await.unwrap();
        assert_eq!(&written, b"ATD111;\r\n");
    }

    #[tokio::test]
    async fn error_code_rejects_command() {
        let (mut modem, mut device) = modem();
        device.write_all(b"\r\nNO CARRIER\r\n").await.unwrap();

        let err = modem.send(&TransportCommand::Hangup).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(code) if code == "NO CARRIER"));
    }

    #[tokio::test]
    async fn unsolicited_lines_are_skipped() {
        let (mut modem, mut device) = modem();
        device.write_all(b"+CREG: 1\r\nRING\r\nOK\r\n").await.unwrap();
        modem.send(&TransportCommand::Hangup).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_ok_of_timed_out_dial_does_not_ack_the_hangup() {
        let (mut modem, mut device) = modem();

        let timed_out = tokio::time::timeout(Duration::from_millis(50), modem.send(&dial("111"))).await;
        assert!(timed_out.is_err());

        // The dial's result shows up late, then the modem refuses the hangup.
        device.write_all(b"OK\r\nERROR\r\n").await.unwrap();

        let err = modem.send(&TransportCommand::Hangup).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(code) if code == "ERROR"));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_line_survives_a_timed_out_read() {
        let (mut modem, mut device) = modem();

        device.write_all(b"O").await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(50), modem.send(&dial("111"))).await;
        assert!(timed_out.is_err());

        device.write_all(b"K\r\nNO CARRIER\r\n").await.unwrap();
        let err = modem.send(&TransportCommand::Hangup).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected(code) if code == "NO CARRIER"));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_command_is_forgotten_after_resync_window() {
        let (mut modem, mut device) = modem();

        let timed_out = tokio::time::timeout(Duration::from_millis(50), modem.send(&dial("111"))).await;
        assert!(timed_out.is_err());

        let responder = tokio::spawn(async move {
            let mut written = [0u8; 14];
            device.read_exact(&mut written).await.unwrap();
            device.write_all(b"OK\r\n").await.unwrap();
            (device, written)
        });

        let start = tokio::time::Instant::now();
        modem.send(&TransportCommand::Hangup).await.unwrap();
        assert!(start.elapsed() >= RESYNC_WINDOW);

        let (_device, written) = responder.await.unwrap();
        assert_eq!(&written, b"ATD111;\r\nATH\r\n");
    }

    #[tokio::test]
    async fn eof_means_closed() {
        let (mut modem, device) = modem();
        drop(device);
        let err = modem.send(&TransportCommand::Hangup).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed | TransportError::Io(_)));
    }

    #[tokio::test]
    async fn open_missing_device_is_adapter_init_error() {
        let err = ModemTransport::open("/nonexistent/ttyAMA9").await.err().unwrap();
        assert!(err.is_fatal());
    }
}
