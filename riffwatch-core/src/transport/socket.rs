//! Persistent-socket transport
//!
//! Connects once and reads newline-delimited JSON frames from the stream.
//! Blank lines are ignored. When several complete frames are already
//! buffered, only the newest is returned so a slow poller never falls behind
//! the source.
//!
//! A zero-byte read, a reset, or a frame that is oversized or not UTF-8
//! faults the connection: it is dropped immediately and the next fetch
//! reconnects from scratch.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::TelemetryConfig;
use crate::error::TransportError;

use super::{
    connect_with_retry, AttemptError, ConnectionState, RawPayload, RetryPolicy, StateTracker,
    TelemetryTransport,
};

/// Stream-oriented transport over a single TCP connection.
pub struct SocketTransport {
    address: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_frame_bytes: usize,
    policy: RetryPolicy,
    state: StateTracker,
    reader: Option<BufReader<TcpStream>>,
    /// Bytes of a frame whose newline has not arrived yet
    pending: Vec<u8>,
}

impl SocketTransport {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            address: config.address(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_frame_bytes: config.max_frame_bytes,
            policy: RetryPolicy::from_config(config),
            state: StateTracker::new(),
            reader: None,
            pending: Vec::new(),
        }
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.state.set(ConnectionState::Connecting);

        let address = self.address.clone();
        let connect_timeout = self.connect_timeout;
        let result = connect_with_retry(&self.policy, &self.address, |_| {
            let address = address.clone();
            async move {
                match tokio::time::timeout(connect_timeout, TcpStream::connect(&address)).await {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(e)) => Err(AttemptError::Retryable(e.to_string())),
                    Err(_) => Err(AttemptError::Retryable(format!(
                        "connect timed out after {connect_timeout:?}"
                    ))),
                }
            }
        })
        .await;

        match result {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                self.reader = Some(BufReader::new(stream));
                self.pending.clear();
                self.state.set(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Drop the connection after a failure and report it as lost.
    fn fault(&mut self, reason: impl Into<String>) -> TransportError {
        let reason = reason.into();
        tracing::warn!(address = %self.address, reason = %reason, "Telemetry socket faulted");
        self.state.set(ConnectionState::Faulted);
        self.reader = None;
        self.pending = Vec::new();
        self.state.set(ConnectionState::Disconnected);
        TransportError::ConnectionLost(reason)
    }

    /// Read one complete frame, or fail.
    ///
    /// `Ok(None)` means a blank keep-alive line was consumed.
    async fn read_frame(&mut self, deadline: Instant) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(TransportError::ConnectionLost("not connected".to_string()));
        };

        // read_until appends to `pending`, so a timed-out partial frame is
        // completed by the next call instead of being lost. The read is capped
        // one byte past the limit so `pending` never outgrows a legal frame.
        let limit = (self.max_frame_bytes + 1).saturating_sub(self.pending.len()) as u64;
        let mut capped = reader.take(limit);
        let read = tokio::time::timeout_at(deadline, capped.read_until(b'\n', &mut self.pending)).await;

        match read {
            Err(_) => Err(TransportError::Timeout(self.read_timeout)),
            Ok(Err(e)) => Err(self.fault(e.to_string())),
            Ok(Ok(0)) => Err(self.fault("connection closed by peer")),
            Ok(Ok(_)) => {
                if self.pending.last() != Some(&b'\n') {
                    if self.pending.len() > self.max_frame_bytes {
                        return Err(self.fault("frame exceeds size limit"));
                    }
                    return Err(self.fault("connection closed mid-frame"));
                }
                let frame = std::mem::take(&mut self.pending);
                if frame.len() > self.max_frame_bytes {
                    return Err(self.fault("frame exceeds size limit"));
                }
                let trimmed = trim_frame(&frame);
                if trimmed.is_empty() {
                    return Ok(None);
                }
                if std::str::from_utf8(trimmed).is_err() {
                    return Err(self.fault("malformed frame: not UTF-8"));
                }
                Ok(Some(trimmed.to_vec()))
            }
        }
    }

    /// True when another complete frame is already sitting in the read buffer.
    fn has_buffered_frame(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|reader| reader.buffer().contains(&b'\n'))
    }
}

fn trim_frame(frame: &[u8]) -> &[u8] {
    let start = frame
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(frame.len());
    let end = frame
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &frame[start..end]
}

impl TelemetryTransport for SocketTransport {
    async fn fetch(&mut self) -> Result<RawPayload, TransportError> {
        if self.reader.is_none() {
            self.connect().await?;
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut latest = loop {
            if let Some(frame) = self.read_frame(deadline).await? {
                break frame;
            }
        };

        // Skip to the newest frame the source has already sent. A fault here
        // has already dropped the connection; the frame in hand is still good.
        while self.has_buffered_frame() {
            match self.read_frame(deadline).await {
                Ok(Some(frame)) => latest = frame,
                Ok(None) => continue,
                Err(_) => break,
            }
        }

        Ok(RawPayload::new(latest))
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::info!(address = %self.address, "Telemetry socket closed");
        }
        self.pending = Vec::new();
        self.state.set(ConnectionState::Disconnected);
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}
