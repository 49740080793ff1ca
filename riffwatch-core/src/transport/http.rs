//! Stateless-request transport
//!
//! Issues a fresh `GET` to the telemetry source on every fetch. Connection
//! failures are retried with backoff; a response that times out after the
//! connection was accepted just skips this tick.

use std::time::Duration;

use crate::config::TelemetryConfig;
use crate::error::{Error, Result, TransportError};

use super::{
    connect_with_retry, AttemptError, ConnectionState, RawPayload, RetryPolicy, StateTracker,
    TelemetryTransport,
};

/// HTTP polling transport
pub struct HttpTransport {
    url: String,
    http_client: reqwest::Client,
    read_timeout: Duration,
    policy: RetryPolicy,
    state: StateTracker,
}

impl HttpTransport {
    /// Create a transport for `http://{host}:{port}/`.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: format!("http://{}/", config.address()),
            http_client,
            read_timeout: config.read_timeout(),
            policy: RetryPolicy::from_config(config),
            state: StateTracker::new(),
        })
    }

    async fn request(&self) -> std::result::Result<Vec<u8>, TransportError> {
        let read_timeout = self.read_timeout;
        let response = connect_with_retry(&self.policy, &self.url, |_| {
            let request = self.http_client.get(&self.url);
            async move {
                request
                    .send()
                    .await
                    .map_err(|e| classify_send_error(e, read_timeout))
            }
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::ConnectionLost(format!(
                "telemetry source returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(read_timeout)
            } else {
                TransportError::ConnectionLost(format!("failed to read response body: {}", e))
            }
        })?;

        if body.is_empty() {
            return Err(TransportError::ConnectionLost(
                "telemetry source returned an empty body".to_string(),
            ));
        }

        Ok(body.to_vec())
    }
}

/// Connect-phase failures are retried; anything after the connection was
/// accepted is surfaced immediately.
fn classify_send_error(error: reqwest::Error, read_timeout: Duration) -> AttemptError {
    if error.is_connect() {
        AttemptError::Retryable(error.to_string())
    } else if error.is_timeout() {
        AttemptError::Fatal(TransportError::Timeout(read_timeout))
    } else {
        AttemptError::Fatal(TransportError::ConnectionLost(format!(
            "HTTP request failed: {}",
            error
        )))
    }
}

impl TelemetryTransport for HttpTransport {
    async fn fetch(&mut self) -> std::result::Result<RawPayload, TransportError> {
        if self.state.get() != ConnectionState::Connected {
            self.state.set(ConnectionState::Connecting);
        }

        match self.request().await {
            Ok(body) => {
                self.state.set(ConnectionState::Connected);
                Ok(RawPayload::new(body))
            }
            Err(e) => {
                if matches!(e, TransportError::ConnectionLost(_)) {
                    self.state.set(ConnectionState::Faulted);
                }
                self.state.set(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn close(&mut self) {
        // Requests are independent; nothing is held between fetches.
        self.state.set(ConnectionState::Disconnected);
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(port: u16) -> TelemetryConfig {
        TelemetryConfig {
            port,
            connect_timeout_ms: 200,
            read_timeout_ms: 300,
            max_retries: 3,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            ..Default::default()
        }
    }

    /// Serve `responses` (status line, body) to consecutive connections.
    async fn serve(listener: TcpListener, responses: Vec<(&'static str, &'static str)>) {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    }

    #[test]
    fn test_url_from_config() {
        let transport = HttpTransport::new(&TelemetryConfig::default()).unwrap();
        assert_eq!(transport.describe(), "http://127.0.0.1:9938/");
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, vec![("200 OK", r#"{"success":true}"#)]));

        let mut transport = HttpTransport::new(&config_for(port)).unwrap();
        let payload = transport.fetch().await.unwrap();
        assert_eq!(payload.as_bytes(), br#"{"success":true}"#);
        assert_eq!(transport.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_server_error_is_connection_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, vec![("500 Internal Server Error", "oops")]));

        let mut transport = HttpTransport::new(&config_for(port)).unwrap();
        let err = transport.fetch().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_refused_connect_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = HttpTransport::new(&config_for(port)).unwrap();
        let err = transport.fetch().await.unwrap_err();
        assert_eq!(err, TransportError::Unreachable { attempts: 3 });
    }

    #[tokio::test]
    async fn test_slow_response_is_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let mut transport = HttpTransport::new(&config_for(port)).unwrap();
        let err = transport.fetch().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }
}
