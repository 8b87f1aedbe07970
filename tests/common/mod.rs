//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use observed_client::observation::{ObservationContext, ObservationHandler};

/// A lifecycle callback as seen by [`RecordingHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Error,
    ScopeOpened,
    ScopeClosed,
    Stop,
}

/// Records every callback with a snapshot of the context.
#[derive(Debug, Default, Clone)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<(Event, ObservationContext)>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Event, ObservationContext)> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<Event> {
        self.events().into_iter().map(|(event, _)| event).collect()
    }

    /// Contexts passed to `on_stop`, in stop order.
    pub fn stopped(&self) -> Vec<ObservationContext> {
        self.events()
            .into_iter()
            .filter(|(event, _)| *event == Event::Stop)
            .map(|(_, ctx)| ctx)
            .collect()
    }

    fn record(&self, event: Event, ctx: &ObservationContext) {
        self.events.lock().unwrap().push((event, ctx.clone()));
    }
}

impl ObservationHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn on_start(&self, ctx: &ObservationContext) {
        self.record(Event::Start, ctx);
    }

    fn on_error(&self, ctx: &ObservationContext) {
        self.record(Event::Error, ctx);
    }

    fn on_scope_opened(&self, ctx: &ObservationContext) {
        self.record(Event::ScopeOpened, ctx);
    }

    fn on_scope_closed(&self, ctx: &ObservationContext) {
        self.record(Event::ScopeClosed, ctx);
    }

    fn on_stop(&self, ctx: &ObservationContext) {
        self.record(Event::Stop, ctx);
    }
}

/// Request line and headers received by a mock backend.
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Start a mock backend on an ephemeral port that answers every request
/// with `status` and `body`. Returns its address and the captured requests.
pub async fn start_mock_backend(
    status: u16,
    body: &'static str,
) -> (SocketAddr, Arc<Mutex<Vec<CapturedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                // Read until the end of the request head; GETs carry no body.
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                sink.lock().unwrap().push(parse_head(&buf));

                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

fn parse_head(buf: &[u8]) -> CapturedRequest {
    let text = String::from_utf8_lossy(buf);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    CapturedRequest {
        request_line,
        headers,
    }
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
