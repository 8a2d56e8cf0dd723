#![allow(
    missing_docs,
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! In-process mock APNs server: plain TCP + `h2::server`, scripted
//! per-request behavior, and full request recording. Clients reach it
//! through a `PlainConnector`, so no TLS material is needed to exercise
//! the transport engine.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Response};
use tokio::net::{TcpListener, TcpStream};

/// Route test logs through tracing; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// What the mock does with one request, by global request index.
pub enum Script {
    /// Respond with `status` and an optional JSON body, after an optional
    /// delay. The `apns-id` header is echoed back (or generated).
    Respond {
        status: u16,
        body: Option<String>,
        delay: Option<Duration>,
    },
    /// Hold the stream open forever.
    Hang,
    /// Drop the whole connection without responding.
    DropConnection,
}

impl Script {
    pub fn accept() -> Self {
        Self::Respond {
            status: 200,
            body: None,
            delay: None,
        }
    }

    pub fn accept_after(delay: Duration) -> Self {
        Self::Respond {
            status: 200,
            body: None,
            delay: Some(delay),
        }
    }

    pub fn reject(status: u16, reason: &str) -> Self {
        Self::Respond {
            status,
            body: Some(format!(r#"{{"reason":"{reason}"}}"#)),
            delay: None,
        }
    }

    pub fn reject_after(status: u16, reason: &str, delay: Duration) -> Self {
        Self::Respond {
            status,
            body: Some(format!(r#"{{"reason":"{reason}"}}"#)),
            delay: Some(delay),
        }
    }
}

/// Headers and body of one request the mock saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub topic: Option<String>,
    pub apns_id: Option<String>,
    pub priority: Option<String>,
    pub body: Vec<u8>,
}

struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    counter: AtomicUsize,
    script: Box<dyn Fn(usize) -> Script + Send + Sync>,
}

pub struct MockApns {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockApns {
    /// Bind on an ephemeral port and serve connections until dropped.
    pub async fn start(script: impl Fn(usize) -> Script + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            requests: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            script: Box::new(script),
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_connection(socket, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state }
    }

    /// Mock that accepts everything with 200.
    pub async fn accepting() -> Self {
        Self::start(|_| Script::accept()).await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

async fn serve_connection(socket: TcpStream, state: Arc<MockState>) {
    let Ok(mut conn) = h2::server::Builder::new()
        .max_concurrent_streams(128)
        .handshake::<_, Bytes>(socket)
        .await
    else {
        return;
    };

    loop {
        match conn.accept().await {
            Some(Ok((request, respond))) => {
                let index = state.counter.fetch_add(1, Ordering::SeqCst);
                let action = (state.script)(index);
                if matches!(action, Script::DropConnection) {
                    record(&state, &request.into_parts().0, Vec::new());
                    // Dropping the connection resets every live stream.
                    return;
                }
                tokio::spawn(handle_stream(request, respond, action, Arc::clone(&state)));
            }
            Some(Err(_)) | None => return,
        }
    }
}

async fn handle_stream(
    request: http::Request<h2::RecvStream>,
    mut respond: h2::server::SendResponse<Bytes>,
    action: Script,
    state: Arc<MockState>,
) {
    let (parts, mut body) = request.into_parts();
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let Ok(chunk) = chunk else { return };
        let _ = body.flow_control().release_capacity(chunk.len());
        buf.extend_from_slice(&chunk);
    }
    record(&state, &parts, buf);

    match action {
        Script::Respond {
            status,
            body,
            delay,
        } => {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let apns_id = parts
                .headers
                .get("apns-id")
                .cloned()
                .unwrap_or_else(|| {
                    HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).unwrap()
                });
            let response = Response::builder()
                .status(status)
                .header("apns-id", apns_id)
                .body(())
                .unwrap();
            match body {
                None => {
                    let _ = respond.send_response(response, true);
                }
                Some(body) => {
                    if let Ok(mut stream) = respond.send_response(response, false) {
                        let _ = stream.send_data(Bytes::from(body), true);
                    }
                }
            }
        }
        Script::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Script::DropConnection => {}
    }
}

fn record(state: &MockState, parts: &http::request::Parts, body: Vec<u8>) {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let recorded = RecordedRequest {
        path: parts.uri.path().to_owned(),
        authorization: header("authorization"),
        topic: header("apns-topic"),
        apns_id: header("apns-id"),
        priority: header("apns-priority"),
        body,
    };
    state.requests.lock().unwrap().push(recorded);
}
