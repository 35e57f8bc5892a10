//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::mpsc;

pub const REQUEST_ID: &str = "8476a536-e9f4-11e8-9739-2dfe598c3fcd";
pub const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:scale-bench";
pub const TRACE_ID: &str = "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";
pub const NEXT_PATH: &str = "/2018-06-01/runtime/invocation/next";
pub const IMAGE_PATH: &str = "/reference.png";

/// Encodes a solid-colour PNG of the given size.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 160, 255])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    buf
}

/// A request the runtime POSTed back (invocation response or error).
#[derive(Debug, Clone)]
pub struct Posted {
    pub path: String,
    pub body: String,
}

pub struct MockRuntime {
    image: Vec<u8>,
    payload: String,
    next_calls: AtomicUsize,
    posted: mpsc::UnboundedSender<Posted>,
}

impl MockRuntime {
    pub fn next_calls(&self) -> usize {
        self.next_calls.load(Ordering::SeqCst)
    }
}

pub struct MockHandle {
    pub addr: SocketAddr,
    pub runtime: Arc<MockRuntime>,
    pub posted: mpsc::UnboundedReceiver<Posted>,
}

impl MockHandle {
    pub fn runtime_api(&self) -> String {
        self.addr.to_string()
    }

    pub fn image_url(&self) -> String {
        format!("http://{}{}", self.addr, IMAGE_PATH)
    }

    pub fn response_path(&self) -> String {
        format!("/2018-06-01/runtime/invocation/{REQUEST_ID}/response")
    }
}

/// Serves a minimal Lambda Runtime API with a single queued invocation, plus
/// the reference image at [`IMAGE_PATH`].
pub async fn spawn_mock_runtime(image: Vec<u8>, payload: serde_json::Value) -> MockHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = Arc::new(MockRuntime {
        image,
        payload: payload.to_string(),
        next_calls: AtomicUsize::new(0),
        posted: tx,
    });

    let app = Router::new()
        .fallback(runtime_api)
        .with_state(Arc::clone(&runtime));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock runtime");
    let addr = listener.local_addr().expect("Mock runtime has no address");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockHandle {
        addr,
        runtime,
        posted: rx,
    }
}

async fn runtime_api(
    State(runtime): State<Arc<MockRuntime>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();

    if method == Method::GET && path == IMAGE_PATH {
        return runtime.image.clone().into_response();
    }

    if method == Method::GET && path == NEXT_PATH {
        if runtime.next_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let deadline = (chrono::Utc::now().timestamp_millis() + 60_000).to_string();
            let headers = [
                ("lambda-runtime-aws-request-id", REQUEST_ID.to_string()),
                ("lambda-runtime-deadline-ms", deadline),
                ("lambda-runtime-invoked-function-arn", FUNCTION_ARN.to_string()),
                ("lambda-runtime-trace-id", TRACE_ID.to_string()),
            ];
            return (StatusCode::OK, headers, runtime.payload.clone()).into_response();
        }
        // Only one invocation per test; park every later poll
        return std::future::pending::<Response>().await;
    }

    if method == Method::POST {
        let _ = runtime.posted.send(Posted {
            path,
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        return StatusCode::ACCEPTED.into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

/// Serves every request with a `Content-Length` of `declared` but only
/// `actual` body bytes before closing the connection.
pub async fn serve_truncated(declared: usize, actual: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind truncating server");
    let addr = listener.local_addr().expect("Truncating server has no address");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&vec![0u8; actual]).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// The `bootstrap` binary wired to a mock runtime API.
pub fn bootstrap(runtime_api: &str, envs: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bootstrap"));
    cmd.env("AWS_LAMBDA_RUNTIME_API", runtime_api)
        .env("AWS_LAMBDA_FUNCTION_NAME", "scale-bench")
        .env("AWS_LAMBDA_FUNCTION_VERSION", "$LATEST")
        .env("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "128")
        .env("AWS_LAMBDA_LOG_STREAM_NAME", "2026/10/16/[$LATEST]test")
        .env("AWS_LAMBDA_LOG_GROUP_NAME", "/aws/lambda/scale-bench")
        .env_remove("scale")
        .env_remove("image_url")
        .env_remove("_HANDLER")
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd
}
