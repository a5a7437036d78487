//! Relay Server - HTTP front end for the forwarding uploader

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::multipart::read_upload_form;
use crate::config::Config;
use crate::upload::{ForwardingUploader, UploadError, UploadResult};

/// Single-attempt upload route
pub const ROUTE_UPLOAD: &str = "/upload-with-presigned";

/// Upload route with retry and backoff
pub const ROUTE_UPLOAD_RETRY: &str = "/upload-with-presigned-retry";

/// Body of a successful upload response
#[derive(Serialize)]
struct UploadResponse<'a> {
    success: bool,
    message: String,
    status: u16,
    file_size: usize,
    filename: Option<&'a str>,
    attempts: u32,
}

/// State shared by every connection
pub struct AppState {
    pub uploader: Arc<ForwardingUploader>,
    pub max_body_bytes: usize,
}

/// Relay HTTP Server
pub struct RelayServer {
    config: Arc<Config>,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let uploader = Arc::new(ForwardingUploader::new(config.uploader_settings())?);
        Ok(Self::with_uploader(config, uploader))
    }

    /// Create a server around an existing uploader
    pub fn with_uploader(config: Arc<Config>, uploader: Arc<ForwardingUploader>) -> Self {
        let state = Arc::new(AppState {
            uploader,
            max_body_bytes: config.max_body_bytes,
        });
        Self { config, state }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow!("Failed to bind to {}: {}", addr, e))
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!("Relay server listening on http://{}", local_addr);

        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Relay server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let io = TokioIo::new(stream);
            let state = self.state.clone();

            tokio::spawn(async move {
                let service = service_fn(|req| {
                    let state = state.clone();
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    if !e.to_string().contains("connection closed") {
                        error!("Error serving connection from {}: {}", peer, e);
                    }
                }
            });
        }
    }

    /// Bind and serve in a background task, returning the bound address
    pub async fn start(self) -> Result<SocketAddr> {
        let listener = self.bind().await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = self.run(listener, std::future::pending()).await {
                error!("Relay server error: {}", e);
            }
        });
        Ok(addr)
    }
}

/// Handle HTTP request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;
        return Ok(cors_response(response));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/") => json_response(
            StatusCode::OK,
            json!({"message": "Image Upload Service is running"}),
        ),
        (Method::POST, ROUTE_UPLOAD) => handle_upload(req, state, Some(0)).await,
        (Method::POST, ROUTE_UPLOAD_RETRY) => handle_upload(req, state, None).await,
        _ => json_error_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(cors_response(response))
}

/// Handle an upload form; `fixed_retries` pins the retry budget for the route
async fn handle_upload<B>(
    req: Request<B>,
    state: Arc<AppState>,
    fixed_retries: Option<u32>,
) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let request_id = Uuid::new_v4();
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let form = match read_upload_form(content_type.as_deref(), req.into_body(), state.max_body_bytes)
        .await
    {
        Ok(form) => form,
        Err(e) => return upload_error_response(request_id, &e),
    };

    let request = match form.into_request(fixed_retries) {
        Ok(r) => r,
        Err(e) => return upload_error_response(request_id, &e),
    };

    info!(
        "[{}] Upload request: filename={:?}, content_type={}, size={} bytes, max_retries={}",
        request_id,
        request.filename(),
        request.content_type(),
        request.payload().len(),
        request.max_retries()
    );

    match state.uploader.upload(&request).await {
        Ok(UploadResult::Success {
            http_status,
            bytes_sent,
            attempts_used,
        }) => {
            info!("[{}] Upload complete after {} attempt(s)", request_id, attempts_used);
            let body = UploadResponse {
                success: true,
                message: format!("Upload complete (attempt {})", attempts_used),
                status: http_status,
                file_size: bytes_sent,
                filename: request.filename(),
                attempts: attempts_used,
            };
            json_response(
                StatusCode::OK,
                serde_json::to_value(&body).unwrap_or_default(),
            )
        }
        Ok(UploadResult::Failure {
            attempts_used,
            last_error,
        }) => {
            let message = if attempts_used == 1 {
                format!("Upload failed: {}", last_error)
            } else {
                format!(
                    "All upload attempts failed ({}). Last error: {}",
                    attempts_used, last_error
                )
            };
            json_error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
        }
        Err(e) => upload_error_response(request_id, &e),
    }
}

fn upload_error_response(request_id: Uuid, err: &UploadError) -> Response<Full<Bytes>> {
    warn!("[{}] Rejected upload request: {}", request_id, err);
    json_error_response(err.status_code(), &err.to_string())
}

/// Add permissive CORS headers
pub fn cors_response(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("*"),
    );
    response
}

/// Create JSON error response
pub fn json_error_response(status: StatusCode, error: &str) -> Response<Full<Bytes>> {
    json_response(status, json!({"success": false, "error": error}))
}

/// Create JSON response
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOptions, UploaderSettings};
    use crate::server::multipart::tests::{encode_form, form_content_type};
    use http_body_util::BodyExt;

    fn test_state(max_body_bytes: usize) -> Arc<AppState> {
        Arc::new(AppState {
            uploader: Arc::new(ForwardingUploader::new(UploaderSettings::default()).unwrap()),
            max_body_bytes,
        })
    }

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(path: &str, body: Vec<u8>) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, form_content_type())
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let req = Request::builder()
            .uri("/")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handle_request(req, test_state(1024)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        let json = body_json(response).await;
        assert_eq!(json["message"], "Image Upload Service is running");
    }

    #[tokio::test]
    async fn test_preflight() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(ROUTE_UPLOAD_RETRY)
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handle_request(req, test_state(1024)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Methods").unwrap(),
            "GET, POST, OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let req = Request::builder()
            .uri("/nope")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handle_request(req, test_state(1024)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let body = encode_form(&[("file", Some("a.png"), Some("image/png"), b"png")]);
        let response = handle_request(post(ROUTE_UPLOAD_RETRY, body), test_state(1024))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No upload URL was provided");
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let body = encode_form(&[("uploadUrl", None, None, b"https://a.b/c")]);
        let response = handle_request(post(ROUTE_UPLOAD, body), test_state(1024))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_retry_limit_is_bad_request() {
        let body = encode_form(&[
            ("file", Some("a.png"), None, b"png"),
            ("uploadUrl", None, None, b"http://127.0.0.1:9/never"),
            ("max_retries", None, None, b"1000"),
        ]);
        let response = handle_request(post(ROUTE_UPLOAD_RETRY, body), test_state(1024))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("exceeds the limit"));
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let big = vec![7u8; 8192];
        let body = encode_form(&[("file", Some("big.bin"), None, &big)]);
        let response = handle_request(post(ROUTE_UPLOAD_RETRY, body), test_state(1024))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_server_uses_config_body_limit() {
        let config = Config::new(ConfigOptions {
            max_body_bytes: Some(4096),
            ..ConfigOptions::default()
        })
        .unwrap();
        let server = RelayServer::new(config).unwrap();
        assert_eq!(server.state.max_body_bytes, 4096);
    }
}
