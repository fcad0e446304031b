//! HTTP facade of the development server.
//!
//! - `GET /__kiln__/events`: Server-Sent Events push channel
//! - `GET /__kiln__/status`: build status as JSON
//! - `GET {public_path}*`: committed files from memory, then the output
//!   directory on disk (the vendor copy)

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, Uri, header},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use kiln_bundler::HOT_EVENTS_PATH;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::dev::{DevEvent, SharedState, error_overlay::error_overlay, state::StatusReport};
use crate::error::{CliError, Result};

pub const STATUS_PATH: &str = "/__kiln__/status";

#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the build output, with leading and trailing slash.
    pub public_path: String,
    pub cors: bool,
}

impl DevServerConfig {
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
struct AppState {
    state: SharedState,
    public_path: Arc<str>,
}

pub struct DevServer {
    config: DevServerConfig,
    state: SharedState,
}

impl DevServer {
    pub fn new(config: DevServerConfig, state: SharedState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until the task is dropped.
    pub async fn start(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| {
                CliError::Server(format!(
                    "Failed to bind to {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })?;

        crate::ui::success(&format!(
            "Serving {} at {}{}",
            self.state.out_dir().display(),
            self.config.server_url(),
            self.config.public_path
        ));

        axum::serve(listener, self.router())
            .await
            .map_err(|e| CliError::Server(format!("Server error: {}", e)))
    }

    pub fn router(&self) -> Router {
        let app = AppState {
            state: Arc::clone(&self.state),
            public_path: Arc::from(self.config.public_path.as_str()),
        };

        let router = Router::new()
            .route(HOT_EVENTS_PATH, get(handle_events))
            .route(STATUS_PATH, get(handle_status))
            .fallback(handle_request)
            .with_state(app);

        if self.config.cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }
}

async fn handle_events(
    State(app): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let state = app.state;
    let (id, rx) = state.register_client();

    // Every connection starts with the current generation, and the overlay
    // when the last build failed.
    let mut greeting = vec![DevEvent::Connected {
        generation: state.generation(),
    }];
    if let Some(error) = state.get_status().error() {
        greeting.push(DevEvent::BuildFailed {
            error: error.to_string(),
            html: error_overlay(error),
        });
    }
    let greeting: Vec<String> = greeting
        .iter()
        .filter_map(|event| serde_json::to_string(event).ok())
        .collect();
    tracing::debug!(client = id, "event stream opened");

    let stream = tokio_stream::iter(greeting)
        .chain(ReceiverStream::new(rx))
        .map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_status(State(app): State<AppState>) -> Json<StatusReport> {
    Json(app.state.status_report())
}

async fn handle_request(State(app): State<AppState>, uri: Uri) -> Response {
    let Some(name) = uri
        .path()
        .strip_prefix(&*app.public_path)
        .filter(|name| !name.is_empty())
    else {
        return not_found(uri.path());
    };

    if let Some(output) = app.state.snapshot() {
        if let Some(file) = output.file(name) {
            return Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, determine_content_type(name))
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::ETAG, format!("\"{}\"", file.digest))
                .body(Body::from(file.content.to_vec()))
                .unwrap_or_else(|_| internal_error());
        }
    }

    serve_from_disk(&app, name).await
}

/// Fall back to the output directory. `ServeDir` rejects paths that leave it.
async fn serve_from_disk(app: &AppState, name: &str) -> Response {
    let request = match Request::builder()
        .uri(format!("/{}", name))
        .body(Body::empty())
    {
        Ok(request) => request,
        Err(_) => return not_found(name),
    };

    match ServeDir::new(app.state.out_dir()).try_call(request).await {
        Ok(response) if response.status().is_success() => {
            let mut response = response.map(Body::new);
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Ok(_) => not_found(name),
        Err(e) => {
            tracing::warn!(file = name, "failed to read from output directory: {}", e);
            internal_error()
        }
    }
}

fn not_found(path: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("File not found: {}", path)).into_response()
}

fn internal_error() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Content type by file extension.
pub fn determine_content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "map" | "json" => "application/json",
        "html" => "text/html; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(determine_content_type("index.js"), "application/javascript; charset=utf-8");
        assert_eq!(determine_content_type("index.css"), "text/css; charset=utf-8");
        assert_eq!(determine_content_type("index.js.map"), "application/json");
        assert_eq!(determine_content_type("govuk/fonts/bold.woff2"), "font/woff2");
        assert_eq!(determine_content_type("large-1a2b3c4d.png"), "image/png");
        assert_eq!(determine_content_type("LICENSE"), "application/octet-stream");
    }

    #[test]
    fn test_server_url() {
        let config = DevServerConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            public_path: "/static/".into(),
            cors: true,
        };
        assert_eq!(config.server_url(), "http://127.0.0.1:8080");
    }
}
