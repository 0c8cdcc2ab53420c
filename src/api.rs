//! HTTP admin API.
//!
//! Editor panels read and save the shared configuration here, follow changes
//! over Server-Sent Events and upload media. Uploads kept in memory are
//! served back under `/media`. The `/v1/documents` routes serve the
//! document-store wire format so one instance can be the remote store of
//! another.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, patch, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::blob::{BlobError, BlobUploader, MemoryBlobStore, MAX_UPLOAD_BYTES};
use crate::document::{merge_over_defaults, Document, Section, SectionError, SiteConfig};
use crate::notify::{Notice, Notifier};
use crate::remote::{DocumentPath, DocumentStore, SetOptions};
use crate::sync::ConfigSync;

type ApiError = (StatusCode, String);

/// Shared application state
pub struct AppState {
    /// Owner of the site configuration
    pub sync: Arc<ConfigSync>,
    /// Toast notifications for panels
    pub notifier: Arc<dyn Notifier>,
    /// Media uploads
    pub blobs: Arc<dyn BlobUploader>,
    /// In-memory uploads served on `/media`
    pub media: Option<Arc<MemoryBlobStore>>,
    /// Store served on `/v1/documents`
    pub documents: Arc<dyn DocumentStore>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        sync: Arc<ConfigSync>,
        notifier: Arc<dyn Notifier>,
        blobs: Arc<dyn BlobUploader>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            sync,
            notifier,
            blobs,
            media: None,
            documents,
            started_at: Instant::now(),
        }
    }

    /// Serve `store` on `/media` (use the same store as `blobs`)
    pub fn with_media(mut self, store: Arc<MemoryBlobStore>) -> Self {
        self.media = Some(store);
        self
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    document: String,
    is_loaded: bool,
    last_fetch: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    url: String,
}

/// Build the router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/config/refresh", post(refresh_config))
        .route("/api/config/:section", patch(patch_section))
        .route("/api/events", get(events_stream))
        .route(
            "/api/uploads/:file_name",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/media/:key", get(get_media))
        .route(
            "/v1/documents/:collection/:key",
            get(get_document).patch(merge_document).put(replace_document),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        document: state.sync.options().document.to_string(),
        is_loaded: state.sync.is_loaded(),
        last_fetch: state.sync.last_fetch(),
    })
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<SiteConfig> {
    Json(state.sync.get().as_ref().clone())
}

/// Replace the whole configuration; keys left out fall back to defaults
async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(doc): Json<Document>,
) -> Json<SiteConfig> {
    let next = merge_over_defaults(&doc);
    state.sync.save(next.clone());
    state.notifier.notify(Notice::success("Settings saved"));
    Json(next)
}

/// Replace one top-level section in a copy of the current configuration
async fn patch_section(
    State(state): State<Arc<AppState>>,
    Path(section): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<SiteConfig>, ApiError> {
    let section: Section = section
        .parse()
        .map_err(|e: SectionError| (StatusCode::NOT_FOUND, e.to_string()))?;

    let next = state
        .sync
        .get()
        .with_section(section, value)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    state.sync.save(next.clone());
    state
        .notifier
        .notify(Notice::success(format!("{} updated", section)));
    Ok(Json(next))
}

async fn refresh_config(State(state): State<Arc<AppState>>) -> StatusCode {
    state.sync.spawn_refresh();
    StatusCode::ACCEPTED
}

/// `config` events on every publish, `notice` events from the notifier
async fn events_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let configs = WatchStream::new(state.sync.subscribe())
        .filter_map(|config| Event::default().event("config").json_data(&*config).ok());
    // Sinks without a channel get a closed receiver, which ends that half of the stream
    let notices = state
        .notifier
        .subscribe()
        .unwrap_or_else(|| broadcast::channel(1).1);
    let notices = BroadcastStream::new(notices)
        .filter_map(|notice| notice.ok())
        .filter_map(|notice| Event::default().event("notice").json_data(&notice).ok());

    Sse::new(configs.merge(notices).map(Ok::<Event, Infallible>)).keep_alive(KeepAlive::default())
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    match state.blobs.upload(&file_name, content_type, body).await {
        Ok(url) => {
            state
                .notifier
                .notify(Notice::success(format!("Uploaded {}", file_name)));
            Ok(Json(UploadResponse { url }))
        }
        Err(e @ BlobError::Empty) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e @ BlobError::TooLarge { .. }) => Err((StatusCode::PAYLOAD_TOO_LARGE, e.to_string())),
        Err(e) => {
            warn!("Upload of {} failed: {}", file_name, e);
            state
                .notifier
                .notify(Notice::error(format!("Upload of {} failed", file_name)));
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

async fn get_media(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let blob = state
        .media
        .as_ref()
        .and_then(|media| media.get(&key))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No media at {}", key)))?;

    Ok(([(header::CONTENT_TYPE, blob.content_type)], blob.data))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, key)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let path = DocumentPath::new(collection, key);
    match state.documents.get_document(&path).await {
        Ok(Some(doc)) => Ok(Json(Value::Object(doc))),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("No document at {}", path))),
        Err(e) => {
            error!("Failed to load {}: {}", path, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn merge_document(
    state: State<Arc<AppState>>,
    path: Path<(String, String)>,
    body: Json<Value>,
) -> Result<StatusCode, ApiError> {
    write_document(state, path, body, SetOptions::merge()).await
}

async fn replace_document(
    state: State<Arc<AppState>>,
    path: Path<(String, String)>,
    body: Json<Value>,
) -> Result<StatusCode, ApiError> {
    write_document(state, path, body, SetOptions::replace()).await
}

async fn write_document(
    State(state): State<Arc<AppState>>,
    Path((collection, key)): Path<(String, String)>,
    Json(body): Json<Value>,
    options: SetOptions,
) -> Result<StatusCode, ApiError> {
    let path = DocumentPath::new(collection, key);
    let Value::Object(doc) = body else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Document body must be a JSON object".to_string(),
        ));
    };

    state
        .documents
        .set_document(&path, &doc, options)
        .await
        .map_err(|e| {
            error!("Failed to store {}: {}", path, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::cache::MemoryCache;
    use crate::notify::{ChannelNotifier, TracingNotifier};
    use crate::remote::{HttpDocumentStore, MemoryDocumentStore};
    use crate::sync::{SyncEvent, SyncOptions};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        state: Arc<AppState>,
        remote: Arc<MemoryDocumentStore>,
        blobs: Arc<MemoryBlobStore>,
        notices: Arc<ChannelNotifier>,
    }

    fn harness() -> Harness {
        let notices = Arc::new(ChannelNotifier::default());
        harness_with(notices.clone(), notices)
    }

    fn harness_with(notifier: Arc<dyn Notifier>, notices: Arc<ChannelNotifier>) -> Harness {
        let remote = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(MemoryBlobStore::new("/media"));
        let sync = Arc::new(ConfigSync::new(
            SyncOptions::default(),
            Arc::new(MemoryCache::new()),
            remote.clone(),
        ));
        let state = AppState::new(sync, notifier, blobs.clone(), remote.clone()).with_media(blobs.clone());
        Harness {
            state: Arc::new(state),
            remote,
            blobs,
            notices,
        }
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = send(&h.state, get_request("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["document"], "site/config");
        assert_eq!(body["is_loaded"], true);
    }

    #[tokio::test]
    async fn test_get_config_returns_defaults() {
        let h = harness();
        let (status, body) = send(&h.state, get_request("/api/config")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["siteName"], "Your Business");
        assert_eq!(body["heroSlides"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_config_saves_and_notifies() {
        let h = harness();
        let mut notices = h.notices.subscribe();
        let mut events = h.state.sync.events();

        let mut next = serde_json::to_value(SiteConfig::default()).unwrap();
        next["siteName"] = json!("Acme");
        let (status, body) = send(&h.state, json_request("PUT", "/api/config", next)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["siteName"], "Acme");
        assert_eq!(h.state.sync.get().site_name(), "Acme");
        assert_eq!(notices.recv().await.unwrap().message, "Settings saved");

        loop {
            if events.recv().await.unwrap() == SyncEvent::WriteCompleted {
                break;
            }
        }
        let remote = h.remote.snapshot(&DocumentPath::default()).unwrap();
        assert_eq!(remote["siteName"], "Acme");
    }

    #[tokio::test]
    async fn test_put_partial_config_is_completed_from_defaults() {
        let h = harness();
        let body = json!({ "siteName": "x", "gallery": [{ "id": "g1", "focalPoint": [0.2, 0.8] }] });
        let (status, saved) = send(&h.state, json_request("PUT", "/api/config", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["siteName"], "x");
        assert_eq!(saved["gallery"][0]["focalPoint"], json!([0.2, 0.8]));
        assert_eq!(saved["tagline"], SiteConfig::default().tagline());

        let (status, _) = send(&h.state, json_request("PUT", "/api/config", json!(["x"]))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(h.state.sync.get().site_name(), "x");
    }

    #[tokio::test]
    async fn test_patch_section() {
        let h = harness();
        let slides = json!([
            { "id": "s2", "title": "Second" },
            { "id": "s1", "title": "First" }
        ]);
        let (status, body) = send(&h.state, json_request("PATCH", "/api/config/heroSlides", slides.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["heroSlides"][0]["id"], "s2");
        assert_eq!(h.state.sync.get().section(Section::HeroSlides), Some(&slides));
        assert_eq!(h.state.sync.get().site_name(), "Your Business");
    }

    #[tokio::test]
    async fn test_patch_unknown_or_invalid_section() {
        let h = harness();

        let (status, _) = send(&h.state, json_request("PATCH", "/api/config/blogPosts", json!([]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&h.state, json_request("PATCH", "/api/config/map", json!("here"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(*h.state.sync.get(), SiteConfig::default());
    }

    #[tokio::test]
    async fn test_refresh_endpoint_pulls_remote() {
        let h = harness();
        let mut rx = h.state.sync.subscribe();
        h.remote.insert(
            DocumentPath::default(),
            json!({ "tagline": "Fresh" }).as_object().cloned().unwrap(),
        );

        let request = Request::builder()
            .method("POST")
            .uri("/api/config/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&h.state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.state.sync.get().tagline(), "Fresh");
    }

    #[tokio::test]
    async fn test_upload() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/api/uploads/logo.png")
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from(vec![1u8, 2, 3]))
            .unwrap();
        let (status, body) = send(&h.state, request).await;

        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("/media/") && url.ends_with(".png"));
        assert_eq!(h.blobs.len(), 1);

        let empty = Request::builder()
            .method("POST")
            .uri("/api/uploads/empty.png")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&h.state, empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_uploaded_media_is_served_back() {
        let h = harness();
        let upload = Request::builder()
            .method("POST")
            .uri("/api/uploads/hero.JPG")
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(Body::from(vec![0xffu8, 0xd8, 0xff]))
            .unwrap();
        let (status, body) = send(&h.state, upload).await;
        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap().to_string();

        let response = router(h.state.clone()).oneshot(get_request(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &[0xffu8, 0xd8, 0xff][..]);

        let (status, _) = send(&h.state, get_request("/media/missing.png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_any_notifier_can_back_the_api() {
        let unused = Arc::new(ChannelNotifier::default());
        let h = harness_with(Arc::new(TracingNotifier), unused.clone());
        let mut silent = unused.subscribe();

        let (status, _) = send(&h.state, json_request("PATCH", "/api/config/tagline", json!("Logged"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.state.sync.get().tagline(), "Logged");
        assert!(h.state.notifier.subscribe().is_none());
        assert!(silent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_document_routes() {
        let h = harness();

        let (status, _) = send(&h.state, get_request("/v1/documents/site/other")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &h.state,
            json_request("PUT", "/v1/documents/site/other", json!({ "a": 1, "b": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &h.state,
            json_request("PATCH", "/v1/documents/site/other", json!({ "b": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&h.state, get_request("/v1/documents/site/other")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "a": 1, "b": 2 }));

        let (status, _) = send(
            &h.state,
            json_request("PATCH", "/v1/documents/site/other", json!([1, 2])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_http_store_against_served_routes() {
        let h = harness();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(h.state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = HttpDocumentStore::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let path = DocumentPath::new("site", "config");

        assert!(client.get_document(&path).await.unwrap().is_none());

        let first = json!({ "siteName": "Acme", "tagline": "Hi" });
        client
            .set_document(&path, first.as_object().unwrap(), SetOptions::merge())
            .await
            .unwrap();
        let second = json!({ "tagline": "Hello" });
        client
            .set_document(&path, second.as_object().unwrap(), SetOptions::merge())
            .await
            .unwrap();

        let stored = client.get_document(&path).await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), json!({ "siteName": "Acme", "tagline": "Hello" }));
    }
}
