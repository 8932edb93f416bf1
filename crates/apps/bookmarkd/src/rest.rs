//! REST surface over the bookmark service

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{self, Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bookmarks::{
    Bookmark, BookmarkFields, BookmarkId, BookmarkService, Deadline, IndexError, InvalidBookmark,
    SearchResponse,
};
use log::{error, info, warn};
use ring::digest::{SHA512, digest};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

/// Shared handler state
pub struct AppState {
    pub service: BookmarkService,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: BookmarkService, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }
}

/// Failure of a REST call; bodies carry only the status text
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest,
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if e.downcast_ref::<IndexError>()
            .is_some_and(IndexError::is_not_found)
        {
            ApiError::NotFound
        } else if e.downcast_ref::<InvalidBookmark>().is_some() {
            ApiError::BadRequest
        } else {
            ApiError::Internal(e)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

/// Run a blocking service call on the blocking pool under the request deadline
///
/// If the handler future is dropped (client gone) or the timeout fires, the
/// deadline is cancelled and the store call stops at its next checkpoint.
async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&BookmarkService, &Deadline) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let deadline = Deadline::after(state.request_timeout);
    let _cancel = deadline.cancel_on_drop();
    let service = state.service.clone();
    let worker_deadline = deadline.clone();
    let task = tokio::task::spawn_blocking(move || op(&service, &worker_deadline));

    match tokio::time::timeout(state.request_timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join)) => Err(ApiError::Internal(anyhow::anyhow!(
            "store task failed: {}",
            join
        ))),
        Err(_) => Err(ApiError::Internal(anyhow::Error::new(
            IndexError::DeadlineExceeded,
        ))),
    }
}

/// Ids must look like generated ones; anything else cannot exist
fn parse_id(raw: String) -> Result<BookmarkId, ApiError> {
    let id = BookmarkId::from(raw);
    if id.is_well_formed() {
        Ok(id)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(rename = "requestID", default)]
    request_id: u64,
}

async fn search(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params.map_err(|_| ApiError::BadRequest)?;
    let request_id = params.request_id;
    let query = params.q;

    // A failed search still answers with a well-formed envelope
    match blocking(&state, move |svc, deadline| svc.search(&query, request_id, deadline)).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("Search failed: {:?}", e);
            Ok(Json(SearchResponse::failed(request_id)))
        }
    }
}

async fn list_tags(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    blocking(&state, |svc, deadline| svc.tags(deadline))
        .await
        .map(Json)
}

async fn tag_counts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<std::collections::BTreeMap<String, u64>>, ApiError> {
    blocking(&state, |svc, deadline| svc.tag_counts(deadline))
        .await
        .map(Json)
}

async fn create_bookmark(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BookmarkFields>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(fields) = body.map_err(|_| ApiError::BadRequest)?;
    blocking(&state, move |svc, deadline| svc.create(fields, deadline)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_bookmark(
    State(state): State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<Json<Bookmark>, ApiError> {
    let id = parse_id(id)?;
    blocking(&state, move |svc, deadline| svc.get(&id, deadline))
        .await
        .map(Json)
}

async fn update_bookmark(
    State(state): State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
    body: Result<Json<BookmarkFields>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(id)?;
    let Json(fields) = body.map_err(|_| ApiError::BadRequest)?;
    blocking(&state, move |svc, deadline| svc.update(&id, fields, deadline)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_bookmark(
    State(state): State<Arc<AppState>>,
    extract::Path(id): extract::Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(id)?;
    blocking(&state, move |svc, deadline| svc.delete(&id, deadline)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Log one line per request
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} {} {}ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

/// Entity tag of a static file: SHA-512 over the request path and its
/// `Last-Modified` value
fn entity_tag(uri: &str, last_modified: &HeaderValue) -> String {
    let mut input = Vec::with_capacity(uri.len() + 1 + last_modified.len());
    input.extend_from_slice(uri.as_bytes());
    input.push(b'\n');
    input.extend_from_slice(last_modified.as_bytes());
    let hash = digest(&SHA512, &input);
    let hex: String = hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect();
    format!("\"{}\"", hex)
}

/// Add an `ETag` to static responses and answer 304 when `If-None-Match`
/// already names it
async fn etag(request: Request, next: Next) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return next.run(request).await;
    }
    let uri = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let if_none_match = request.headers().get(header::IF_NONE_MATCH).cloned();

    let mut response = next.run(request).await;
    let Some(last_modified) = response.headers().get(header::LAST_MODIFIED) else {
        return response;
    };
    let tag = entity_tag(&uri, last_modified);
    let Ok(value) = HeaderValue::from_str(&tag) else {
        return response;
    };

    if if_none_match.is_some_and(|v| v == value) {
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        *response.body_mut() = Body::empty();
        response.headers_mut().remove(header::CONTENT_LENGTH);
        response.headers_mut().remove(header::CONTENT_TYPE);
    }
    response.headers_mut().insert(header::ETAG, value);
    response
}

/// Build the application router
///
/// REST routes live under `/rest/`; everything else is served from
/// `static_dir` when one is configured.
pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    let rest = Router::new()
        .route("/rest/bookmarks", get(search))
        .route("/rest/bookmarks/tags", get(list_tags))
        .route("/rest/bookmarks/tagCounts", get(tag_counts))
        .route("/rest/bookmark", post(create_bookmark))
        .route(
            "/rest/bookmark/{id}",
            get(get_bookmark)
                .put(update_bookmark)
                .delete(delete_bookmark),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(cors)
        .with_state(state);

    let app = match static_dir {
        Some(dir) => {
            info!("Serving static files from {}", dir.display());
            let files = ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=3600"),
                ))
                .service(ServeDir::new(dir));
            let files = Router::new()
                .fallback_service(files)
                .layer(middleware::from_fn(etag));
            rest.fallback_service(files)
        }
        None => rest,
    };

    app.layer(middleware::from_fn(log_requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookmarks::TantivyStore;
    use tower::ServiceExt;

    fn app() -> (Router, BookmarkService) {
        let store = TantivyStore::in_memory().unwrap();
        let service = BookmarkService::new(Arc::new(store));
        let state = Arc::new(AppState::new(service.clone(), Duration::from_secs(5)));
        (router(state, None), service)
    }

    fn create(service: &BookmarkService, title: &str, tags: &[&str]) -> BookmarkId {
        let fields = BookmarkFields {
            url: "http://example.com".to_string(),
            title: title.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        service.create(fields, &Deadline::none()).unwrap()
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> Response {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_search() {
        let (app, _) = app();
        let body = r#"{"url":"http://example.com","title":"Go Lang","tags":["go","lang"]}"#;

        let response = send(app.clone(), Method::POST, "/rest/bookmark", Some(body)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(app, Method::GET, "/rest/bookmarks?q=go&requestID=42", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(response.headers().get(header::PRAGMA).unwrap(), "no-cache");

        let body = json(response).await;
        assert_eq!(body["requestID"], 42);
        assert_eq!(body["error"], false);
        assert_eq!(body["totalHits"], 1);
        assert_eq!(body["hits"][0]["tags"], serde_json::json!(["go", "lang"]));
        assert!(body["hits"][0]["titleHTML"]
            .as_str()
            .unwrap()
            .contains("<mark>Go</mark>"));
        assert_eq!(body["tagTopTerms"], serde_json::json!(["go"]));
    }

    #[tokio::test]
    async fn test_search_failure_envelope() {
        let (app, _) = app();
        let response = send(app, Method::GET, "/rest/bookmarks?q=title:(&requestID=9", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["error"], true);
        assert_eq!(body["requestID"], 9);
        assert_eq!(body["hits"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_bad_request_id_is_400() {
        let (app, _) = app();
        let response = send(app, Method::GET, "/rest/bookmarks?q=a&requestID=abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(text(response).await, "Bad Request");
    }

    #[tokio::test]
    async fn test_get_update_delete() {
        let (app, service) = app();
        let id = create(&service, "Original", &["x"]);
        let uri = format!("/rest/bookmark/{}", id);

        let response = send(app.clone(), Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["title"], "Original");
        assert_eq!(body["tags"], serde_json::json!(["x"]));

        let update = r#"{"url":"http://example.org","title":"Changed"}"#;
        let response = send(app.clone(), Method::PUT, &uri, Some(update)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let body = json(send(app.clone(), Method::GET, &uri, None).await).await;
        assert_eq!(body["title"], "Changed");
        assert_eq!(body["tags"], serde_json::json!([]));

        for _ in 0..2 {
            let response = send(app.clone(), Method::DELETE, &uri, None).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let response = send(app, Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "Not Found");
    }

    #[tokio::test]
    async fn test_malformed_id_is_404() {
        let (app, _) = app();
        let response = send(app.clone(), Method::GET, "/rest/bookmark/not-hex", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(app, Method::DELETE, "/rest/bookmark/abc123", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_missing_is_404() {
        let (app, _) = app();
        let uri = format!("/rest/bookmark/{}", BookmarkId::generate());
        let body = r#"{"url":"http://example.org","title":"T"}"#;
        let response = send(app, Method::PUT, &uri, Some(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (app, _) = app();
        let response = send(app.clone(), Method::POST, "/rest/bookmark", Some("{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(app.clone(), Method::POST, "/rest/bookmark", Some(r#"{"title":"no url"}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(app, Method::POST, "/rest/bookmark", Some(r#"{"url":"http://a","title":" "}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_tags_and_counts() {
        let (app, service) = app();
        create(&service, "A", &["web", "rust"]);
        create(&service, "B", &["rust"]);

        let tags = json(send(app.clone(), Method::GET, "/rest/bookmarks/tags", None).await).await;
        assert_eq!(tags, serde_json::json!(["rust", "web"]));

        let counts =
            json(send(app, Method::GET, "/rest/bookmarks/tagCounts", None).await).await;
        assert_eq!(counts, serde_json::json!({"rust": 2, "web": 1}));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let (app, _) = app();
        let request = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/rest/bookmark")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>bookmarks</html>").unwrap();

        let store = TantivyStore::in_memory().unwrap();
        let service = BookmarkService::new(Arc::new(store));
        let state = Arc::new(AppState::new(service, Duration::from_secs(5)));
        let app = router(state, Some(dir.path()));

        let response = send(app.clone(), Method::GET, "/index.html", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=3600"
        );
        assert!(response.headers().get(header::LAST_MODIFIED).is_some());
        let tag = response.headers().get(header::ETAG).unwrap().clone();
        assert!(tag.to_str().unwrap().starts_with('"'));
        assert_eq!(text(response).await, "<html>bookmarks</html>");

        let response = send(app.clone(), Method::GET, "/missing.js", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::ETAG).is_none());

        // A matching If-None-Match is answered without a body
        let request = axum::http::Request::builder()
            .uri("/index.html")
            .header(header::IF_NONE_MATCH, tag.clone())
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers().get(header::ETAG), Some(&tag));
        assert_eq!(text(response).await, "");

        let request = axum::http::Request::builder()
            .uri("/index.html")
            .header(header::IF_NONE_MATCH, "\"stale\"")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_entity_tag_depends_on_path_and_mtime() {
        let monday = HeaderValue::from_static("Mon, 02 Jan 2006 15:04:05 GMT");
        let tuesday = HeaderValue::from_static("Tue, 03 Jan 2006 15:04:05 GMT");

        let tag = entity_tag("/index.html", &monday);
        assert_eq!(tag.len(), 128 + 2);
        assert_eq!(tag, entity_tag("/index.html", &monday));
        assert_ne!(tag, entity_tag("/index.html", &tuesday));
        assert_ne!(tag, entity_tag("/app.js", &monday));
    }

    #[tokio::test]
    async fn test_closed_store_is_500() {
        let (app, service) = app();
        service.close().unwrap();

        let response = send(app, Method::GET, "/rest/bookmarks/tags", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(text(response).await, "Internal Server Error");
    }
}
