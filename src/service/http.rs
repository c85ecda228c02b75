use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::service::QueryService;

const DEMO_PAGE: &str = include_str!("../../static/index.html");

const CORS_HEADERS: [(header::HeaderName, &str); 2] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Requested-With,Content-Type"),
];

/// Query string of an API call, every `key=value` pair in order
pub type ApiParams = Vec<(String, String)>;

/// First `query` value; later repeats are ignored
pub fn first_query(params: &ApiParams) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == "query")
        .map(|(_, value)| value.as_str())
}

/// Every path whose first segment is `api` answers queries; every other path
/// gets the demo page
pub fn router(service: Arc<QueryService>) -> Router {
    Router::new()
        .route("/api", get(handle_api))
        .route("/api/", get(handle_api))
        .route("/api/*rest", get(handle_api))
        .fallback(handle_demo_page)
        .with_state(service)
}

/// Bind `addr` and serve until the process stops
pub async fn serve(service: QueryService, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(Arc::new(service))).await?;
    Ok(())
}

fn json(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        CORS_HEADERS,
        body,
    )
        .into_response()
}

/// JSON array of `[externalID, score]` pairs; 404 with `[]` without a query
pub async fn handle_api(
    State(service): State<Arc<QueryService>>,
    params: std::result::Result<Query<ApiParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(e) => {
            warn!("rejected query string: {e}");
            return json(StatusCode::BAD_REQUEST, "[]".to_string());
        }
    };
    let Some(query) = first_query(&params).map(str::to_owned) else {
        return json(StatusCode::NOT_FOUND, "[]".to_string());
    };
    let top_k = service.top_k();
    let answer = tokio::task::spawn_blocking(move || service.answer(&query, top_k)).await;
    match answer {
        Ok(Ok(results)) => match serde_json::to_string(&results) {
            Ok(body) => json(StatusCode::OK, body),
            Err(e) => {
                error!("failed to encode results: {e}");
                json(StatusCode::INTERNAL_SERVER_ERROR, "[]".to_string())
            }
        },
        Ok(Err(e)) => {
            error!("query failed: {e}");
            json(StatusCode::INTERNAL_SERVER_ERROR, "[]".to_string())
        }
        Err(e) => {
            error!("query task panicked: {e}");
            json(StatusCode::INTERNAL_SERVER_ERROR, "[]".to_string())
        }
    }
}

pub async fn handle_demo_page() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        CORS_HEADERS,
        DEMO_PAGE,
    )
        .into_response()
}
