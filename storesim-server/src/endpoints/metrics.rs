use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Router, routing};

use crate::error::ApiResult;
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/metrics", routing::get(metrics))
}

async fn metrics(State(state): State<ServiceState>) -> ApiResult<impl IntoResponse> {
    let body = state.exporter.render()?;
    Ok(([(header::CONTENT_TYPE, state.exporter.format_type())], body))
}
