//! Node endpoints consumed by the monitoring console.

use std::fmt;
use std::str::FromStr;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Serialize;
use storesim_core::{TuningParameter, TuningValue};
use storesim_core::config::TuningTable;

use crate::error::{ApiError, ApiResult};
use crate::state::ServiceState;

/// Version of the `/node/config` payload layout.
const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/detail", routing::get(detail))
        .route("/config", routing::get(config))
        .route("/actions/{action}", routing::post(action))
}

async fn detail(State(state): State<ServiceState>) -> ApiResult<Response> {
    let snapshot = state.latest_snapshot().ok_or(ApiError::WarmingUp)?;
    Ok(Json(snapshot.as_ref()).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeConfig<'a> {
    schema_version: &'static str,
    values: &'a TuningTable<TuningValue>,
    descriptions: TuningTable<&'static str>,
}

async fn config(State(state): State<ServiceState>) -> ApiResult<Response> {
    let snapshot = state.latest_snapshot().ok_or(ApiError::WarmingUp)?;

    let payload = NodeConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        values: &snapshot.node_config,
        descriptions: TuningParameter::descriptions(),
    };

    Ok(Json(payload).into_response())
}

/// Maintenance actions a node accepts.
///
/// The simulator has nothing to maintain, so all actions complete immediately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
    Flush,
    Compact,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Flush => "flush",
            Action::Compact => "compact",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flush" => Ok(Action::Flush),
            "compact" => Ok(Action::Compact),
            other => Err(ApiError::UnknownAction(other.to_owned())),
        }
    }
}

#[derive(Debug, Serialize)]
struct ActionResponse {
    action: &'static str,
    status: &'static str,
}

async fn action(Path(action): Path<String>) -> ApiResult<Json<ActionResponse>> {
    let action = action.parse::<Action>()?;
    tracing::info!(%action, "node action requested");

    Ok(Json(ActionResponse {
        action: action.as_str(),
        status: "COMPLETED",
    }))
}
