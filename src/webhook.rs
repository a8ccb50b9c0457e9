//! Inbound webhook server. Eventbrite pushes order notifications here; a
//! pushed order runs the same attendee upsert chain the polling import uses.

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{self, Pool};
use crate::importer::{self, ImportSettings};
use crate::vendor::eventbrite::{self, OrderApi};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub orders: Arc<dyn OrderApi>,
    pub settings: ImportSettings,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub config: WebhookConfig,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
    pub status_code: u16,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/webhooks/eventbrite/:user_id", post(eventbrite_webhook))
        .with_state(state)
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ready": true }))
}

async fn eventbrite_webhook(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<WebhookResponse>) {
    match payload.config.action.as_str() {
        "test" => reply(StatusCode::OK, "Webhook verified"),
        "order.placed" => match handle_order_placed(&state, user_id, &payload).await {
            Ok(()) => {
                info!(user_id, "webhook order imported");
                reply(StatusCode::OK, "RSVP imported")
            }
            Err(err) => {
                error!(user_id, ?err, "webhook order import failed");
                reply(StatusCode::INTERNAL_SERVER_ERROR, "RSVP import failed")
            }
        },
        other => {
            warn!(user_id, action = other, "unrecognized webhook action");
            reply(StatusCode::BAD_REQUEST, "Unrecognized action")
        }
    }
}

fn reply(status: StatusCode, message: &str) -> (StatusCode, Json<WebhookResponse>) {
    (
        status,
        Json(WebhookResponse {
            message: message.to_string(),
            status_code: status.as_u16(),
        }),
    )
}

async fn handle_order_placed(state: &AppState, user_id: i64, payload: &WebhookPayload) -> Result<()> {
    let api_url = payload
        .api_url
        .as_deref()
        .context("order.placed push is missing api_url")?;
    let credential = db::get_credential(&state.pool, user_id, state.settings.social_network_id)
        .await?
        .context("no eventbrite credential stored for this user")?;
    let order = state
        .orders
        .fetch_order(&credential.access_token, api_url)
        .await?;
    let event = db::get_event_by_vendor_id(
        &state.pool,
        user_id,
        state.settings.social_network_id,
        &order.event_id,
    )
    .await?
    .with_context(|| format!("order references unknown event {}", order.event_id))?;

    let attendee = eventbrite::order_to_attendee(&order, &event)?;
    importer::process_attendee(&state.pool, &state.settings, attendee).await?;
    Ok(())
}
