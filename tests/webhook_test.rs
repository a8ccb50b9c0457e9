use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use rsvp_importer::db::{self, NewEvent, Pool};
use rsvp_importer::importer::ImportSettings;
use rsvp_importer::vendor::eventbrite::OrderApi;
use rsvp_importer::vendor::model::EventbriteOrder;
use rsvp_importer::webhook::{router, AppState};

const EVENTBRITE_NETWORK_ID: i64 = 18;

async fn setup_pool() -> Pool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn settings() -> ImportSettings {
    ImportSettings {
        social_network_id: EVENTBRITE_NETWORK_ID,
        source_product_id: 2,
        domain_id: None,
        start_date: Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Canned Eventbrite API edge: returns a fixed order JSON or fails.
struct StubOrders {
    order: Option<serde_json::Value>,
}

#[async_trait]
impl OrderApi for StubOrders {
    async fn fetch_order(&self, _access_token: &str, _api_url: &str) -> Result<EventbriteOrder> {
        match &self.order {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => bail!("eventbrite unavailable"),
        }
    }
}

fn state_with(pool: Pool, order: Option<serde_json::Value>) -> AppState {
    AppState {
        pool,
        orders: Arc::new(StubOrders { order }),
        settings: settings(),
    }
}

fn post_webhook(user_id: i64, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/eventbrite/{}", user_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_event(pool: &Pool, user_id: i64, vendor_event_id: &str) {
    let event = NewEvent {
        user_id,
        social_network_id: EVENTBRITE_NETWORK_ID,
        vendor_event_id: vendor_event_id.to_string(),
        title: "Hiring Mixer".into(),
        description: "".into(),
        url: None,
        group_id: None,
        group_url_name: None,
        start_datetime: Utc.with_ymd_and_hms(2016, 6, 1, 18, 0, 0).unwrap(),
        end_datetime: None,
        timezone: None,
        address_line: None,
        city: Some("Denver".into()),
        state: None,
        zip_code: None,
        country: None,
        latitude: None,
        longitude: None,
        max_attendees: None,
    };
    db::upsert_event(pool, &event).await.unwrap();
}

#[tokio::test]
async fn test_action_is_acknowledged_without_side_effects() {
    let pool = setup_pool().await;
    let app = router(state_with(pool.clone(), None));

    let response = app
        .oneshot(post_webhook(7, json!({ "config": { "action": "test" } })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["message"], "Webhook verified");
    assert_eq!(body["status_code"], 200);

    let candidates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidates")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(candidates, 0);
}

#[tokio::test]
async fn unrecognized_action_is_rejected() {
    let pool = setup_pool().await;
    let app = router(state_with(pool, None));

    let response = app
        .oneshot(post_webhook(7, json!({ "config": { "action": "order.refunded" } })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert_eq!(body["status_code"], 400);
}

#[tokio::test]
async fn order_placed_runs_the_attendee_chain() {
    let pool = setup_pool().await;
    db::upsert_credential(&pool, 7, EVENTBRITE_NETWORK_ID, "eb-tok", None, "eb-member")
        .await
        .unwrap();
    seed_event(&pool, 7, "26557579").await;

    let order = json!({
        "id": "500077508",
        "event_id": "26557579",
        "created": "2016-05-01T12:00:00Z",
        "attendees": [
            { "profile": { "name": "Mark Tolland", "email": "mark@example.test" } }
        ]
    });
    let app = router(state_with(pool.clone(), Some(order)));

    let response = app
        .oneshot(post_webhook(
            7,
            json!({
                "config": { "action": "order.placed" },
                "api_url": "https://www.eventbriteapi.com/v3/orders/500077508/"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (first_name, email): (String, Option<String>) =
        sqlx::query_as("SELECT first_name, email FROM candidates")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(first_name, "Mark");
    assert_eq!(email.as_deref(), Some("mark@example.test"));

    let rsvp_status: String = sqlx::query_scalar("SELECT status FROM rsvps")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rsvp_status, "yes");

    let activity_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities WHERE type = 23")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(activity_count, 1);
}

#[tokio::test]
async fn order_fetch_failure_returns_json_500() {
    let pool = setup_pool().await;
    db::upsert_credential(&pool, 7, EVENTBRITE_NETWORK_ID, "eb-tok", None, "eb-member")
        .await
        .unwrap();
    let app = router(state_with(pool, None));

    let response = app
        .oneshot(post_webhook(
            7,
            json!({
                "config": { "action": "order.placed" },
                "api_url": "https://www.eventbriteapi.com/v3/orders/500077508/"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = response_json(response).await;
    assert_eq!(body["message"], "RSVP import failed");
    assert_eq!(body["status_code"], 500);
}

#[tokio::test]
async fn order_for_unknown_user_fails_with_500() {
    let pool = setup_pool().await;
    let app = router(state_with(pool, None));

    // No credential stored for user 42.
    let response = app
        .oneshot(post_webhook(
            42,
            json!({
                "config": { "action": "order.placed" },
                "api_url": "https://www.eventbriteapi.com/v3/orders/1/"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn healthcheck_responds() {
    let pool = setup_pool().await;
    let app = router(state_with(pool, None));

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/healthcheck")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
