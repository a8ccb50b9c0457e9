//! Database entity and view models used by repositories.
//!
//! Keep these structs focused on the data flowing into and out of queries.
//! Business logic should live in higher layers.

use chrono::{DateTime, Utc};

/// One stored vendor credential. A credential row may be incomplete (empty
/// token or member id); the importer validates it before building a context.
#[derive(Debug, Clone)]
pub struct UserCredential {
    pub id: i64,
    pub user_id: i64,
    pub social_network_id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub member_id: String,
}

/// Event slice used by the RSVP pass and the webhook handler.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub user_id: i64,
    pub social_network_id: i64,
    pub vendor_event_id: String,
    pub title: String,
    pub start_datetime: DateTime<Utc>,
}

/// Normalized event record produced by a vendor adapter, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub user_id: i64,
    pub social_network_id: i64,
    pub vendor_event_id: String,
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub group_id: Option<i64>,
    pub group_url_name: Option<String>,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub max_attendees: Option<i64>,
}
