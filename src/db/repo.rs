use super::model::{EventRow, NewEvent, UserCredential};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn credential_from_row(row: &SqliteRow) -> UserCredential {
    UserCredential {
        id: row.get("id"),
        user_id: row.get("user_id"),
        social_network_id: row.get("social_network_id"),
        access_token: row.get("access_token"),
        refresh_token: row.try_get::<Option<String>, _>("refresh_token").ok().flatten(),
        member_id: row.get("member_id"),
    }
}

fn event_from_row(row: &SqliteRow) -> EventRow {
    EventRow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        social_network_id: row.get("social_network_id"),
        vendor_event_id: row.get("vendor_event_id"),
        title: row.get("title"),
        start_datetime: row.get("start_datetime"),
    }
}

/// All credentials stored for one social network, in insertion order.
/// `user_filter` narrows the pass to a single platform user.
#[instrument(skip_all)]
pub async fn list_credentials(
    pool: &Pool,
    social_network_id: i64,
    user_filter: Option<i64>,
) -> Result<Vec<UserCredential>> {
    let rows = match user_filter {
        Some(user_id) => {
            sqlx::query(
                "SELECT id, user_id, social_network_id, access_token, refresh_token, member_id \
                 FROM user_credentials WHERE social_network_id = ? AND user_id = ? ORDER BY id",
            )
            .bind(social_network_id)
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT id, user_id, social_network_id, access_token, refresh_token, member_id \
                 FROM user_credentials WHERE social_network_id = ? ORDER BY id",
            )
            .bind(social_network_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.iter().map(credential_from_row).collect())
}

#[instrument(skip_all)]
pub async fn get_credential(
    pool: &Pool,
    user_id: i64,
    social_network_id: i64,
) -> Result<Option<UserCredential>> {
    let row = sqlx::query(
        "SELECT id, user_id, social_network_id, access_token, refresh_token, member_id \
         FROM user_credentials WHERE user_id = ? AND social_network_id = ?",
    )
    .bind(user_id)
    .bind(social_network_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(credential_from_row))
}

#[instrument(skip_all)]
pub async fn upsert_credential(
    pool: &Pool,
    user_id: i64,
    social_network_id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    member_id: &str,
) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM user_credentials WHERE user_id = ? AND social_network_id = ?",
    )
    .bind(user_id)
    .bind(social_network_id)
    .fetch_optional(pool)
    .await?
    {
        sqlx::query(
            "UPDATE user_credentials SET access_token = ?, refresh_token = ?, member_id = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(member_id)
        .bind(id)
        .execute(pool)
        .await?;
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO user_credentials (user_id, social_network_id, access_token, refresh_token, member_id) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(social_network_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(member_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Persist a freshly exchanged access token. The refresh token is kept unless
/// the vendor rotated it as well.
#[instrument(skip_all)]
pub async fn update_access_token(
    pool: &Pool,
    credential_id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE user_credentials SET access_token = ?, \
         refresh_token = COALESCE(?, refresh_token), updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(credential_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert an event keyed by (user_id, vendor_event_id). The vendor's current
/// data always overwrites the stored row's mutable fields.
#[instrument(skip_all)]
pub async fn upsert_event(pool: &Pool, event: &NewEvent) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM events WHERE user_id = ? AND vendor_event_id = ?",
    )
    .bind(event.user_id)
    .bind(&event.vendor_event_id)
    .fetch_optional(pool)
    .await?
    {
        sqlx::query(
            "UPDATE events SET social_network_id = ?, title = ?, description = ?, url = ?, \
             group_id = ?, group_url_name = ?, start_datetime = ?, end_datetime = ?, \
             timezone = ?, address_line = ?, city = ?, state = ?, zip_code = ?, country = ?, \
             latitude = ?, longitude = ?, max_attendees = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?",
        )
        .bind(event.social_network_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.url)
        .bind(event.group_id)
        .bind(&event.group_url_name)
        .bind(event.start_datetime)
        .bind(event.end_datetime)
        .bind(&event.timezone)
        .bind(&event.address_line)
        .bind(&event.city)
        .bind(&event.state)
        .bind(&event.zip_code)
        .bind(&event.country)
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(event.max_attendees)
        .bind(id)
        .execute(pool)
        .await?;
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO events (user_id, social_network_id, vendor_event_id, title, description, \
         url, group_id, group_url_name, start_datetime, end_datetime, timezone, address_line, \
         city, state, zip_code, country, latitude, longitude, max_attendees) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(event.user_id)
    .bind(event.social_network_id)
    .bind(&event.vendor_event_id)
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.url)
    .bind(event.group_id)
    .bind(&event.group_url_name)
    .bind(event.start_datetime)
    .bind(event.end_datetime)
    .bind(&event.timezone)
    .bind(&event.address_line)
    .bind(&event.city)
    .bind(&event.state)
    .bind(&event.zip_code)
    .bind(&event.country)
    .bind(event.latitude)
    .bind(event.longitude)
    .bind(event.max_attendees)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Stored events for one user on one network starting at or after `since`,
/// in insertion order (the order the vendor returned them).
#[instrument(skip_all)]
pub async fn events_since(
    pool: &Pool,
    user_id: i64,
    social_network_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<EventRow>> {
    let rows = sqlx::query(
        "SELECT id, user_id, social_network_id, vendor_event_id, title, start_datetime \
         FROM events WHERE user_id = ? AND social_network_id = ? AND start_datetime >= ? \
         ORDER BY id",
    )
    .bind(user_id)
    .bind(social_network_id)
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(event_from_row).collect())
}

#[instrument(skip_all)]
pub async fn get_event_by_vendor_id(
    pool: &Pool,
    user_id: i64,
    social_network_id: i64,
    vendor_event_id: &str,
) -> Result<Option<EventRow>> {
    let row = sqlx::query(
        "SELECT id, user_id, social_network_id, vendor_event_id, title, start_datetime \
         FROM events WHERE user_id = ? AND social_network_id = ? AND vendor_event_id = ?",
    )
    .bind(user_id)
    .bind(social_network_id)
    .bind(vendor_event_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(event_from_row))
}

/// Upsert a candidate source keyed by (description, notes).
#[instrument(skip_all)]
pub async fn upsert_candidate_source(
    pool: &Pool,
    description: &str,
    notes: &str,
    domain_id: Option<i64>,
) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM candidate_sources WHERE description = ? AND notes = ?",
    )
    .bind(description)
    .bind(notes)
    .fetch_optional(pool)
    .await?
    {
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO candidate_sources (description, notes, domain_id) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(description)
    .bind(notes)
    .bind(domain_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Upsert a candidate keyed by (first_name, last_name, owner_user_id,
/// source_id, source_product_id). A re-import refreshes `added_time` (and the
/// email when the vendor supplies one) on the existing row.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
pub async fn upsert_candidate(
    pool: &Pool,
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
    owner_user_id: i64,
    source_id: i64,
    source_product_id: i64,
    added_time: DateTime<Utc>,
) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM candidates WHERE first_name = ? AND last_name = ? \
         AND owner_user_id = ? AND source_id = ? AND source_product_id = ?",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(owner_user_id)
    .bind(source_id)
    .bind(source_product_id)
    .fetch_optional(pool)
    .await?
    {
        sqlx::query("UPDATE candidates SET added_time = ?, email = COALESCE(?, email) WHERE id = ?")
            .bind(added_time)
            .bind(email)
            .bind(id)
            .execute(pool)
            .await?;
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO candidates (first_name, last_name, email, owner_user_id, source_id, \
         source_product_id, added_time) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(owner_user_id)
    .bind(source_id)
    .bind(source_product_id)
    .bind(added_time)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Upsert an RSVP keyed by (vendor_rsvp_id, candidate_id, social_network_id,
/// event_id). Status and timestamp are overwritten with the vendor's current
/// values.
#[instrument(skip_all)]
pub async fn upsert_rsvp(
    pool: &Pool,
    vendor_rsvp_id: &str,
    candidate_id: i64,
    event_id: i64,
    social_network_id: i64,
    status: &str,
    rsvp_datetime: Option<DateTime<Utc>>,
) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM rsvps WHERE vendor_rsvp_id = ? AND candidate_id = ? \
         AND social_network_id = ? AND event_id = ?",
    )
    .bind(vendor_rsvp_id)
    .bind(candidate_id)
    .bind(social_network_id)
    .bind(event_id)
    .fetch_optional(pool)
    .await?
    {
        sqlx::query("UPDATE rsvps SET status = ?, rsvp_datetime = ? WHERE id = ?")
            .bind(status)
            .bind(rsvp_datetime)
            .bind(id)
            .execute(pool)
            .await?;
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO rsvps (vendor_rsvp_id, candidate_id, event_id, social_network_id, status, \
         rsvp_datetime) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(vendor_rsvp_id)
    .bind(candidate_id)
    .bind(event_id)
    .bind(social_network_id)
    .bind(status)
    .bind(rsvp_datetime)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Upsert the candidate/event/RSVP junction, keyed by all three ids.
#[instrument(skip_all)]
pub async fn upsert_candidate_event_rsvp(
    pool: &Pool,
    candidate_id: i64,
    event_id: i64,
    rsvp_id: i64,
) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM candidate_event_rsvps WHERE candidate_id = ? AND event_id = ? AND rsvp_id = ?",
    )
    .bind(candidate_id)
    .bind(event_id)
    .bind(rsvp_id)
    .fetch_optional(pool)
    .await?
    {
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO candidate_event_rsvps (candidate_id, event_id, rsvp_id) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(candidate_id)
    .bind(event_id)
    .bind(rsvp_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Upsert an activity-feed row keyed by (user_id, params, type, source_id).
/// A re-import refreshes `added_time` instead of inserting a duplicate entry.
#[instrument(skip_all)]
pub async fn upsert_activity(
    pool: &Pool,
    user_id: i64,
    activity_type: i64,
    source_table: &str,
    source_id: i64,
    params: &str,
) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM activities WHERE user_id = ? AND params = ? AND type = ? AND source_id = ?",
    )
    .bind(user_id)
    .bind(params)
    .bind(activity_type)
    .bind(source_id)
    .fetch_optional(pool)
    .await?
    {
        sqlx::query("UPDATE activities SET added_time = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        return Ok(id);
    }

    let rec = sqlx::query(
        "INSERT INTO activities (user_id, type, source_table, source_id, params) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(activity_type)
    .bind(source_table)
    .bind(source_id)
    .bind(params)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}
