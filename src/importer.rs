//! Per-credential reconciliation pass: fetch events and RSVPs from a vendor,
//! normalize, and upsert them into the local store.
//!
//! The attendee chain is written as a left-to-right composition of stage
//! functions. Each stage consumes the [`Attendee`], performs one upsert, and
//! returns the value with the produced id attached, so every stage's
//! precondition is an explicit `context` check rather than hidden shared
//! state. There is deliberately no transaction spanning a chain: a failure
//! partway through one attendee leaves the earlier rows committed, and the
//! next run's upserts converge on the same ids.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::db::{self, Pool, UserCredential};
use crate::model::{Attendee, ACTIVITY_RSVP_EVENT, ACTIVITY_SOURCE_RSVP};
use crate::vendor::{RsvpFetch, VendorClient};

/// Knobs for one vendor's import, lifted from config.
#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub social_network_id: i64,
    pub source_product_id: i64,
    pub domain_id: Option<i64>,
    /// Events starting before this instant are not processed for RSVPs.
    pub start_date: DateTime<Utc>,
}

impl ImportSettings {
    pub fn meetup(cfg: &crate::config::Config) -> Self {
        Self {
            social_network_id: cfg.meetup.social_network_id,
            source_product_id: cfg.app.source_product_id,
            domain_id: cfg.app.domain_id,
            start_date: cfg.app.import_start_date,
        }
    }

    pub fn eventbrite(cfg: &crate::config::Config) -> Self {
        Self {
            social_network_id: cfg.eventbrite.social_network_id,
            source_product_id: cfg.app.source_product_id,
            domain_id: cfg.app.domain_id,
            start_date: cfg.app.import_start_date,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
    pub credentials: usize,
    pub credentials_skipped: usize,
    pub events: usize,
    pub rsvps: usize,
}

/// Run one full import pass over every credential stored for the vendor's
/// social network, optionally narrowed to a single platform user. A failing
/// credential never aborts the pass; it is logged and skipped.
#[instrument(skip_all)]
pub async fn run_pass(
    pool: &Pool,
    vendor: &dyn VendorClient,
    settings: &ImportSettings,
    user_filter: Option<i64>,
) -> Result<ImportSummary> {
    let credentials = db::list_credentials(pool, settings.social_network_id, user_filter).await?;
    let mut summary = ImportSummary::default();
    for credential in &credentials {
        match process_credential(pool, vendor, settings, credential).await {
            Ok((events, rsvps)) => {
                summary.credentials += 1;
                summary.events += events;
                summary.rsvps += rsvps;
                info!(
                    user_id = credential.user_id,
                    events, rsvps, "credential pass finished"
                );
            }
            Err(err) => {
                summary.credentials_skipped += 1;
                warn!(
                    user_id = credential.user_id,
                    member_id = %credential.member_id,
                    ?err,
                    "skipping credential"
                );
            }
        }
    }
    Ok(summary)
}

async fn process_credential(
    pool: &Pool,
    vendor: &dyn VendorClient,
    settings: &ImportSettings,
    credential: &UserCredential,
) -> Result<(usize, usize)> {
    let ctx = vendor.ensure_fresh_token(pool, credential).await?;

    let fetched = vendor.fetch_events(&ctx, settings.start_date).await?;
    let mut events_stored = 0usize;
    for event in &fetched {
        match db::upsert_event(pool, event).await {
            Ok(_) => events_stored += 1,
            Err(err) => warn!(
                vendor_event_id = %event.vendor_event_id,
                ?err,
                "failed to store event"
            ),
        }
    }

    let mut rsvps_imported = 0usize;
    let events = db::events_since(pool, ctx.user_id, ctx.social_network_id, settings.start_date).await?;
    for event in &events {
        let fetch = match vendor.fetch_rsvps(&ctx, event).await {
            Ok(fetch) => fetch,
            Err(err) => {
                warn!(
                    event_id = event.id,
                    vendor_event_id = %event.vendor_event_id,
                    ?err,
                    "rsvp fetch failed; continuing with next event"
                );
                continue;
            }
        };
        let rsvps = match fetch {
            RsvpFetch::Rsvps(rsvps) => rsvps,
            RsvpFetch::Unauthorized => {
                // Token revoked mid-run. Remaining events for this credential
                // are dropped; the next credential still runs.
                warn!(
                    user_id = ctx.user_id,
                    member_id = %ctx.member_id,
                    event_id = event.id,
                    "vendor revoked authorization; dropping remaining events for this credential"
                );
                break;
            }
        };

        for rsvp in &rsvps {
            let attendee = match vendor.fetch_attendee(&ctx, event, rsvp).await {
                Ok(attendee) => attendee,
                Err(err) => {
                    warn!(
                        vendor_rsvp_id = %rsvp.vendor_rsvp_id,
                        member_id = %rsvp.member_id,
                        ?err,
                        "attendee fetch failed; skipping rsvp"
                    );
                    continue;
                }
            };
            match process_attendee(pool, settings, attendee).await {
                Ok(_) => rsvps_imported += 1,
                Err(err) => warn!(
                    vendor_rsvp_id = %rsvp.vendor_rsvp_id,
                    event_id = event.id,
                    ?err,
                    "attendee pipeline failed"
                ),
            }
        }
    }

    Ok((events_stored, rsvps_imported))
}

/// The five-stage upsert chain for one RSVP. Also used by the webhook for
/// push-delivered orders.
pub async fn process_attendee(
    pool: &Pool,
    settings: &ImportSettings,
    attendee: Attendee,
) -> Result<Attendee> {
    let attendee = save_attendee_source(pool, settings, attendee).await?;
    let attendee = save_attendee_as_candidate(pool, attendee).await?;
    let attendee = save_rsvp(pool, attendee).await?;
    let attendee = save_candidate_event_rsvp(pool, attendee).await?;
    save_rsvp_activity(pool, attendee).await
}

async fn save_attendee_source(
    pool: &Pool,
    settings: &ImportSettings,
    mut attendee: Attendee,
) -> Result<Attendee> {
    let description = format!("Came from event '{}'", attendee.event_title);
    let id = db::upsert_candidate_source(pool, &description, "", settings.domain_id).await?;
    attendee.candidate_source_id = Some(id);
    attendee.source_product_id = Some(settings.source_product_id);
    Ok(attendee)
}

async fn save_attendee_as_candidate(pool: &Pool, mut attendee: Attendee) -> Result<Attendee> {
    let source_id = attendee
        .candidate_source_id
        .context("candidate source stage must run first")?;
    let source_product_id = attendee
        .source_product_id
        .context("source product id not attached")?;
    let added_time = attendee.rsvp_datetime.unwrap_or_else(Utc::now);
    let id = db::upsert_candidate(
        pool,
        &attendee.first_name,
        &attendee.last_name,
        attendee.email.as_deref(),
        attendee.user_id,
        source_id,
        source_product_id,
        added_time,
    )
    .await?;
    attendee.candidate_id = Some(id);
    Ok(attendee)
}

async fn save_rsvp(pool: &Pool, mut attendee: Attendee) -> Result<Attendee> {
    let candidate_id = attendee
        .candidate_id
        .context("candidate stage must run first")?;
    let id = db::upsert_rsvp(
        pool,
        &attendee.vendor_rsvp_id,
        candidate_id,
        attendee.event_id,
        attendee.social_network_id,
        attendee.rsvp_status.as_str(),
        attendee.rsvp_datetime,
    )
    .await?;
    attendee.rsvp_id = Some(id);
    Ok(attendee)
}

async fn save_candidate_event_rsvp(pool: &Pool, mut attendee: Attendee) -> Result<Attendee> {
    let candidate_id = attendee
        .candidate_id
        .context("candidate stage must run first")?;
    let rsvp_id = attendee.rsvp_id.context("rsvp stage must run first")?;
    let id = db::upsert_candidate_event_rsvp(pool, candidate_id, attendee.event_id, rsvp_id).await?;
    attendee.candidate_event_rsvp_id = Some(id);
    Ok(attendee)
}

async fn save_rsvp_activity(pool: &Pool, attendee: Attendee) -> Result<Attendee> {
    let rsvp_id = attendee.rsvp_id.context("rsvp stage must run first")?;
    let params = serde_json::json!({
        "firstName": attendee.first_name,
        "lastName": attendee.last_name,
        "response": attendee.rsvp_status.as_str(),
        "eventTitle": attendee.event_title,
        "img": attendee.picture_url.clone().unwrap_or_default(),
    });
    db::upsert_activity(
        pool,
        attendee.user_id,
        ACTIVITY_RSVP_EVENT,
        ACTIVITY_SOURCE_RSVP,
        rsvp_id,
        &params.to_string(),
    )
    .await?;
    Ok(attendee)
}
