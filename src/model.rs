use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity-feed type code for "candidate RSVP'd to an event".
pub const ACTIVITY_RSVP_EVENT: i64 = 23;

/// Source table recorded on RSVP activity rows.
pub const ACTIVITY_SOURCE_RSVP: &str = "rsvp";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RsvpStatus {
    Yes,
    No,
    Waitlist,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Yes => "yes",
            RsvpStatus::No => "no",
            RsvpStatus::Waitlist => "waitlist",
        }
    }

    pub fn parse_status(s: &str) -> Option<RsvpStatus> {
        match s {
            "yes" => Some(RsvpStatus::Yes),
            "no" => Some(RsvpStatus::No),
            "waitlist" => Some(RsvpStatus::Waitlist),
            _ => None,
        }
    }
}

/// Transient record accumulating one RSVP's data as it moves through the
/// import pipeline. Each persistence stage consumes an `Attendee` and returns
/// it with one more id attached; nothing here is written to the database
/// directly.
#[derive(Debug, Clone)]
pub struct Attendee {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: Option<String>,
    /// Vendor profile photo, used for the activity-feed badge.
    pub picture_url: Option<String>,
    pub rsvp_status: RsvpStatus,
    pub vendor_rsvp_id: String,
    pub rsvp_datetime: Option<DateTime<Utc>>,

    // Back-reference to the locally stored event this RSVP belongs to.
    pub event_id: i64,
    pub event_title: String,
    pub user_id: i64,
    pub social_network_id: i64,

    // Ids accumulated by the pipeline stages, in order.
    pub source_product_id: Option<i64>,
    pub candidate_source_id: Option<i64>,
    pub candidate_id: Option<i64>,
    pub rsvp_id: Option<i64>,
    pub candidate_event_rsvp_id: Option<i64>,
}

impl Attendee {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        full_name: &str,
        email: Option<String>,
        picture_url: Option<String>,
        rsvp_status: RsvpStatus,
        vendor_rsvp_id: String,
        rsvp_datetime: Option<DateTime<Utc>>,
        event_id: i64,
        event_title: String,
        user_id: i64,
        social_network_id: i64,
    ) -> Self {
        let (first_name, last_name) = split_full_name(full_name);
        Self {
            first_name,
            last_name,
            full_name: full_name.trim().to_string(),
            email,
            picture_url,
            rsvp_status,
            vendor_rsvp_id,
            rsvp_datetime,
            event_id,
            event_title,
            user_id,
            social_network_id,
            source_product_id: None,
            candidate_source_id: None,
            candidate_id: None,
            rsvp_id: None,
            candidate_event_rsvp_id: None,
        }
    }
}

/// Split a vendor-supplied full name into (first, last). The first
/// whitespace-separated token is the first name; everything after it is the
/// last name, which may be empty.
pub fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or("").to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsvp_status_round_trip() {
        for s in [RsvpStatus::Yes, RsvpStatus::No, RsvpStatus::Waitlist] {
            assert_eq!(RsvpStatus::parse_status(s.as_str()), Some(s));
        }
        assert_eq!(RsvpStatus::parse_status("maybe"), None);
    }

    #[test]
    fn full_name_splitting() {
        assert_eq!(split_full_name("Kamran A"), ("Kamran".into(), "A".into()));
        assert_eq!(
            split_full_name("Ann Mary Lee"),
            ("Ann".into(), "Mary Lee".into())
        );
        assert_eq!(split_full_name("  Prince "), ("Prince".into(), "".into()));
        assert_eq!(split_full_name(""), ("".into(), "".into()));
    }
}
