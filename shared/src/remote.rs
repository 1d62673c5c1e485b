//! Remote `ride_requests` row shape and the conversions between it and the
//! local display shape.
//!
//! The two shapes are deliberately lossy in both directions:
//! - local → remote drops `disabilityType` and `additionalNotes`;
//! - remote → local fabricates the student's name and email from
//!   `student_id` and fills a constant disability text.
//!
//! `declined` is called `rejected` remotely. Reading a `rejected` row back
//! does not produce `declined`; it is clamped like any other value outside the
//! local status set.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::capabilities::{validate_base_url, HttpError};
use crate::model::{
    format_display_date, format_display_time, RideId, RideRequest, RideStatus, UserId,
};
use crate::{DEFAULT_DISABILITY_TYPE, DEFAULT_STUDENT_NAME, PLACEHOLDER_EMAIL_DOMAIN};

/// Length of the `student_id` prefix used in fabricated display names.
const SHORT_ID_LEN: usize = 8;

const REST_PATH: &str = "rest/v1/";
pub const PREFER_MINIMAL: &str = "return=minimal";
pub const PREFER_IGNORE_DUPLICATES: &str = "resolution=ignore-duplicates,return=minimal";

/// PostgREST addresses for the ride table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideTable {
    url: Url,
}

impl RideTable {
    pub fn new(base_url: &str, table: &str) -> Result<Self, HttpError> {
        let url = validate_base_url(base_url)?
            .join(REST_PATH)
            .and_then(|rest| rest.join(table))
            .map_err(|e| HttpError::InvalidUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn with_query(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.url.clone();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        url
    }

    #[must_use]
    pub fn select_all_url(&self) -> Url {
        self.with_query(&[("select", "*")])
    }

    #[must_use]
    pub fn exists_url(&self, id: &RideId) -> Url {
        let filter = format!("eq.{id}");
        self.with_query(&[("select", "id"), ("id", filter.as_str()), ("limit", "1")])
    }

    #[must_use]
    pub fn insert_url(&self) -> Url {
        self.url.clone()
    }

    /// Targets the single row with `id`, for updates.
    #[must_use]
    pub fn row_url(&self, id: &RideId) -> Url {
        let filter = format!("eq.{id}");
        self.with_query(&[("id", filter.as_str())])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Accepted,
    Completed,
    Rejected,
}

impl RemoteStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RideStatus> for RemoteStatus {
    fn from(status: RideStatus) -> Self {
        match status {
            RideStatus::Pending => Self::Pending,
            RideStatus::Accepted => Self::Accepted,
            RideStatus::Completed => Self::Completed,
            RideStatus::Declined => Self::Rejected,
        }
    }
}

/// One row of the remote table as returned by select.
///
/// `status` stays a plain string: the read path clamps it rather than
/// failing the whole result set on an unexpected value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRideRow {
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub pickup_location: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a ride that exists locally but not remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRemoteRide {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub pickup_location: String,
    pub destination: String,
    pub status: RemoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Update-by-id payload sent when the driver acts on a ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideStatusPatch {
    pub status: RemoteStatus,
    pub driver_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RideStatusPatch {
    #[must_use]
    pub fn new(status: RideStatus, driver_id: Option<&UserId>, at: DateTime<Utc>) -> Self {
        Self {
            status: status.into(),
            driver_id: driver_id.map(|id| id.as_str().to_string()),
            updated_at: at,
        }
    }
}

/// Remote row → display ride. Total: every row produces a ride.
#[must_use]
pub fn ride_from_remote(row: &RemoteRideRow, now: DateTime<Utc>) -> RideRequest {
    let created = row.created_at.unwrap_or(now).with_timezone(&Local);

    let (student_name, student_email) = match row.student_id.as_deref().filter(|s| !s.is_empty())
    {
        Some(student_id) => {
            let short: String = student_id.chars().take(SHORT_ID_LEN).collect();
            (
                format!("Student {short}"),
                format!("{student_id}@{PLACEHOLDER_EMAIL_DOMAIN}"),
            )
        }
        None => (
            DEFAULT_STUDENT_NAME.to_string(),
            crate::DEFAULT_STUDENT_EMAIL.to_string(),
        ),
    };

    RideRequest {
        id: RideId::new(row.id.clone()),
        student_name,
        student_email,
        pickup_location: row.pickup_location.clone().unwrap_or_default(),
        destination: row.destination.clone().unwrap_or_default(),
        date: format_display_date(&created),
        time: format_display_time(&created),
        status: RideStatus::normalize(row.status.as_deref()),
        disability_type: DEFAULT_DISABILITY_TYPE.to_string(),
        additional_notes: None,
    }
}

/// Display ride → insert payload. Total: every ride produces a row.
///
/// The local shape carries no student identifier, so the row is stamped with
/// the account that owns this device's cache, when there is one.
#[must_use]
pub fn remote_from_ride(
    ride: &RideRequest,
    owner: Option<&UserId>,
    now: DateTime<Utc>,
) -> NewRemoteRide {
    NewRemoteRide {
        id: ride.id.as_str().to_string(),
        student_id: owner.map(|id| id.as_str().to_string()),
        pickup_location: ride.pickup_location.clone(),
        destination: ride.destination.clone(),
        status: ride.status.into(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 15, 30, 0).unwrap()
    }

    fn row(status: &str) -> RemoteRideRow {
        RemoteRideRow {
            id: "9b2f".into(),
            student_id: Some("1234567890abcdef".into()),
            driver_id: None,
            pickup_location: Some("North Gate".into()),
            destination: Some("Hospital".into()),
            status: Some(status.into()),
            created_at: Some(at()),
            updated_at: Some(at()),
        }
    }

    fn local(status: RideStatus) -> RideRequest {
        RideRequest {
            id: RideId::new("abc"),
            student_name: "Ada".into(),
            student_email: "ada@uni.edu".into(),
            pickup_location: "Library".into(),
            destination: "Clinic".into(),
            date: "1/1/2024".into(),
            time: "9:00:00 AM".into(),
            status,
            disability_type: "Wheelchair".into(),
            additional_notes: Some("Ramp needed".into()),
        }
    }

    fn table() -> RideTable {
        RideTable::new("https://demo.supabase.co", "ride_requests").unwrap()
    }

    #[test]
    fn test_table_urls() {
        assert_eq!(
            table().url().as_str(),
            "https://demo.supabase.co/rest/v1/ride_requests"
        );
        let proxied = RideTable::new("http://localhost:54321/api", "ride_requests").unwrap();
        assert_eq!(
            proxied.url().as_str(),
            "http://localhost:54321/api/rest/v1/ride_requests"
        );
        assert!(RideTable::new("ftp://demo", "ride_requests").is_err());
    }

    #[test]
    fn test_query_shapes() {
        let table = table();
        assert_eq!(table.select_all_url().query(), Some("select=*"));
        assert_eq!(
            table.exists_url(&RideId::new("r 1")).query(),
            Some("select=id&id=eq.r+1&limit=1")
        );
        assert_eq!(table.insert_url().query(), None);
        assert_eq!(table.row_url(&RideId::new("r1")).query(), Some("id=eq.r1"));
    }

    #[test]
    fn test_declined_maps_to_rejected() {
        assert_eq!(RemoteStatus::from(RideStatus::Declined), RemoteStatus::Rejected);
        assert_eq!(RemoteStatus::from(RideStatus::Accepted), RemoteStatus::Accepted);
        assert_eq!(
            serde_json::to_value(RemoteStatus::from(RideStatus::Declined)).unwrap(),
            "rejected"
        );
    }

    #[test]
    fn test_rejected_never_reads_back_as_declined() {
        let ride = ride_from_remote(&row("rejected"), at());
        assert_ne!(ride.status, RideStatus::Declined);
        assert_eq!(ride.status, RideStatus::Pending);
    }

    #[test]
    fn test_remote_row_fabricates_student_details() {
        let ride = ride_from_remote(&row("accepted"), at());

        assert_eq!(ride.id.as_str(), "9b2f");
        assert_eq!(ride.student_name, "Student 12345678");
        assert_eq!(ride.student_email, "1234567890abcdef@student.email");
        assert_eq!(ride.pickup_location, "North Gate");
        assert_eq!(ride.status, RideStatus::Accepted);
        assert_eq!(ride.disability_type, "Not specified");
        assert_eq!(ride.additional_notes, None);

        let local_created = at().with_timezone(&Local);
        assert_eq!(ride.date, format_display_date(&local_created));
        assert_eq!(ride.time, format_display_time(&local_created));
    }

    #[test]
    fn test_remote_row_without_student_uses_defaults() {
        let mut r = row("pending");
        r.student_id = None;
        r.pickup_location = None;
        let ride = ride_from_remote(&r, at());

        assert_eq!(ride.student_name, "Unknown");
        assert_eq!(ride.student_email, "unknown@email.com");
        assert_eq!(ride.pickup_location, "");
    }

    #[test]
    fn test_local_ride_drops_disability_and_notes() {
        let owner = UserId::new("driver-1");
        let remote = remote_from_ride(&local(RideStatus::Declined), Some(&owner), at());

        assert_eq!(remote.id, "abc");
        assert_eq!(remote.student_id.as_deref(), Some("driver-1"));
        assert_eq!(remote.status, RemoteStatus::Rejected);
        assert_eq!(remote.created_at, at());

        let json = serde_json::to_value(&remote).unwrap();
        assert!(json.get("disabilityType").is_none());
        assert!(json.get("disability_type").is_none());
        assert!(json.get("additional_notes").is_none());
        assert_eq!(json["status"], "rejected");
    }

    #[test]
    fn test_insert_payload_omits_missing_student() {
        let remote = remote_from_ride(&local(RideStatus::Pending), None, at());
        let json = serde_json::to_value(&remote).unwrap();
        assert!(json.get("student_id").is_none());
    }

    #[test]
    fn test_status_patch_shape() {
        let driver = UserId::new("drv-7");
        let patch = RideStatusPatch::new(RideStatus::Declined, Some(&driver), at());
        let json = serde_json::to_value(&patch).unwrap();

        assert_eq!(json["status"], "rejected");
        assert_eq!(json["driver_id"], "drv-7");
        assert_eq!(json["updated_at"], "2024-05-20T15:30:00Z");
    }

    #[test]
    fn test_row_deserializes_with_nulls() {
        let json = r#"{"id":"1","student_id":null,"driver_id":null,"pickup_location":"A",
            "destination":"B","status":"completed","created_at":"2024-05-20T15:30:00+00:00",
            "updated_at":null}"#;
        let row: RemoteRideRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.status.as_deref(), Some("completed"));
        assert_eq!(row.created_at, Some(at()));
        assert_eq!(row.updated_at, None);
    }
}
