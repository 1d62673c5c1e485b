use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::capabilities::DriverIdentity;
use crate::config::BackfillMode;
use crate::remote::{NewRemoteRide, RideTable};
use crate::{DEFAULT_DISABILITY_TYPE, DEFAULT_STUDENT_EMAIL, DEFAULT_STUDENT_NAME, TOAST_DURATION_MS};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(RideId);
typed_id!(UserId);

impl RideId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// `10/19/2026`
pub fn format_display_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format("%-m/%-d/%Y").to_string()
}

/// `2:05:09 PM`
pub fn format_display_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    at.format("%-I:%M:%S %p").to_string()
}

// --- Status ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    #[default]
    Pending,
    Accepted,
    Completed,
    Declined,
}

impl RideStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Accepted, Self::Completed, Self::Declined];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Declined => "declined",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Completed => "Completed",
            Self::Declined => "Declined",
        }
    }

    /// Exact match against the closed set; anything else is `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Clamp arbitrary input into the closed set, falling back to `Pending`.
    #[must_use]
    pub fn normalize(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    /// Actions the dashboard offers for a ride in this status.
    #[must_use]
    pub const fn available_actions(self) -> &'static [RideAction] {
        match self {
            Self::Pending => &[RideAction::Accept, RideAction::Decline],
            Self::Accepted => &[RideAction::Complete],
            Self::Completed | Self::Declined => &[],
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideAction {
    Accept,
    Decline,
    Complete,
}

impl RideAction {
    #[must_use]
    pub const fn target_status(self) -> RideStatus {
        match self {
            Self::Accept => RideStatus::Accepted,
            Self::Decline => RideStatus::Declined,
            Self::Complete => RideStatus::Completed,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Complete => "complete",
        }
    }

    #[must_use]
    pub const fn confirmation(self) -> &'static str {
        match self {
            Self::Accept => "Ride request accepted",
            Self::Decline => "Ride request declined",
            Self::Complete => "Ride marked as completed",
        }
    }
}

impl fmt::Display for RideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Ride request (local / display shape) ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub id: RideId,
    pub student_name: String,
    pub student_email: String,
    pub pickup_location: String,
    pub destination: String,
    pub date: String,
    pub time: String,
    pub status: RideStatus,
    pub disability_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

impl RideRequest {
    /// A copy of this ride carrying `status`; `self` is left untouched.
    #[must_use]
    pub fn with_status(&self, status: RideStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Builds a display ride from one loosely-typed cached entry, filling the
    /// documented defaults. Returns `None` when the entry is not a JSON object.
    #[must_use]
    pub fn normalize(entry: &Value, now: &DateTime<Local>) -> Option<Self> {
        let obj = entry.as_object()?;

        let id = Self::stored_id(entry).unwrap_or_else(RideId::generate);

        Some(Self {
            id,
            student_name: text_field(obj, "studentName")
                .unwrap_or_else(|| DEFAULT_STUDENT_NAME.to_string()),
            student_email: text_field(obj, "studentEmail")
                .unwrap_or_else(|| DEFAULT_STUDENT_EMAIL.to_string()),
            pickup_location: text_field(obj, "pickupLocation").unwrap_or_default(),
            destination: text_field(obj, "destination").unwrap_or_default(),
            date: text_field(obj, "date").unwrap_or_else(|| format_display_date(now)),
            time: text_field(obj, "time").unwrap_or_else(|| format_display_time(now)),
            status: RideStatus::normalize(obj.get("status").and_then(Value::as_str)),
            disability_type: text_field(obj, "disabilityType")
                .unwrap_or_else(|| DEFAULT_DISABILITY_TYPE.to_string()),
            additional_notes: text_field(obj, "additionalNotes"),
        })
    }

    /// The id a cached entry already carries. `normalize` invents one when
    /// this is `None`.
    #[must_use]
    pub fn stored_id(entry: &Value) -> Option<RideId> {
        text_field(entry.as_object()?, "id").map(RideId)
    }
}

/// Empty strings and nulls count as absent; scalars are rendered as text.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Applies `status` to the ride with `id`, producing a new list. Every other
/// entry is carried over unchanged.
#[must_use]
pub fn apply_status(rides: &[RideRequest], id: &RideId, status: RideStatus) -> Vec<RideRequest> {
    rides
        .iter()
        .map(|ride| {
            if &ride.id == id {
                ride.with_status(status)
            } else {
                ride.clone()
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RideStats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
}

impl RideStats {
    #[must_use]
    pub fn from_rides(rides: &[RideRequest]) -> Self {
        Self {
            total: rides.len(),
            pending: rides.iter().filter(|r| r.status == RideStatus::Pending).count(),
            completed: rides.iter().filter(|r| r.status == RideStatus::Completed).count(),
        }
    }
}

// --- Toasts ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            created_at_ms: get_current_time_ms(),
            duration_ms: TOAST_DURATION_MS,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

// --- Backfill ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Rides written remotely. In bulk mode this counts every row sent,
    /// since the store skips ids it already has without saying which.
    pub inserted: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// A check-then-insert pass in flight: one row at a time, in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillProgress {
    pub rows: Vec<NewRemoteRide>,
    pub next: usize,
    pub report: BackfillReport,
}

impl BackfillProgress {
    #[must_use]
    pub fn new(rows: Vec<NewRemoteRide>) -> Self {
        Self {
            rows,
            next: 0,
            report: BackfillReport::default(),
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&NewRemoteRide> {
        self.rows.get(self.next)
    }

    pub fn advance(&mut self) {
        self.next += 1;
    }
}

// --- App state ---

/// Where the currently displayed list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    LocalCache,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub rides: Vec<RideRequest>,
    pub data_source: Option<DataSource>,
    pub is_loading: bool,
    pub has_loaded: bool,
    pub active_toast: Option<ToastMessage>,
    pub backfill_mode: BackfillMode,
    /// Unset until the shell sends `Event::Configured`; loads then go
    /// straight to the device cache.
    pub table: Option<RideTable>,
    pub driver: Option<DriverIdentity>,
    pub backfill: Option<BackfillProgress>,
    pub last_backfill: Option<BackfillReport>,
}

impl Model {
    pub fn show_toast(&mut self, message: impl Into<String>) {
        self.active_toast = Some(ToastMessage::new(message));
    }

    pub fn clear_toast(&mut self) {
        self.active_toast = None;
    }

    #[must_use]
    pub fn stats(&self) -> RideStats {
        RideStats::from_rides(&self.rides)
    }

    #[must_use]
    pub fn find_ride(&self, id: &RideId) -> Option<&RideRequest> {
        self.rides.iter().find(|r| &r.id == id)
    }
}
