use crux_kv::error::KeyValueError;
use serde::{Deserialize, Serialize};

use crate::capabilities::{DriverIdentity, HttpError};
use crate::config::DashboardSettings;
use crate::model::{RideAction, RideId};
use crate::remote::{RemoteRideRow, RemoteStatus};

// --- Event enum: shell events first, then capability responses ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    // Setup
    Configured(DashboardSettings),
    SessionChanged(Option<DriverIdentity>),

    // Lifecycle
    /// The dashboard became visible; runs the initial load exactly once.
    Mounted,
    RefreshRequested,

    // Ride actions
    RideActionRequested { id: RideId, action: RideAction },

    // Toasts
    ToastDismissed,
    Tick { now_ms: u64 },

    // Responses. Only capabilities raise these.
    #[serde(skip)]
    RidesFetched(Result<Vec<RemoteRideRow>, HttpError>),
    #[serde(skip)]
    CacheLoaded(Result<Option<Vec<u8>>, KeyValueError>),
    #[serde(skip)]
    CacheSaved(Result<(), KeyValueError>),
    #[serde(skip)]
    BackfillChecked {
        id: RideId,
        result: Result<bool, HttpError>,
    },
    #[serde(skip)]
    BackfillInserted {
        id: RideId,
        result: Result<(), HttpError>,
    },
    #[serde(skip)]
    BackfillBulkInserted {
        count: usize,
        result: Result<(), HttpError>,
    },
    #[serde(skip)]
    StatusUpdated {
        id: RideId,
        status: RemoteStatus,
        result: Result<(), HttpError>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configured(_) => "configured",
            Self::SessionChanged(_) => "session_changed",
            Self::Mounted => "mounted",
            Self::RefreshRequested => "refresh_requested",
            Self::RideActionRequested { .. } => "ride_action_requested",
            Self::ToastDismissed => "toast_dismissed",
            Self::Tick { .. } => "tick",
            Self::RidesFetched(_) => "rides_fetched",
            Self::CacheLoaded(_) => "cache_loaded",
            Self::CacheSaved(_) => "cache_saved",
            Self::BackfillChecked { .. } => "backfill_checked",
            Self::BackfillInserted { .. } => "backfill_inserted",
            Self::BackfillBulkInserted { .. } => "backfill_bulk_inserted",
            Self::StatusUpdated { .. } => "status_updated",
        }
    }

    pub fn accept(id: impl Into<RideId>) -> Self {
        Self::RideActionRequested {
            id: id.into(),
            action: RideAction::Accept,
        }
    }

    pub fn decline(id: impl Into<RideId>) -> Self {
        Self::RideActionRequested {
            id: id.into(),
            action: RideAction::Decline,
        }
    }

    pub fn complete(id: impl Into<RideId>) -> Self {
        Self::RideActionRequested {
            id: id.into(),
            action: RideAction::Complete,
        }
    }
}
