//! Dashboard core: turns shell events into model changes and capability
//! requests, and projects the model into what the shell draws.
//!
//! Loading prefers the remote table. When it is unreachable or empty the
//! device cache is shown instead and every cached ride is written back to the
//! remote table on a best-effort basis. Ride actions update the list
//! optimistically; a failed remote write is logged and never rolled back.

use chrono::{Local, Utc};
use crux_http::Response;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{Capabilities, HttpError};
use crate::config::{BackfillMode, DashboardSettings};
use crate::event::Event;
use crate::model::{
    apply_status, BackfillProgress, BackfillReport, DataSource, Model, RideAction, RideId,
    RideRequest, RideStatus,
};
use crate::offline_store::{self, CachedRides};
use crate::remote::{
    remote_from_ride, ride_from_remote, NewRemoteRide, RemoteRideRow, RideStatusPatch, RideTable,
    PREFER_IGNORE_DUPLICATES, PREFER_MINIMAL,
};
use crate::AppError;

// --- View model ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ViewModel {
    pub driver: Option<DriverHeader>,
    pub rides: Vec<RideCard>,
    pub total_count: usize,
    pub pending_count: usize,
    pub completed_count: usize,
    pub is_loading: bool,
    /// Cached rides are still being written to the remote table.
    pub is_syncing: bool,
    pub data_source: Option<DataSource>,
    pub toast: Option<ToastView>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DriverHeader {
    pub display_name: String,
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RideCard {
    pub id: RideId,
    pub student_name: String,
    pub student_email: String,
    pub pickup_location: String,
    pub destination: String,
    pub date: String,
    pub time: String,
    pub status: RideStatus,
    pub status_label: String,
    pub disability_type: String,
    pub additional_notes: Option<String>,
    pub actions: Vec<RideAction>,
}

impl From<&RideRequest> for RideCard {
    fn from(ride: &RideRequest) -> Self {
        Self {
            id: ride.id.clone(),
            student_name: ride.student_name.clone(),
            student_email: ride.student_email.clone(),
            pickup_location: ride.pickup_location.clone(),
            destination: ride.destination.clone(),
            date: ride.date.clone(),
            time: ride.time.clone(),
            status: ride.status,
            status_label: ride.status.label().to_string(),
            disability_type: ride.disability_type.clone(),
            additional_notes: ride.additional_notes.clone(),
            actions: ride.status.available_actions().to_vec(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ToastView {
    pub message: String,
}

fn log_http_failure(e: HttpError, what: &'static str) {
    let err = AppError::from(e);
    warn!(code = err.code(), error = %err, "{what}");
}

// --- App ---

#[derive(Default, Debug, Clone, Copy)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(event = event.name(), "event_received");

        match event {
            Event::Configured(settings) => Self::configure(settings, model),
            Event::SessionChanged(driver) => {
                model.driver = driver;
                caps.render.render();
            }
            Event::Mounted => {
                if model.has_loaded {
                    debug!("initial_load_already_done");
                    return;
                }
                Self::start_load(model, caps);
            }
            Event::RefreshRequested => Self::start_load(model, caps),
            Event::RideActionRequested { id, action } => {
                Self::handle_action(&id, action, model, caps);
            }
            Event::ToastDismissed => {
                if model.active_toast.take().is_some() {
                    caps.render.render();
                }
            }
            Event::Tick { now_ms } => {
                let expired = model
                    .active_toast
                    .as_ref()
                    .is_some_and(|toast| toast.is_expired(now_ms));
                if expired {
                    model.clear_toast();
                    caps.render.render();
                }
            }

            Event::RidesFetched(result) => Self::rides_fetched(result, model, caps),
            Event::CacheLoaded(result) => {
                let now = Utc::now().with_timezone(&Local);
                let cached = result
                    .map_err(offline_store::StoreError::from)
                    .and_then(|bytes| offline_store::decode_rides(bytes.as_deref(), &now));
                Self::cache_loaded(cached, model, caps);
            }
            Event::CacheSaved(result) => match result {
                Ok(()) => debug!("local_cache_saved"),
                Err(e) => {
                    let err = AppError::from(e);
                    warn!(code = err.code(), error = %err, "local_cache_write_failed");
                }
            },
            Event::BackfillChecked { id, result } => {
                Self::backfill_checked(&id, result, model, caps);
            }
            Event::BackfillInserted { id, result } => {
                Self::backfill_inserted(&id, result, model, caps);
            }
            Event::BackfillBulkInserted { count, result } => {
                let mut report = BackfillReport::default();
                match result {
                    Ok(()) => report.inserted = count,
                    Err(e) => {
                        report.failed = count;
                        log_http_failure(e, "remote_bulk_insert_failed");
                    }
                }
                Self::finish_backfill(report, model, caps);
            }
            Event::StatusUpdated { id, status, result } => match result {
                Ok(()) => info!(ride_id = %id, status = %status, "remote_status_updated"),
                Err(e) => log_http_failure(e, "remote_status_update_failed"),
            },
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let stats = model.stats();
        ViewModel {
            driver: model.driver.as_ref().map(|driver| DriverHeader {
                display_name: driver.display_name(),
                email: driver.email.clone(),
            }),
            rides: model.rides.iter().map(RideCard::from).collect(),
            total_count: stats.total,
            pending_count: stats.pending,
            completed_count: stats.completed,
            is_loading: model.is_loading,
            is_syncing: model.backfill.is_some(),
            data_source: model.data_source,
            toast: model.active_toast.as_ref().map(|toast| ToastView {
                message: toast.message.clone(),
            }),
        }
    }
}

impl App {
    #[instrument(skip_all, fields(table = %settings.table, mode = %settings.backfill_mode))]
    fn configure(settings: DashboardSettings, model: &mut Model) {
        model.backfill_mode = settings.backfill_mode;
        model.table = match RideTable::new(&settings.base_url, &settings.table) {
            Ok(table) => Some(table),
            Err(e) => {
                let err = AppError::from(e);
                warn!(code = err.code(), error = %err, "remote_table_unusable");
                None
            }
        };
    }

    // --- Load ---

    fn start_load(model: &mut Model, caps: &Capabilities) {
        if model.is_loading {
            debug!("load_already_running");
            return;
        }
        model.is_loading = true;
        caps.render.render();

        match &model.table {
            Some(table) => {
                caps.http
                    .get(table.select_all_url())
                    .expect_json::<Vec<RemoteRideRow>>()
                    .send(|result| {
                        Event::RidesFetched(
                            result
                                .map(|mut response: Response<Vec<RemoteRideRow>>| {
                                    response.take_body().unwrap_or_default()
                                })
                                .map_err(|e| HttpError::from_crux("select_all", e)),
                        )
                    });
            }
            None => {
                warn!("remote_table_not_configured");
                offline_store::request_load(&caps.key_value);
            }
        }
    }

    fn rides_fetched(
        result: Result<Vec<RemoteRideRow>, HttpError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match result {
            Ok(rows) if !rows.is_empty() => {
                info!(count = rows.len(), "rides_loaded_from_remote");
                let now = Utc::now();
                model.rides = rows.iter().map(|row| ride_from_remote(row, now)).collect();
                Self::finish_load(DataSource::Remote, model, caps);
                return;
            }
            Ok(_) => info!("remote_store_empty"),
            Err(e) => log_http_failure(e, "remote_select_failed"),
        }
        offline_store::request_load(&caps.key_value);
    }

    fn cache_loaded(
        cached: Result<CachedRides, offline_store::StoreError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let rides = match cached {
            Ok(cached) => {
                if cached.needs_write_back() {
                    info!(generated_ids = cached.generated_ids, "local_cache_ids_persisted");
                    if let Err(e) = offline_store::save(&caps.key_value, &cached.rides) {
                        let err = AppError::from(e);
                        warn!(code = err.code(), error = %err, "local_cache_write_failed");
                    }
                }
                cached.rides
            }
            Err(e) => {
                let err = AppError::from(e);
                warn!(code = err.code(), error = %err, "local_cache_read_failed");
                Vec::new()
            }
        };
        info!(count = rides.len(), "rides_loaded_from_cache");

        model.rides = rides;
        Self::finish_load(DataSource::LocalCache, model, caps);
        Self::start_backfill(model, caps);
    }

    fn finish_load(source: DataSource, model: &mut Model, caps: &Capabilities) {
        model.data_source = Some(source);
        model.is_loading = false;
        model.has_loaded = true;
        caps.render.render();
    }

    // --- Backfill ---

    /// Writes cached rides the remote table does not know about yet.
    #[instrument(skip_all, fields(mode = %model.backfill_mode, count = model.rides.len()))]
    fn start_backfill(model: &mut Model, caps: &Capabilities) {
        if model.rides.is_empty() {
            Self::finish_backfill(BackfillReport::default(), model, caps);
            return;
        }
        let Some(table) = &model.table else {
            let report = BackfillReport {
                failed: model.rides.len(),
                ..BackfillReport::default()
            };
            Self::finish_backfill(report, model, caps);
            return;
        };

        let owner = model.driver.as_ref().map(|driver| driver.id.clone());
        let now = Utc::now();
        let rows: Vec<NewRemoteRide> = model
            .rides
            .iter()
            .map(|ride| remote_from_ride(ride, owner.as_ref(), now))
            .collect();

        match model.backfill_mode {
            BackfillMode::BulkUpsert => {
                let count = rows.len();
                let request = caps
                    .http
                    .post(table.insert_url())
                    .header("Prefer", PREFER_IGNORE_DUPLICATES)
                    .body_json(&rows);
                match request {
                    Ok(request) => request.send(move |result| Event::BackfillBulkInserted {
                        count,
                        result: result
                            .map(drop)
                            .map_err(|e| HttpError::from_crux("insert_missing", e)),
                    }),
                    Err(e) => {
                        log_http_failure(HttpError::from_crux("insert_missing", e), "remote_bulk_insert_failed");
                        let report = BackfillReport {
                            failed: count,
                            ..BackfillReport::default()
                        };
                        Self::finish_backfill(report, model, caps);
                    }
                }
            }
            BackfillMode::CheckThenInsert => {
                // One round-trip pair per ride, in order. Another client can
                // insert between the check and the insert.
                model.backfill = Some(BackfillProgress::new(rows));
                caps.render.render();
                Self::check_next(model, caps);
            }
        }
    }

    fn check_next(model: &mut Model, caps: &Capabilities) {
        let (Some(progress), Some(table)) = (&model.backfill, &model.table) else {
            return;
        };
        let Some(row) = progress.current() else {
            let report = progress.report;
            model.backfill = None;
            Self::finish_backfill(report, model, caps);
            return;
        };

        let id = RideId::new(row.id.clone());
        caps.http
            .get(table.exists_url(&id))
            .expect_json::<Vec<IgnoredAny>>()
            .send(move |result| Event::BackfillChecked {
                id,
                result: result
                    .map(|mut response: Response<Vec<IgnoredAny>>| {
                        response.take_body().is_some_and(|rows| !rows.is_empty())
                    })
                    .map_err(|e| HttpError::from_crux("exists", e)),
            });
    }

    fn backfill_checked(
        id: &RideId,
        result: Result<bool, HttpError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let Some(row) = Self::current_row(id, model) else {
            return;
        };

        match result {
            Ok(true) => {
                debug!(ride_id = %id, "ride_already_remote");
                Self::record_and_continue(model, caps, |report| report.already_present += 1);
            }
            Ok(false) => Self::insert_row(id, &row, model, caps),
            Err(e) => {
                let err = AppError::from(e);
                warn!(ride_id = %id, code = err.code(), error = %err, "remote_exists_check_failed");
                Self::record_and_continue(model, caps, |report| report.failed += 1);
            }
        }
    }

    fn insert_row(id: &RideId, row: &NewRemoteRide, model: &mut Model, caps: &Capabilities) {
        let Some(table) = &model.table else {
            return;
        };
        let request = caps
            .http
            .post(table.insert_url())
            .header("Prefer", PREFER_MINIMAL)
            .body_json(row);
        match request {
            Ok(request) => {
                let id = id.clone();
                request.send(move |result| Event::BackfillInserted {
                    id,
                    result: result
                        .map(drop)
                        .map_err(|e| HttpError::from_crux("insert", e)),
                });
            }
            Err(e) => {
                let err = AppError::from(HttpError::from_crux("insert", e));
                warn!(ride_id = %id, code = err.code(), error = %err, "remote_insert_failed");
                Self::record_and_continue(model, caps, |report| report.failed += 1);
            }
        }
    }

    fn backfill_inserted(
        id: &RideId,
        result: Result<(), HttpError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if Self::current_row(id, model).is_none() {
            return;
        }
        match result {
            Ok(()) => {
                debug!(ride_id = %id, "ride_backfilled");
                Self::record_and_continue(model, caps, |report| report.inserted += 1);
            }
            Err(e) => {
                let err = AppError::from(e);
                warn!(ride_id = %id, code = err.code(), error = %err, "remote_insert_failed");
                Self::record_and_continue(model, caps, |report| report.failed += 1);
            }
        }
    }

    /// The row the pass is waiting on, if `id` is it. Responses from an
    /// earlier pass are dropped.
    fn current_row(id: &RideId, model: &Model) -> Option<NewRemoteRide> {
        let current = model.backfill.as_ref().and_then(BackfillProgress::current);
        match current {
            Some(row) if row.id == id.as_str() => Some(row.clone()),
            _ => {
                debug!(ride_id = %id, "stale_backfill_response");
                None
            }
        }
    }

    fn record_and_continue(
        model: &mut Model,
        caps: &Capabilities,
        record: impl FnOnce(&mut BackfillReport),
    ) {
        if let Some(progress) = model.backfill.as_mut() {
            record(&mut progress.report);
            progress.advance();
        }
        Self::check_next(model, caps);
    }

    fn finish_backfill(report: BackfillReport, model: &mut Model, caps: &Capabilities) {
        info!(
            inserted = report.inserted,
            already_present = report.already_present,
            failed = report.failed,
            "backfill_finished"
        );
        model.last_backfill = Some(report);
        caps.render.render();
    }

    // --- Ride actions ---

    #[instrument(skip_all, fields(ride_id = %id, action = %action))]
    fn handle_action(id: &RideId, action: RideAction, model: &mut Model, caps: &Capabilities) {
        let status = action.target_status();
        if model.find_ride(id).is_none() {
            warn!("ride_action_unknown_id");
        }
        model.rides = apply_status(&model.rides, id, status);

        if let Err(e) = offline_store::save(&caps.key_value, &model.rides) {
            let err = AppError::from(e);
            warn!(code = err.code(), error = %err, "local_cache_write_failed");
        }

        let driver_id = model.driver.as_ref().map(|driver| driver.id.clone());
        if driver_id.is_none() {
            warn!("ride_action_without_driver");
        }
        let patch = RideStatusPatch::new(status, driver_id.as_ref(), Utc::now());

        match &model.table {
            Some(table) => {
                let request = caps
                    .http
                    .patch(table.row_url(id))
                    .header("Prefer", PREFER_MINIMAL)
                    .body_json(&patch);
                match request {
                    Ok(request) => {
                        let id = id.clone();
                        let status = patch.status;
                        request.send(move |result| Event::StatusUpdated {
                            id,
                            status,
                            result: result
                                .map(drop)
                                .map_err(|e| HttpError::from_crux("update_status", e)),
                        });
                    }
                    Err(e) => log_http_failure(
                        HttpError::from_crux("update_status", e),
                        "remote_status_update_failed",
                    ),
                }
            }
            None => warn!("remote_table_not_configured"),
        }

        model.show_toast(action.confirmation());
        caps.render.render();
    }
}
