mod common;

use chrono::{TimeZone, Utc};
use shared::remote::RemoteRideRow;
use shared::{BackfillMode, BackfillReport, DataSource, Event, RideStatus};

use common::TestShell;

const LEGACY_CACHE: &str = r#"[
    {"id": "1", "studentName": "Ana", "studentEmail": "ana@uni.edu",
     "pickupLocation": "Dorm 4", "destination": "Clinic", "status": "pending",
     "disabilityType": "Wheelchair", "additionalNotes": "Ramp"},
    {"id": "2", "studentName": "Ben", "pickupLocation": "Library", "destination": "Stadium"},
    "garbage"
]"#;

#[test]
fn offline_session_then_sync_on_next_launch() {
    // 1. First launch: legacy cache on the device, remote unreachable
    let mut shell = TestShell::new(BackfillMode::CheckThenInsert);
    shell.seed_cache(LEGACY_CACHE);
    shell.table.offline = true;
    shell.send(Event::Mounted);

    let model = &shell.model;
    assert_eq!(model.data_source, Some(DataSource::LocalCache));
    assert_eq!(model.rides.len(), 2);
    assert_eq!(model.rides[1].student_email, "unknown@email.com");
    assert_eq!(model.rides[1].disability_type, "Not specified");
    assert_eq!(model.rides[1].status, RideStatus::Pending);
    assert_eq!(
        model.last_backfill,
        Some(BackfillReport {
            inserted: 0,
            already_present: 0,
            failed: 2
        })
    );
    assert!(!shell.view().is_loading);

    // 2. Accept while offline: local change sticks, confirmation shown
    shell.send(Event::accept("1"));
    assert_eq!(shell.model.rides[0].status, RideStatus::Accepted);
    assert_eq!(
        shell.view().toast.map(|t| t.message),
        Some("Ride request accepted".to_string())
    );
    assert!(shell.table.rows.is_empty());
    assert_eq!(shell.cached()[0]["status"], "accepted");

    // 3. Second launch: remote reachable but empty, cache backfills it
    let mut shell = shell.relaunch();
    shell.table.offline = false;
    shell.send(Event::Mounted);

    assert_eq!(shell.model.data_source, Some(DataSource::LocalCache));
    assert_eq!(shell.model.rides[0].status, RideStatus::Accepted);
    assert_eq!(shell.model.rides[0].additional_notes.as_deref(), Some("Ramp"));
    assert_eq!(
        shell.model.last_backfill,
        Some(BackfillReport {
            inserted: 2,
            already_present: 0,
            failed: 0
        })
    );

    let row = shell.table.row("1").unwrap();
    assert_eq!(row.status.as_deref(), Some("accepted"));
    assert_eq!(row.student_id.as_deref(), Some("drv-1"));
    assert!(shell.table.row("2").is_some());

    // 4. Decline goes out as "rejected"
    shell.send(Event::decline("2"));
    let (id, patch) = shell.table.patches.last().cloned().unwrap();
    assert_eq!(id, "2");
    assert_eq!(patch.status.as_str(), "rejected");
    assert_eq!(patch.driver_id.as_deref(), Some("drv-1"));

    // 5. Refresh now reads the remote table; the rejected row is not shown as declined
    shell.send(Event::RefreshRequested);
    assert_eq!(shell.model.data_source, Some(DataSource::Remote));

    let declined = shell
        .model
        .rides
        .iter()
        .find(|r| r.id.as_str() == "2")
        .unwrap();
    assert_eq!(declined.status, RideStatus::Pending);
    assert_eq!(declined.student_name, "Student drv-1");
    assert_eq!(declined.disability_type, "Not specified");
}

#[test]
fn generated_ids_survive_a_relaunch() {
    let mut shell = TestShell::new(BackfillMode::CheckThenInsert);
    shell.seed_cache(r#"[{"studentName": "Kai", "pickupLocation": "Dorm 1"}]"#);
    shell.table.offline = true;

    shell.send(Event::Mounted);
    let first_id = shell.model.rides[0].id.clone();
    assert_eq!(shell.cached()[0]["id"], first_id.as_str());

    let mut shell = shell.relaunch();
    shell.send(Event::Mounted);
    assert_eq!(shell.model.rides[0].id, first_id);

    shell.send(Event::accept(first_id.clone()));
    assert_eq!(shell.model.rides[0].status, RideStatus::Accepted);
    assert_eq!(shell.cached()[0]["id"], first_id.as_str());
    assert_eq!(shell.cached()[0]["status"], "accepted");
}

#[test]
fn remote_rows_hide_local_only_rides() {
    let mut shell = TestShell::new(BackfillMode::CheckThenInsert);
    shell.table.rows.push(RemoteRideRow {
        id: "r-100".into(),
        student_id: None,
        driver_id: None,
        pickup_location: Some("East Lot".into()),
        destination: Some("Pharmacy".into()),
        status: Some("completed".into()),
        created_at: Some(Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()),
        updated_at: None,
    });
    shell.seed_cache(LEGACY_CACHE);

    shell.send(Event::Mounted);

    let view = shell.view();
    assert_eq!(view.total_count, 1);
    assert_eq!(view.completed_count, 1);
    assert_eq!(view.rides[0].student_name, "Unknown");
    assert!(view.rides[0].actions.is_empty());

    // The cache is neither read into the list nor rewritten by a load.
    assert_eq!(
        shell.kv[shared::LOCAL_RIDES_KEY],
        LEGACY_CACHE.as_bytes().to_vec()
    );
    assert_eq!(shell.table.requests.len(), 1);
}

#[test]
fn bulk_backfill_uses_a_single_round_trip() {
    let mut shell = TestShell::new(BackfillMode::BulkUpsert);
    shell.seed_cache(LEGACY_CACHE);

    shell.send(Event::Mounted);

    assert_eq!(shell.model.rides.len(), 2);
    assert_eq!(shell.table.count("GET"), 1);
    assert_eq!(shell.table.count("POST"), 1);
    assert_eq!(shell.table.rows.len(), 2);
}

#[test]
fn one_failed_check_still_backfills_the_rest() {
    let mut shell = TestShell::new(BackfillMode::CheckThenInsert);
    shell.seed_cache(r#"[{"id": "a"}, {"id": "b"}]"#);
    shell.table.fail_exists_for.insert("a".into());

    shell.send(Event::Mounted);

    assert_eq!(shell.table.checks_for("a"), 1);
    assert_eq!(shell.table.checks_for("b"), 1);
    assert!(shell.table.row("a").is_none());
    assert!(shell.table.row("b").is_some());
    assert_eq!(
        shell.model.last_backfill,
        Some(BackfillReport {
            inserted: 1,
            already_present: 0,
            failed: 1
        })
    );
    assert!(!shell.view().is_syncing);
}
