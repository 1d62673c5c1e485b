#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use crux_core::testing::AppTester;
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use serde_json::{json, Value};
use url::Url;

use shared::capabilities::DriverIdentity;
use shared::remote::{NewRemoteRide, RemoteRideRow, RideStatusPatch};
use shared::{App, BackfillMode, DashboardSettings, Effect, Event, Model, ViewModel};

pub const BASE_URL: &str = "https://demo.supabase.co";
pub const TABLE_PATH: &str = "/rest/v1/ride_requests";

fn reply(status: u16, body: &Value) -> HttpResult {
    HttpResult::Ok(HttpResponse {
        status,
        headers: vec![],
        body: serde_json::to_vec(body).unwrap(),
    })
}

fn empty(status: u16) -> HttpResult {
    HttpResult::Ok(HttpResponse {
        status,
        headers: vec![],
        body: vec![],
    })
}

/// PostgREST table kept in memory. Understands the handful of request
/// shapes the dashboard sends and records every one of them.
#[derive(Default)]
pub struct FakeTable {
    pub rows: Vec<RemoteRideRow>,
    pub patches: Vec<(String, RideStatusPatch)>,
    pub requests: Vec<(String, String)>,
    pub offline: bool,
    pub fail_exists_for: HashSet<String>,
}

impl FakeTable {
    pub fn row(&self, id: &str) -> Option<&RemoteRideRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests.iter().filter(|(m, _)| m == method).count()
    }

    /// Exists checks made for `id`.
    pub fn checks_for(&self, id: &str) -> usize {
        let needle = format!("id=eq.{id}&limit=1");
        self.requests
            .iter()
            .filter(|(m, url)| m == "GET" && url.ends_with(&needle))
            .count()
    }

    fn handle(&mut self, request: &HttpRequest) -> HttpResult {
        self.requests.push((request.method.clone(), request.url.clone()));
        if self.offline {
            return HttpResult::Err(crux_http::Error::Io("network unreachable".into()));
        }

        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.path(), TABLE_PATH);
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let id = query
            .get("id")
            .and_then(|filter| filter.strip_prefix("eq."))
            .map(str::to_string);

        match (request.method.as_str(), id) {
            ("GET", None) => reply(200, &serde_json::to_value(&self.rows).unwrap()),
            ("GET", Some(id)) => {
                if self.fail_exists_for.contains(&id) {
                    return reply(500, &json!({"message": "canceling statement due to statement timeout"}));
                }
                let found: Vec<Value> = self
                    .row(&id)
                    .map(|row| json!({ "id": row.id }))
                    .into_iter()
                    .collect();
                reply(200, &Value::Array(found))
            }
            ("POST", None) => self.insert(request),
            ("PATCH", Some(id)) => {
                let patch: RideStatusPatch = serde_json::from_slice(&request.body).unwrap();
                if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
                    row.status = Some(patch.status.as_str().to_string());
                    row.driver_id.clone_from(&patch.driver_id);
                    row.updated_at = Some(patch.updated_at);
                }
                self.patches.push((id, patch));
                empty(204)
            }
            (method, id) => panic!("unexpected {method} request for {id:?}"),
        }
    }

    fn insert(&mut self, request: &HttpRequest) -> HttpResult {
        let ignore_duplicates = request.headers.iter().any(|h| {
            h.name.eq_ignore_ascii_case("prefer") && h.value.contains("ignore-duplicates")
        });
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let rows: Vec<NewRemoteRide> = match body {
            Value::Array(_) => serde_json::from_value(body).unwrap(),
            single => vec![serde_json::from_value(single).unwrap()],
        };

        for row in rows {
            if self.row(&row.id).is_some() {
                if ignore_duplicates {
                    continue;
                }
                return reply(409, &json!({"code": "23505", "message": "duplicate key value"}));
            }
            self.rows.push(RemoteRideRow {
                id: row.id,
                student_id: row.student_id,
                driver_id: None,
                pickup_location: Some(row.pickup_location),
                destination: Some(row.destination),
                status: Some(row.status.as_str().to_string()),
                created_at: Some(row.created_at),
                updated_at: Some(row.updated_at),
            });
        }
        empty(201)
    }
}

/// Drives the core the way a real shell does: every effect is answered
/// from an in-memory cache and a [`FakeTable`], and callback events are fed
/// back until the core goes quiet.
pub struct TestShell {
    app: AppTester<App, Effect>,
    pub model: Model,
    pub kv: HashMap<String, Vec<u8>>,
    pub table: FakeTable,
    pub renders: usize,
    mode: BackfillMode,
}

impl TestShell {
    /// Starts a configured, signed-in dashboard without mounting it.
    pub fn new(mode: BackfillMode) -> Self {
        Self::with_state(mode, HashMap::new(), FakeTable::default())
    }

    fn with_state(mode: BackfillMode, kv: HashMap<String, Vec<u8>>, table: FakeTable) -> Self {
        let mut shell = Self {
            app: AppTester::default(),
            model: Model::default(),
            kv,
            table,
            renders: 0,
            mode,
        };
        shell.send(Event::Configured(DashboardSettings {
            base_url: BASE_URL.into(),
            table: "ride_requests".into(),
            backfill_mode: mode,
        }));
        shell.send(Event::SessionChanged(Some(driver())));
        shell
    }

    /// A fresh core over the same device cache and remote table.
    pub fn relaunch(self) -> Self {
        Self::with_state(self.mode, self.kv, self.table)
    }

    pub fn seed_cache(&mut self, json: &str) {
        self.kv
            .insert(shared::LOCAL_RIDES_KEY.to_string(), json.as_bytes().to_vec());
    }

    pub fn cached(&self) -> Value {
        serde_json::from_slice(&self.kv[shared::LOCAL_RIDES_KEY]).unwrap()
    }

    pub fn send(&mut self, event: Event) {
        let effects = self.app.update(event, &mut self.model).effects;
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            let events = match effect {
                Effect::Render(_) => {
                    self.renders += 1;
                    continue;
                }
                Effect::Http(mut request) => {
                    let result = self.table.handle(&request.operation);
                    self.app.resolve(&mut request, result).unwrap().events
                }
                Effect::KeyValue(mut request) => {
                    let result = self.handle_kv(&request.operation);
                    self.app.resolve(&mut request, result).unwrap().events
                }
            };
            for event in events {
                queue.extend(self.app.update(event, &mut self.model).effects);
            }
        }
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    fn handle_kv(&mut self, operation: &KeyValueOperation) -> KeyValueResult {
        let response = match operation {
            KeyValueOperation::Get { key } => KeyValueResponse::Get {
                value: self.kv.get(key).cloned().into(),
            },
            KeyValueOperation::Set { key, value } => KeyValueResponse::Set {
                previous: self.kv.insert(key.clone(), value.clone()).into(),
            },
            other => panic!("dashboard never sends {other:?}"),
        };
        KeyValueResult::Ok { response }
    }
}

pub fn driver() -> DriverIdentity {
    DriverIdentity::new("drv-1")
        .with_name("Jo", "Park")
        .with_email("jo@uni.edu")
}
