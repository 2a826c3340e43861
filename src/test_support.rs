//! In-process stand-in for the NPPES registry, bound to an ephemeral port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Query, RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::registry::RegistryClient;

/// Requests for this number get an HTTP 500 from the fake registry.
pub const SERVER_ERROR_NPI: &str = "5000000000";

/// Requests for this number are answered only after `SLOW_RESPONSE`.
pub const SLOW_NPI: &str = "4000000000";
const SLOW_RESPONSE: Duration = Duration::from_secs(3);

type RequestLog = Arc<Mutex<Vec<(String, Instant)>>>;

#[derive(Clone)]
struct FakeState {
    records: Arc<HashMap<String, Value>>,
    requests: RequestLog,
}

pub struct FakeRegistry {
    pub addr: SocketAddr,
    requests: RequestLog,
}

impl FakeRegistry {
    pub async fn spawn(records: Vec<(&str, Value)>) -> Self {
        let state = FakeState {
            records: Arc::new(
                records
                    .into_iter()
                    .map(|(npi, record)| (npi.to_string(), record))
                    .collect(),
            ),
            requests: Arc::default(),
        };
        let requests = Arc::clone(&state.requests);

        let app = Router::new()
            .route("/api/", get(registry_api))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake registry");
        let addr = listener.local_addr().expect("fake registry addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake registry");
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    pub fn client(&self) -> RegistryClient {
        self.client_with_timeout(Duration::from_secs(5))
    }

    pub fn client_with_timeout(&self, timeout: Duration) -> RegistryClient {
        RegistryClient::new(&self.base_url(), "2.1", timeout).expect("registry client")
    }

    /// Raw query strings received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.log().into_iter().map(|(query, _)| query).collect()
    }

    /// When each request arrived, in arrival order.
    pub fn arrivals(&self) -> Vec<Instant> {
        self.log().into_iter().map(|(_, at)| at).collect()
    }

    fn log(&self) -> Vec<(String, Instant)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn registry_api(
    State(st): State<FakeState>,
    RawQuery(raw): RawQuery,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    st.requests
        .lock()
        .expect("requests lock")
        .push((raw.unwrap_or_default(), Instant::now()));

    let number = params.get("number").cloned().unwrap_or_default();
    if number == SERVER_ERROR_NPI {
        return (StatusCode::INTERNAL_SERVER_ERROR, "registry unavailable").into_response();
    }
    if number == SLOW_NPI {
        tokio::time::sleep(SLOW_RESPONSE).await;
        return Json(json!({ "result_count": 0, "results": [] })).into_response();
    }
    if number.len() != 10 || !number.chars().all(|c| c.is_ascii_digit()) {
        return Json(json!({
            "Errors": [{
                "description": "Field number must have 10 digits",
                "field": "number",
                "number": "04"
            }]
        }))
        .into_response();
    }

    match st.records.get(&number) {
        Some(record) => Json(json!({ "result_count": 1, "results": [record] })).into_response(),
        None => Json(json!({ "result_count": 0, "results": [] })).into_response(),
    }
}

/// A base URL nothing is listening on.
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind unused port");
    let addr = listener.local_addr().expect("unused port addr");
    drop(listener);
    format!("http://{addr}/api/")
}

pub fn acme_clinic() -> Value {
    json!({
        "number": "1487000001",
        "enumeration_type": "NPI-2",
        "basic": {
            "organization_name": "Acme Clinic",
            "enumeration_date": "2007-05-14",
            "status": "A",
            "authorized_official_first_name": "Dana",
            "authorized_official_last_name": "Reyes",
            "authorized_official_title_or_position": "Administrator",
            "authorized_official_telephone_number": "775-555-0100"
        },
        "addresses": [
            {"address_purpose": "MAILING", "city": "Reno", "state": "NV", "postal_code": "89501"},
            {
                "address_purpose": "LOCATION",
                "address_1": "1 Main St",
                "city": "Reno",
                "state": "NV",
                "postal_code": "89501",
                "country_name": "United States",
                "telephone_number": "775-555-0199"
            }
        ],
        "taxonomies": [
            {"desc": "Internal Medicine", "code": "207R00000X", "primary": true, "state": "NV"}
        ]
    })
}

pub fn jane_doe() -> Value {
    json!({
        "number": "1487000002",
        "enumeration_type": "NPI-1",
        "basic": {
            "first_name": "Jane",
            "last_name": "Doe",
            "credential": "MD",
            "enumeration_date": "2010-01-04",
            "status": "A"
        },
        "addresses": [
            {"address_purpose": "LOCATION", "address_1": "9 Elm St", "city": "Sparks", "state": "NV", "postal_code": "89431"}
        ]
    })
}
