use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::Value;

use shared_config::AppConfig;
use shared_database::{AppState, ClinicStore, MemoryStore};
use shared_models::{Doctor, NewDoctor, NewPatient, Patient};

/// In-memory clinic for handler and service tests.
pub struct TestClinic {
    pub store: MemoryStore,
    pub state: Arc<AppState>,
}

impl Default for TestClinic {
    fn default() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl TestClinic {
    pub fn with_store(store: MemoryStore) -> Self {
        let state = Arc::new(AppState::new(AppConfig::default(), Arc::new(store.clone())));
        Self { store, state }
    }

    pub async fn patient(&self, email: &str) -> Patient {
        self.store
            .insert_patient(TestData::new_patient(email))
            .await
            .expect("seed patient")
    }

    pub async fn doctor(&self, full_name: &str) -> Doctor {
        self.store
            .insert_doctor(TestData::new_doctor(full_name, true))
            .await
            .expect("seed doctor")
    }

    pub async fn inactive_doctor(&self, full_name: &str) -> Doctor {
        self.store
            .insert_doctor(TestData::new_doctor(full_name, false))
            .await
            .expect("seed doctor")
    }
}

pub struct TestData;

impl TestData {
    pub fn new_patient(email: &str) -> NewPatient {
        NewPatient {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            phone_number: "9876543210".to_string(),
        }
    }

    pub fn new_doctor(full_name: &str, is_active: bool) -> NewDoctor {
        NewDoctor {
            full_name: full_name.to_string(),
            specialization: "Diagnostics".to_string(),
            is_active,
        }
    }

    /// `days_ahead` days from now at `hour:minute` UTC.
    pub fn future_slot(days_ahead: i64, hour: u32, minute: u32) -> DateTime<Utc> {
        (Utc::now() + Duration::days(days_ahead))
            .with_hour(hour)
            .and_then(|t| t.with_minute(minute))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .expect("valid wall clock time")
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("json body")
}
