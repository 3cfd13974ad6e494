use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, SubsecRound, Utc};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_models::{Appointment, Doctor, NewAppointment, NewDoctor, NewPatient, Patient, RecordId};

use crate::store::{utc_day_bounds, BookingTransaction, ClinicStore, StoreError};

const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Non-success response from PostgREST.
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    /// PostgreSQL SQLSTATE when the database rejected the statement.
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    fn from_body(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        Self { status, code, message }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.anon_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         body: Option<Value>, extra_headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(ApiError::from_body(status.as_u16(), &error_text).into());
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn to_store_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<ApiError>() {
        Some(api) => match api.code.as_deref() {
            Some(EXCLUSION_VIOLATION) => StoreError::ExclusionViolation,
            Some(UNIQUE_VIOLATION) => StoreError::UniqueViolation(api.message.clone()),
            Some(FOREIGN_KEY_VIOLATION) => StoreError::NotFound(api.message.clone()),
            _ => StoreError::Backend(api.to_string()),
        },
        None => StoreError::Backend(err.to_string()),
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| StoreError::Backend(format!("Failed to parse rows: {}", e)))
}

/// `timestamptz` holds microseconds. Z suffix keeps the value free of '+'
/// in query strings.
fn timestamp(value: DateTime<Utc>) -> String {
    value.trunc_subsecs(6).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Smallest microsecond instant not before `value`. Upper bounds of a
/// prefilter may widen but never narrow.
fn micros_ceiling(value: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = value.trunc_subsecs(6);
    if truncated < value {
        truncated + Duration::microseconds(1)
    } else {
        truncated
    }
}

fn starting_before_path(doctor_id: RecordId, end: DateTime<Utc>) -> String {
    format!(
        "/rest/v1/appointments?doctor_id=eq.{}&start_time=lt.{}&order=start_time.asc",
        doctor_id,
        timestamp(micros_ceiling(end))
    )
}

fn return_representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

/// PostgREST-backed store.
///
/// Double booking is prevented by the `appointments_no_overlap` exclusion
/// constraint (see `supabase/migrations`); its SQLSTATE surfaces as
/// [`StoreError::ExclusionViolation`].
pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
    closed: AtomicBool,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        self.ensure_open()?;
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, None)
            .await
            .map_err(to_store_error)?;
        Ok(parse_rows(rows)?.into_iter().next())
    }
}

#[async_trait]
impl ClinicStore for SupabaseStore {
    fn backend_name(&self) -> &'static str {
        "supabase"
    }

    async fn insert_patient(&self, patient: NewPatient) -> Result<Patient, StoreError> {
        self.ensure_open()?;
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/patients",
            Some(json!({
                "first_name": patient.first_name,
                "last_name": patient.last_name,
                "email": patient.email,
                "phone_number": patient.phone_number,
            })),
            Some(return_representation()),
        ).await.map_err(to_store_error)?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("insert returned no patient".to_string()))
    }

    async fn get_patient(&self, patient_id: RecordId) -> Result<Option<Patient>, StoreError> {
        self.fetch_one(&format!("/rest/v1/patients?id=eq.{}", patient_id)).await
    }

    async fn insert_doctor(&self, doctor: NewDoctor) -> Result<Doctor, StoreError> {
        self.ensure_open()?;
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/doctors",
            Some(json!({
                "full_name": doctor.full_name,
                "specialization": doctor.specialization,
                "is_active": doctor.is_active,
            })),
            Some(return_representation()),
        ).await.map_err(to_store_error)?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("insert returned no doctor".to_string()))
    }

    async fn get_doctor(&self, doctor_id: RecordId) -> Result<Option<Doctor>, StoreError> {
        self.fetch_one(&format!("/rest/v1/doctors?id=eq.{}", doctor_id)).await
    }

    async fn get_appointment(&self, appointment_id: RecordId) -> Result<Option<Appointment>, StoreError> {
        self.fetch_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn list_appointments(
        &self,
        date: NaiveDate,
        doctor_id: Option<RecordId>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.ensure_open()?;
        let (day_start, day_end) = utc_day_bounds(date);

        let mut query_parts = vec![
            format!("start_time=gte.{}", timestamp(day_start)),
            format!("start_time=lt.{}", timestamp(day_end)),
        ];
        if let Some(doctor_id) = doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        let path = format!("/rest/v1/appointments?{}&order=start_time.asc,id.asc",
                           query_parts.join("&"));
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(to_store_error)?;

        parse_rows(rows)
    }

    async fn appointments_for_doctor_starting_before(
        &self,
        doctor_id: RecordId,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.ensure_open()?;
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &starting_before_path(doctor_id, end), None)
            .await
            .map_err(to_store_error)?;

        parse_rows(rows)
    }

    async fn begin_booking(&self, doctor_id: RecordId) -> Result<Box<dyn BookingTransaction>, StoreError> {
        self.ensure_open()?;
        Ok(Box::new(SupabaseBookingTransaction {
            doctor_id,
            supabase: Arc::clone(&self.supabase),
            staged: Vec::new(),
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let _: Vec<Value> = self.supabase.request(Method::GET, "/rest/v1/doctors?select=id&limit=1", None)
            .await
            .map_err(to_store_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        info!("Supabase store at {} closed", self.supabase.get_base_url());
        Ok(())
    }
}

/// Reads go straight to PostgREST; staged rows are written by one bulk
/// insert at commit, which PostgreSQL runs as a single statement.
struct SupabaseBookingTransaction {
    doctor_id: RecordId,
    supabase: Arc<SupabaseClient>,
    staged: Vec<NewAppointment>,
}

#[async_trait]
impl BookingTransaction for SupabaseBookingTransaction {
    fn doctor_id(&self) -> RecordId {
        self.doctor_id
    }

    async fn doctor(&mut self) -> Result<Option<Doctor>, StoreError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", self.doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(to_store_error)?;
        Ok(parse_rows(rows)?.into_iter().next())
    }

    async fn patient_exists(&mut self, patient_id: RecordId) -> Result<bool, StoreError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id", patient_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(to_store_error)?;
        Ok(!rows.is_empty())
    }

    async fn appointments_starting_before(
        &mut self,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let path = starting_before_path(self.doctor_id, end);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None)
            .await
            .map_err(to_store_error)?;
        let mut appointments: Vec<Appointment> = parse_rows(rows)?;

        let now = Utc::now();
        appointments.extend(
            self.staged
                .iter()
                .filter(|apt| apt.start_time < end)
                .map(|apt| Appointment {
                    id: 0,
                    patient_id: apt.patient_id,
                    doctor_id: apt.doctor_id,
                    start_time: apt.start_time,
                    duration_minutes: apt.duration_minutes,
                    created_at: now,
                }),
        );

        Ok(appointments)
    }

    async fn stage_appointment(&mut self, appointment: NewAppointment) -> Result<(), StoreError> {
        if appointment.doctor_id != self.doctor_id {
            return Err(StoreError::Backend(format!(
                "transaction for doctor {} cannot stage appointment for doctor {}",
                self.doctor_id, appointment.doctor_id
            )));
        }
        self.staged.push(appointment);
        Ok(())
    }

    async fn commit(&mut self) -> Result<Vec<Appointment>, StoreError> {
        if self.staged.is_empty() {
            return Ok(Vec::new());
        }

        let body: Vec<Value> = self.staged.iter().map(|apt| json!({
            "patient_id": apt.patient_id,
            "doctor_id": apt.doctor_id,
            "start_time": timestamp(apt.start_time),
            "duration_minutes": apt.duration_minutes,
        })).collect();

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(Value::Array(body)),
            Some(return_representation()),
        ).await.map_err(to_store_error)?;

        self.staged.clear();
        parse_rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_reads_postgrest_code() {
        let err = ApiError::from_body(409, r#"{"code":"23P01","message":"conflicting key value violates exclusion constraint"}"#);
        assert_eq!(err.code.as_deref(), Some("23P01"));
        assert!(err.message.contains("exclusion"));

        assert_eq!(to_store_error(err.into()), StoreError::ExclusionViolation);
    }

    #[test]
    fn test_api_error_falls_back_to_raw_body() {
        let err = ApiError::from_body(500, "gateway exploded");
        assert_eq!(err.code, None);
        assert_eq!(err.message, "gateway exploded");
    }

    #[test]
    fn test_timestamps_use_zulu_suffix() {
        let value = DateTime::parse_from_rfc3339("2031-01-02T03:04:05+02:00").unwrap().with_timezone(&Utc);
        assert_eq!(timestamp(value), "2031-01-02T01:04:05Z");
    }

    #[test]
    fn test_timestamps_keep_microseconds() {
        let value = DateTime::parse_from_rfc3339("2031-05-20T10:30:00.750Z").unwrap().with_timezone(&Utc);
        assert_eq!(timestamp(value), "2031-05-20T10:30:00.750Z");

        let value = DateTime::parse_from_rfc3339("2031-05-20T10:30:00.123456789Z").unwrap().with_timezone(&Utc);
        assert_eq!(timestamp(value), "2031-05-20T10:30:00.123456Z");
    }

    #[test]
    fn test_prefilter_bound_rounds_up() {
        let exact = DateTime::parse_from_rfc3339("2031-05-20T11:00:00.750Z").unwrap().with_timezone(&Utc);
        assert_eq!(micros_ceiling(exact), exact);

        let nanos = DateTime::parse_from_rfc3339("2031-05-20T11:00:00.000000001Z").unwrap().with_timezone(&Utc);
        assert_eq!(timestamp(micros_ceiling(nanos)), "2031-05-20T11:00:00.000001Z");
    }
}
