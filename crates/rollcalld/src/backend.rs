//! Attendance backend client.
//!
//! Two JSON endpoints: `POST /api/mark_present` with `{"student_id": ...}`
//! and `POST /api/face_login` with `{"image": <data URL>}`. Both answer with
//! a JSON acknowledgement.

use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected request with {status}: {body}")]
    Rejected { status: u16, body: Value },
}

/// Outbound side of attendance synchronization.
pub trait AttendanceBackend: Send + Sync + 'static {
    fn mark_present(&self, student_id: &str) -> impl Future<Output = Result<Value, BackendError>> + Send;
    fn face_login(&self, image: &str) -> impl Future<Output = Result<Value, BackendError>> + Send;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value, BackendError> {
        let response = self.client.post(self.endpoint(path)).json(&payload).send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if status.is_success() {
            Ok(body)
        } else {
            Err(BackendError::Rejected { status: status.as_u16(), body })
        }
    }
}

impl AttendanceBackend for HttpBackend {
    async fn mark_present(&self, student_id: &str) -> Result<Value, BackendError> {
        self.post("/api/mark_present", json!({ "student_id": student_id })).await
    }

    async fn face_login(&self, image: &str) -> Result<Value, BackendError> {
        self.post("/api/face_login", json!({ "image": image })).await
    }
}
