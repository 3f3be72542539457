use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use url::Url;

use super::{BookingApi, SlotQuery};
use crate::errors::ApiError;
use crate::models::{
    ApiAck, Booking, CreateOrder, PaymentOrder, PaymentVerification, Profile, ProfileUpdate, Role,
    Slot, Teacher,
};

pub struct HttpBookingApi {
    base: Url,
    client: reqwest::Client,
}

impl HttpBookingApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            base: Url::parse(&base)?,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Slot reads must never be served from an intermediate cache.
    async fn post_uncached<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.endpoint(path)?)
            .query(&[("t", chrono::Utc::now().timestamp_millis())])
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `{success: false, message}` is a business rejection; anything else is a
/// plain status error carrying the server's `error` text when present.
fn error_from_body(status: u16, body: &str) -> ApiError {
    let value: Option<serde_json::Value> = serde_json::from_str(body).ok();

    if let Some(v) = &value {
        if v["success"] == json!(false) {
            let message = v["message"]
                .as_str()
                .unwrap_or("request was rejected")
                .to_string();
            return ApiError::Rejected(message);
        }
    }

    let body = value
        .as_ref()
        .and_then(|v| v["error"].as_str().or_else(|| v["message"].as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    ApiError::Status { status, body }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn list_teachers(&self) -> Result<Vec<Teacher>, ApiError> {
        let resp = self
            .client
            .get(self.endpoint("teacher/list-teachers/")?)
            .query(&[("t", chrono::Utc::now().timestamp_millis())])
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .send()
            .await?;
        read_json(resp).await
    }

    async fn teacher_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, ApiError> {
        self.post_uncached("booking/get-teacher-slots/", query).await
    }

    async fn student_bookings(&self, student_id: &str) -> Result<Vec<Booking>, ApiError> {
        self.post(
            "booking/get-student-bookings/",
            &json!({ "student_id": student_id }),
        )
        .await
    }

    async fn get_profile(&self, role: Role, user_id: &str) -> Result<Profile, ApiError> {
        let path = format!("{}/get-profile/", role.as_str());
        self.post(&path, &json!({ "user_id": user_id })).await
    }

    async fn update_profile(&self, role: Role, update: &ProfileUpdate) -> Result<ApiAck, ApiError> {
        let path = format!("{}/update-profile/", role.as_str());
        let ack: ApiAck = self.post(&path, update).await?;
        if !ack.success {
            return Err(ApiError::Rejected(
                ack.message
                    .unwrap_or_else(|| "Failed to update profile".to_string()),
            ));
        }
        Ok(ack)
    }

    async fn create_payment_order(&self, order: &CreateOrder) -> Result<PaymentOrder, ApiError> {
        self.post("payment/create-order/", order).await
    }

    async fn verify_payment(&self, verification: &PaymentVerification) -> Result<(), ApiError> {
        let value: serde_json::Value = self.post("payment/verify-payment/", verification).await?;
        if value["success"] == json!(false) {
            let message = value["error"]
                .as_str()
                .or_else(|| value["message"].as_str())
                .unwrap_or("Payment verification failed");
            return Err(ApiError::Rejected(message.to_string()));
        }
        Ok(())
    }
}
