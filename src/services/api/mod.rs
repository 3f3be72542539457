pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::ApiError;
use crate::models::{
    ApiAck, Booking, CreateOrder, PaymentOrder, PaymentVerification, Profile, ProfileUpdate, Role,
    Slot, Teacher,
};

/// Body of get-teacher-slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotQuery {
    pub teacher_id: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// The authoritative request/response endpoints.
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn list_teachers(&self) -> Result<Vec<Teacher>, ApiError>;

    async fn teacher_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, ApiError>;

    async fn student_bookings(&self, student_id: &str) -> Result<Vec<Booking>, ApiError>;

    async fn get_profile(&self, role: Role, user_id: &str) -> Result<Profile, ApiError>;

    async fn update_profile(&self, role: Role, update: &ProfileUpdate) -> Result<ApiAck, ApiError>;

    async fn create_payment_order(&self, order: &CreateOrder) -> Result<PaymentOrder, ApiError>;

    async fn verify_payment(&self, verification: &PaymentVerification) -> Result<(), ApiError>;
}
