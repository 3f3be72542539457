use std::env;
use std::time::Duration;

use crate::models::Role;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub user_id: String,
    pub role: Role,
    pub teacher_id: Option<String>,
    pub poll_interval: Duration,
    pub booking_timeout: Duration,
    pub slot_fetch_limit: u32,
    pub schedule_fetch_limit: u32,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub booking_price: u32,
    pub booking_currency: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/".to_string(),
            ws_base_url: "ws://localhost:8000/ws/booking/".to_string(),
            user_id: String::new(),
            role: Role::Student,
            teacher_id: None,
            poll_interval: Duration::from_millis(30_000),
            booking_timeout: Duration::from_millis(10_000),
            slot_fetch_limit: 500,
            schedule_fetch_limit: 100,
            reconnect_min: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(30_000),
            booking_price: 500,
            booking_currency: "INR".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            ws_base_url: env::var("WS_BASE_URL").unwrap_or(defaults.ws_base_url),
            user_id: env::var("USER_ID").unwrap_or_default(),
            role: env::var("USER_ROLE")
                .map(|v| Role::parse(&v))
                .unwrap_or(defaults.role),
            teacher_id: env::var("TEACHER_ID").ok().filter(|v| !v.trim().is_empty()),
            poll_interval: millis("POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            booking_timeout: millis("BOOKING_TIMEOUT_MS").unwrap_or(defaults.booking_timeout),
            slot_fetch_limit: env::var("SLOT_FETCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.slot_fetch_limit),
            schedule_fetch_limit: env::var("SCHEDULE_FETCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.schedule_fetch_limit),
            reconnect_min: millis("RECONNECT_MIN_MS").unwrap_or(defaults.reconnect_min),
            reconnect_max: millis("RECONNECT_MAX_MS").unwrap_or(defaults.reconnect_max),
            booking_price: env::var("BOOKING_PRICE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.booking_price),
            booking_currency: env::var("BOOKING_CURRENCY").unwrap_or(defaults.booking_currency),
        }
    }
}

fn millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
