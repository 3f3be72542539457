pub mod api;
pub mod booking;
pub mod payment;
pub mod polling;
pub mod realtime;
pub mod reconciler;
pub mod session;
pub mod slot_cache;
pub mod slots;
