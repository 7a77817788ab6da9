//! Typed client for the external device API: HMAC request signing and
//! classified HTTP calls against the device-listing and device-status
//! endpoints.

pub mod client;
pub mod sign;
