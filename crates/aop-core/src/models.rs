//! Domain models for AOP.
//!
//! Rows mirror the hosted backend's tables; timestamps travel as ISO-8601
//! strings and deserialize into `DateTime<Utc>`.

pub mod identity;
pub mod profile;
pub mod session;
