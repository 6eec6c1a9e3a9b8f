//! AOP Core: domain models, the shared error type, route tables and the
//! trait seams behind which the hosted backend lives.

pub mod error;
pub mod models;
pub mod repository;
pub mod routes;

pub use error::{AopError, AopResult};
