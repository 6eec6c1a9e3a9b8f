//! AOP Backend: clients for the hosted auth/table service.
//!
//! This crate provides:
//! - Connection configuration ([`BackendConfig`])
//! - The HTTP implementation of the `aop-core` traits ([`RestBackend`])
//! - An in-process implementation for tests and offline runs
//!   ([`MemoryBackend`])
//! - Local credential persistence ([`CredentialStorage`])

mod config;
mod error;
pub mod memory;
pub mod rest;
pub mod storage;

pub use config::BackendConfig;
pub use error::BackendError;
pub use memory::MemoryBackend;
pub use rest::RestBackend;
pub use storage::CredentialStorage;
