//! Client and record types for the project service.

mod cache;
pub mod client;
pub mod types;

pub use client::{ApiClient, Credentials, SessionState};
