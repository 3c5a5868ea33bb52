//! Types and configuration shared between the sync engine and its adapters.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
