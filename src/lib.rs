//! scrip — loyalty points accounting service
//!
//! Authenticated users upload order numbers; an external accrual calculator
//! eventually reports whether each order earned points; scrip credits points
//! to per-user balances and lets users spend them.
//!
//! - HTTP API (axum): register/login, order upload and listing, balance,
//!   withdrawals
//! - PostgreSQL storage (sqlx) with optimistic locking on balance rows
//! - Background worker that reconciles pending orders against the accrual
//!   system with bounded concurrency and rate-limit backpressure

pub mod accrual;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod luhn;
pub mod service;
pub mod state;
pub mod worker;
