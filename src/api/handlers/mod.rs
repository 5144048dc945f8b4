//! API handlers for the admin auth core.

pub mod audit_logs;
pub mod auth;
pub mod health;
pub mod root;
