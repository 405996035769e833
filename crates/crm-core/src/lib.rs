//! Core library for the CRM client: authenticated API access, session
//! persistence and route protection.

pub mod api;
pub mod config;
pub mod logging;
pub mod navigation;
pub mod session;
