//! Read-side services for dashboard consumers.

pub mod tracking;
