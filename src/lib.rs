//! fieldtrack: a polling ingestion pipeline for hiker check-ins.
//!
//! A Telegram bot account is the field-facing surface: hikers send `/start`,
//! tap status buttons, type notes, attach photos, or share their location.
//! The pipeline polls `getUpdates` behind a durable cursor, classifies each
//! update, maintains a person registry, appends to a per-hiker message
//! archive, and relays photo attachments into object storage. Dashboards read
//! the derived live-tracking projection.

pub mod db;
pub mod error;
pub mod media;
mod migrations;
pub mod poller;
pub mod services;
pub mod state;
pub mod telegram;
pub mod types;
