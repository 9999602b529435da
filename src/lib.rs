// SPDX-License-Identifier: MIT

//! Athlete Hub: access-control and activity-telemetry core for the club
//! management dashboard.
//!
//! This crate provides the backend API for the role hierarchy, the
//! switch-user identity service, sport/squad permission filtering, and the
//! activity logging / session tracking / audit aggregation pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::ClubDb;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: ClubDb,
}
