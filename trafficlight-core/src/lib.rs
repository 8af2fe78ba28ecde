//! Core shared library for the TrafficLight content router.
//!
//! This crate exposes the primitives every other crate depends on:
//! canonical errors, environment-driven configuration helpers, the
//! Postgres pool wrapper, JSON helpers and logging setup.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;
pub mod serde_utils;

pub use errors::{ConfigError, TrafficLightError};
