//! # Kitsu Provider
//!
//! Implements `EntityClient` for the Kitsu production tracker REST API.
//!
//! ## Overview
//!
//! This crate provides:
//! - Email/password login with bearer-token requests
//! - Name lookups and creation for episodes, sequences, shots, asset types
//!   and assets
//! - Project-wide and assigned-to-me listings
//! - Tasks, comments, preview uploads and thumbnail downloads
//! - Exponential backoff for rate limiting and server errors

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{api_host_from_site, KitsuClientFactory, KitsuConnector};
pub use error::{KitsuError, Result};
