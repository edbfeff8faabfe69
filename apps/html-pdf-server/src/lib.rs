//! HTML to PDF Server Library
//!
//! Converts HTML documents into PDF through a headless browser on this host
//! or a remote conversion API, behind a small axum HTTP surface.
//!
//! # Modules
//!
//! - `conversion`: request options, backends and the orchestrating service
//! - `browser`: browser launch profiles, sessions and admission control
//! - `routes`: HTTP handlers

pub mod browser;
pub mod config;
pub mod conversion;
pub mod error;
pub mod routes;
pub mod state;
