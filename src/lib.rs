//! shortgen - Vertical Shorts generation and YouTube publishing
//!
//! Renders the tail of a source video into a 9:16 clip with ffmpeg and
//! publishes it through the YouTube Data API's resumable upload protocol,
//! with OAuth2 credential management and local quota accounting.

pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod media;
pub mod persist;
pub mod publish;
pub mod quota;
pub mod upload;
pub mod workflow;
