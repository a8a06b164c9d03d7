// Short generation
//
// The rest of the crate only sees `ShortGenerator`: something that turns a
// source video into a finished vertical clip plus a suggested title.
// - Commands: command builders and abstractions
// - Processor: the ffmpeg-backed generator

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use commands::*;
pub use processor::*;

use crate::error::Result;

/// A rendered clip ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedShort {
    pub local_file_path: PathBuf,
    pub suggested_title: String,
}

/// Main trait for short generation
#[async_trait]
pub trait ShortGenerator: Send + Sync {
    /// Render `input` into `output_dir`
    async fn generate(&self, input: &Path, output_dir: &Path) -> Result<GeneratedShort>;
}
