use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, ShortgenError};
use crate::upload::metadata::title_from_path;
use super::{GeneratedShort, MediaCommandBuilder, ShortGenerator, ShortRender};

/// FFmpeg-based short generator
pub struct FfmpegShortGenerator {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegShortGenerator {
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }

    /// Check if ffmpeg can be executed
    pub async fn check_availability(&self) -> Result<()> {
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| ShortgenError::Media(format!("Media processor not found: {}", e)))?;
        debug!("Media processor is available");
        Ok(())
    }

    /// `in/clip.mov` -> `<output_dir>/clip_short.mp4`
    pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        output_dir.join(format!("{}_short.mp4", stem))
    }
}

#[async_trait]
impl ShortGenerator for FfmpegShortGenerator {
    async fn generate(&self, input: &Path, output_dir: &Path) -> Result<GeneratedShort> {
        if !input.exists() {
            return Err(ShortgenError::FileNotFound(input.display().to_string()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let output = Self::output_path_for(input, output_dir);
        if output.exists() {
            info!("Short already exists, reusing {}", output.display());
        } else {
            info!("Rendering {} -> {}", input.display(), output.display());
            let render = ShortRender {
                duration_secs: self.config.duration_secs,
                width: self.config.width,
                height: self.config.height,
                blur_sigma: self.config.blur_sigma,
                encode_options: &self.config.encode_options,
            };
            self.command_builder
                .vertical_short(input, output.as_path(), &render)
                .execute()
                .await?;
        }

        Ok(GeneratedShort {
            suggested_title: title_from_path(&output),
            local_file_path: output,
        })
    }
}
