use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::auth::ClientDescriptor;
use crate::error::{Result, ShortgenError};
use crate::media::{GeneratedShort, ShortGenerator};
use crate::publish::{PublishOrchestrator, UploadResult};
use crate::upload::VideoMetadata;

/// Extensions picked up when the input is a directory
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "flv", "wmv", "webm", "m4v"];

/// Everything needed to publish the generated shorts.
pub struct PublishTarget {
    pub orchestrator: Arc<PublishOrchestrator>,
    pub descriptor: ClientDescriptor,
    /// Applied to every short; an absent title falls back to the suggested one
    pub metadata: VideoMetadata,
}

/// What happened to one input video.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Generated(GeneratedShort),
    Published {
        short: GeneratedShort,
        result: UploadResult,
    },
    GenerationFailed {
        input: PathBuf,
        error: String,
    },
}

impl JobOutcome {
    /// Whether the job reached its goal: generated, and published if asked to.
    pub fn succeeded(&self) -> bool {
        match self {
            JobOutcome::Generated(_) => true,
            JobOutcome::Published { result, .. } => result.is_published(),
            JobOutcome::GenerationFailed { .. } => false,
        }
    }
}

pub struct Workflow {
    generator: Arc<dyn ShortGenerator>,
    publish: Option<Arc<PublishTarget>>,
    jobs: usize,
}

impl Workflow {
    pub fn new(generator: Arc<dyn ShortGenerator>) -> Self {
        Self {
            generator,
            publish: None,
            jobs: 1,
        }
    }

    /// Upload every generated short.
    pub fn with_publish(mut self, target: PublishTarget) -> Self {
        self.publish = Some(Arc::new(target));
        self
    }

    /// Number of videos processed concurrently.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Process a single file or every video in a directory. Outcomes are
    /// returned in input order.
    pub async fn run(
        &self,
        input: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<JobOutcome>> {
        let videos = discover_videos(input)?;
        info!("Found {} video(s) to process", videos.len());
        fs::create_dir_all(output_dir).await?;

        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();

        for (index, video) in videos.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ShortgenError::Config(format!("worker pool closed: {}", e)))?;
            if cancel.is_cancelled() {
                warn!("Cancelled, not starting {}", video.display());
                break;
            }

            let generator = self.generator.clone();
            let publish = self.publish.clone();
            let output_dir = output_dir.to_path_buf();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = process_video(generator, publish, &video, &output_dir, &cancel).await;
                drop(permit);
                (index, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "Job task panicked"),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

async fn process_video(
    generator: Arc<dyn ShortGenerator>,
    publish: Option<Arc<PublishTarget>>,
    video: &Path,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> JobOutcome {
    info!("Processing: {}", video.display());
    let short = match generator.generate(video, output_dir).await {
        Ok(short) => short,
        Err(e) => {
            warn!("Failed to process {}: {}", video.display(), e);
            return JobOutcome::GenerationFailed {
                input: video.to_path_buf(),
                error: e.to_string(),
            };
        }
    };
    info!("Created: {}", short.local_file_path.display());

    let Some(target) = publish else {
        return JobOutcome::Generated(short);
    };
    let mut metadata = target.metadata.clone();
    if metadata.title.is_none() {
        metadata.title = Some(short.suggested_title.clone());
    }
    let result = target
        .orchestrator
        .publish(&short.local_file_path, metadata, &target.descriptor, cancel)
        .await;
    JobOutcome::Published { short, result }
}

/// Videos to process: the file itself, or the videos directly inside a
/// directory, sorted by path.
pub fn discover_videos(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(ShortgenError::FileNotFound(input.display().to_string()));
    }

    let mut videos: Vec<PathBuf> = WalkDir::new(input)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_video(path))
        .collect();
    videos.sort();

    if videos.is_empty() {
        return Err(ShortgenError::Config(format!(
            "No video files found in {}",
            input.display()
        )));
    }
    Ok(videos)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ShortGenerator for FakeGenerator {
        async fn generate(&self, input: &Path, output_dir: &Path) -> Result<GeneratedShort> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if input.to_string_lossy().contains("broken") {
                return Err(ShortgenError::Media("decode error".to_string()));
            }
            let stem = input.file_stem().unwrap().to_string_lossy();
            Ok(GeneratedShort {
                local_file_path: output_dir.join(format!("{}_short.mp4", stem)),
                suggested_title: stem.to_string(),
            })
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_discover_videos_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.MOV");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "c.mp4");

        let videos = discover_videos(dir.path()).unwrap();
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MOV"]);
    }

    #[test]
    fn test_discover_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover_videos(dir.path()), Err(ShortgenError::Config(_))));
        assert!(matches!(
            discover_videos(&dir.path().join("absent")),
            Err(ShortgenError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.mp4", "broken.mp4", "c.mp4", "d.mp4"] {
            touch(dir.path(), name);
        }
        let generator = Arc::new(FakeGenerator {
            calls: AtomicUsize::new(0),
        });

        let outcomes = Workflow::new(generator.clone())
            .with_jobs(3)
            .run(dir.path(), &dir.path().join("out"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].succeeded());
        assert!(matches!(outcomes[1], JobOutcome::GenerationFailed { .. }));
        assert!(outcomes[3].succeeded());
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp4");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let generator = Arc::new(FakeGenerator {
            calls: AtomicUsize::new(0),
        });

        let outcomes = Workflow::new(generator.clone())
            .run(dir.path(), &dir.path().join("out"), &cancel)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
