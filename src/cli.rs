use clap::Parser;
use std::path::PathBuf;

use crate::upload::PrivacyLevel;

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn videos into vertical Shorts and publish them to YouTube", long_about = None)]
pub struct Args {
    /// Input video file, or a directory of videos
    #[arg(required_unless_present = "revoke")]
    pub input: Option<PathBuf>,

    /// Upload each generated short
    #[arg(long)]
    pub upload: bool,

    /// Video title (defaults to one derived from the file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Privacy status of uploaded videos
    #[arg(long, default_value = "private", value_parser = parse_privacy)]
    pub privacy: PrivacyLevel,

    /// OAuth client descriptor downloaded from the Google Cloud Console
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Output directory for generated shorts
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Length of the clip, in seconds
    #[arg(long)]
    pub duration: Option<u32>,

    /// Video description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Tags (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    /// YouTube category id
    #[arg(long)]
    pub category: Option<String>,

    /// Where the OAuth token is persisted
    #[arg(long)]
    pub token_store: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Never open a browser for consent
    #[arg(long)]
    pub headless: bool,

    /// Number of videos processed concurrently
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Revoke and delete the stored credential, then exit
    #[arg(long)]
    pub revoke: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_privacy(s: &str) -> Result<PrivacyLevel, String> {
    s.parse()
}

impl Args {
    /// Tags with surrounding blanks and empty entries removed.
    pub fn tag_list(&self) -> Option<Vec<String>> {
        self.tags.as_ref().map(|tags| {
            tags.iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation() {
        let args = Args::try_parse_from(["shortgen", "clip.mp4"]).unwrap();
        assert_eq!(args.input, Some(PathBuf::from("clip.mp4")));
        assert!(!args.upload);
        assert_eq!(args.privacy, PrivacyLevel::Private);
        assert_eq!(args.output, PathBuf::from("output"));
        assert_eq!(args.jobs, 1);
    }

    #[test]
    fn test_upload_options() {
        let args = Args::try_parse_from([
            "shortgen",
            "videos/",
            "--upload",
            "--title",
            "Sunset",
            "--privacy",
            "unlisted",
            "--tags",
            "travel, beach,,",
            "--headless",
            "-j",
            "4",
        ])
        .unwrap();
        assert!(args.upload);
        assert_eq!(args.title.as_deref(), Some("Sunset"));
        assert_eq!(args.privacy, PrivacyLevel::Unlisted);
        assert_eq!(args.tag_list(), Some(vec!["travel".to_string(), "beach".to_string()]));
        assert!(args.headless);
        assert_eq!(args.jobs, 4);
    }

    #[test]
    fn test_invalid_privacy_rejected() {
        assert!(Args::try_parse_from(["shortgen", "clip.mp4", "--privacy", "secret"]).is_err());
    }

    #[test]
    fn test_input_required_unless_revoking() {
        assert!(Args::try_parse_from(["shortgen"]).is_err());
        let args = Args::try_parse_from(["shortgen", "--revoke"]).unwrap();
        assert!(args.revoke);
        assert!(args.input.is_none());
    }
}
