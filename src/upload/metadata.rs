use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;
const SHORTS_HASHTAG: &str = "#Shorts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Public,
    Unlisted,
    #[default]
    Private,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Public => "public",
            PrivacyLevel::Unlisted => "unlisted",
            PrivacyLevel::Private => "private",
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(PrivacyLevel::Public),
            "unlisted" => Ok(PrivacyLevel::Unlisted),
            "private" => Ok(PrivacyLevel::Private),
            _ => Err(format!(
                "Invalid privacy level '{}'. Valid levels: public, unlisted, private",
                s
            )),
        }
    }
}

/// Caller-supplied metadata, before Shorts conventions are applied.
#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub description: String,
    pub privacy_level: PrivacyLevel,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub made_for_kids: bool,
    pub notify_subscribers: bool,
}

/// A fully resolved upload. Immutable once handed to the upload client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    local_file_path: PathBuf,
    title: String,
    description: String,
    privacy_level: PrivacyLevel,
    category: String,
    tags: Vec<String>,
    made_for_kids: bool,
    notify_subscribers: bool,
}

impl UploadRequest {
    /// Resolve `metadata` for `path`: default the title from the file name,
    /// clamp lengths, tag the description as a Short and fill in defaults.
    pub fn new(
        path: impl Into<PathBuf>,
        metadata: VideoMetadata,
        default_category: &str,
        default_tags: &[String],
    ) -> Self {
        let local_file_path = path.into();
        let title = metadata
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| title_from_path(&local_file_path));
        let tags = metadata
            .tags
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_tags.to_vec());

        Self {
            title: truncate_chars(title.trim(), MAX_TITLE_CHARS),
            description: shorts_description(&metadata.description),
            privacy_level: metadata.privacy_level,
            category: metadata
                .category
                .unwrap_or_else(|| default_category.to_string()),
            tags,
            made_for_kids: metadata.made_for_kids,
            notify_subscribers: metadata.notify_subscribers,
            local_file_path,
        }
    }

    pub fn local_file_path(&self) -> &Path {
        &self.local_file_path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn privacy_level(&self) -> PrivacyLevel {
        self.privacy_level
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn notify_subscribers(&self) -> bool {
        self.notify_subscribers
    }

    /// Check the constraints the API enforces on `videos.insert`, so
    /// malformed metadata fails before a session is opened.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.title.contains('<') || self.title.contains('>') {
            return Err("title must not contain '<' or '>'".to_string());
        }
        if self.description.contains('<') || self.description.contains('>') {
            return Err("description must not contain '<' or '>'".to_string());
        }
        if self.category.is_empty() || !self.category.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("category '{}' is not a numeric category id", self.category));
        }
        let tag_chars: usize = self.tags.iter().map(|t| t.chars().count()).sum();
        if tag_chars > 500 {
            return Err(format!("tags total {} characters, limit is 500", tag_chars));
        }
        Ok(())
    }

    /// JSON body of `videos.insert`.
    ///
    /// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
    pub fn to_resource(&self) -> serde_json::Value {
        json!({
            "snippet": {
                "title": self.title,
                "description": self.description,
                "tags": self.tags,
                "categoryId": self.category,
            },
            "status": {
                "privacyStatus": self.privacy_level.as_str(),
                "selfDeclaredMadeForKids": self.made_for_kids,
            },
        })
    }
}

/// `my_great_clip_short.mp4` -> `My Great Clip Short`
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append `#Shorts` unless already present, then clamp to the API limit
/// without cutting the hashtag off.
fn shorts_description(description: &str) -> String {
    let description = description.trim();
    if description.to_lowercase().contains("#shorts") {
        return truncate_chars(description, MAX_DESCRIPTION_CHARS);
    }
    if description.is_empty() {
        return SHORTS_HASHTAG.to_string();
    }
    let room = MAX_DESCRIPTION_CHARS - SHORTS_HASHTAG.len() - 2;
    format!("{}\n\n{}", truncate_chars(description, room), SHORTS_HASHTAG)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        vec!["Shorts".to_string(), "YouTube Shorts".to_string()]
    }

    #[test]
    fn test_title_from_path() {
        assert_eq!(
            title_from_path(Path::new("/tmp/my_great_clip_short.mp4")),
            "My Great Clip Short"
        );
        assert_eq!(title_from_path(Path::new("HELLO_world.mov")), "Hello World");
    }

    #[test]
    fn test_defaults_are_applied() {
        let request = UploadRequest::new("clip_one.mp4", VideoMetadata::default(), "22", &defaults());
        assert_eq!(request.title(), "Clip One");
        assert_eq!(request.description(), "#Shorts");
        assert_eq!(request.category(), "22");
        assert_eq!(request.tags(), defaults().as_slice());
        assert_eq!(request.privacy_level(), PrivacyLevel::Private);
        request.validate().unwrap();
    }

    #[test]
    fn test_shorts_tag_not_duplicated() {
        let metadata = VideoMetadata {
            description: "already tagged #shorts".to_string(),
            ..VideoMetadata::default()
        };
        let request = UploadRequest::new("a.mp4", metadata, "22", &defaults());
        assert_eq!(request.description(), "already tagged #shorts");

        let metadata = VideoMetadata {
            description: "fresh".to_string(),
            ..VideoMetadata::default()
        };
        let request = UploadRequest::new("a.mp4", metadata, "22", &defaults());
        assert_eq!(request.description(), "fresh\n\n#Shorts");
    }

    #[test]
    fn test_lengths_are_clamped() {
        let metadata = VideoMetadata {
            title: Some("t".repeat(250)),
            description: "d".repeat(6000),
            ..VideoMetadata::default()
        };
        let request = UploadRequest::new("a.mp4", metadata, "22", &defaults());
        assert_eq!(request.title().chars().count(), MAX_TITLE_CHARS);
        assert!(request.description().chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(request.description().ends_with("#Shorts"));
    }

    #[test]
    fn test_invalid_title_rejected() {
        let metadata = VideoMetadata {
            title: Some("<script>".to_string()),
            ..VideoMetadata::default()
        };
        let request = UploadRequest::new("a.mp4", metadata, "22", &defaults());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_privacy_parse() {
        assert_eq!("Unlisted".parse::<PrivacyLevel>(), Ok(PrivacyLevel::Unlisted));
        assert!("secret".parse::<PrivacyLevel>().is_err());
    }

    #[test]
    fn test_resource_body() {
        let metadata = VideoMetadata {
            title: Some("Hello".to_string()),
            privacy_level: PrivacyLevel::Public,
            ..VideoMetadata::default()
        };
        let body = UploadRequest::new("a.mp4", metadata, "22", &defaults()).to_resource();
        assert_eq!(body["snippet"]["title"], "Hello");
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(body["status"]["privacyStatus"], "public");
        assert_eq!(body["status"]["selfDeclaredMadeForKids"], false);
    }
}
