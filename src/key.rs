//! Job identity: media kinds and the video-id resolver
//!
//! A [`JobKey`] is the canonical identity of a job. Two requests for the same
//! video id and media kind always resolve to equal keys, which is what makes
//! `request_download` idempotent.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use utoipa::ToSchema;

/// YouTube video ids are 11 characters from the URL-safe base64 alphabet.
#[allow(clippy::expect_used)]
static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id pattern is a valid regex")
});

/// Which track of a video is extracted
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio-only extraction (the `/song` route)
    Audio,
    /// Audio+video extraction (the `/video` route)
    Video,
}

impl MediaKind {
    /// All media kinds, in lookup order
    pub const ALL: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];

    /// Lowercase name used in file names and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "audio" | "song" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            _ => Err(Error::InvalidMediaKind(s.to_string())),
        }
    }
}

/// Canonical identity of a job: (video id, media kind)
///
/// Fields are private so a `JobKey` can only be obtained through
/// [`JobKey::resolve`] or [`JobKey::from_file_name`], both of which validate
/// the video id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "UncheckedJobKey")]
pub struct JobKey {
    video_id: String,
    kind: MediaKind,
}

/// Wire form of [`JobKey`], validated on the way in
#[derive(Deserialize)]
struct UncheckedJobKey {
    video_id: String,
    kind: MediaKind,
}

impl TryFrom<UncheckedJobKey> for JobKey {
    type Error = Error;

    fn try_from(raw: UncheckedJobKey) -> Result<Self> {
        Self::resolve(&raw.video_id, raw.kind)
    }
}

impl JobKey {
    /// Resolve a job key from a raw video id and a media kind
    ///
    /// Pure function. Fails with [`Error::InvalidVideoId`] when the id does not
    /// have the platform's identifier shape.
    ///
    /// # Example
    ///
    /// ```
    /// use tube_dl::{JobKey, MediaKind};
    ///
    /// let key = JobKey::resolve("dQw4w9WgXcQ", MediaKind::Audio).unwrap();
    /// assert_eq!(key.video_id(), "dQw4w9WgXcQ");
    /// assert!(JobKey::resolve("bad id!", MediaKind::Audio).is_err());
    /// ```
    pub fn resolve(video_id: &str, kind: MediaKind) -> Result<Self> {
        if !is_valid_video_id(video_id) {
            return Err(Error::InvalidVideoId(video_id.to_string()));
        }
        Ok(Self {
            video_id: video_id.to_string(),
            kind,
        })
    }

    /// Recover a key from an artifact file name (`{video_id}.{kind}.{ext}`)
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let mut parts = file_name.splitn(3, '.');
        let (Some(video_id), Some(kind), Some(ext)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::FileNotFound(file_name.to_string()));
        };
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(Error::FileNotFound(file_name.to_string()));
        }
        let kind: MediaKind = kind
            .parse()
            .map_err(|_| Error::FileNotFound(file_name.to_string()))?;
        Self::resolve(video_id, kind).map_err(|_| Error::FileNotFound(file_name.to_string()))
    }

    /// The validated video id
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// The requested media kind
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// File name stem shared by all artifacts of this key (`{video_id}.{kind}`)
    pub fn file_stem(&self) -> String {
        format!("{}.{}", self.video_id, self.kind)
    }

    /// Full artifact file name for the given extension
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.file_stem(), extension)
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.video_id, self.kind)
    }
}

/// Whether `video_id` has the shape of a YouTube video id
pub fn is_valid_video_id(video_id: &str) -> bool {
    VIDEO_ID_PATTERN.is_match(video_id)
}
