//! Types shared by the resolution pipeline and the HTTP layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, UnsupportedIdFormat};

static IMDB_MOVIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(tt\d+)$").unwrap());
static IMDB_EPISODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(tt\d+):(\d+):(\d+)$").unwrap());
static KITSU: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^kitsu:(\d+)(?::(\d+))?$").unwrap());

/// The content type a stream is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }
}

impl FromStr for ContentType {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "series" => Ok(Self::Series),
            other => Err(ResolveError::UnsupportedType(other.to_owned())),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed media request id.
///
/// The raw id string stays the de-duplication and cache key, this is only used to decide which
/// catalog lookup to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaId {
    /// `tt0111161`
    Imdb { imdb_id: String },
    /// `tt0944947:1:2`
    ImdbEpisode {
        imdb_id: String,
        season: u32,
        episode: u32,
    },
    /// `kitsu:1376`
    Kitsu { kitsu_id: u64 },
    /// `kitsu:1376:5`
    KitsuEpisode { kitsu_id: u64, episode: u32 },
}

impl MediaId {
    /// Parses a raw media request id into one of the supported shapes.
    pub fn parse(raw: &str) -> Result<Self, UnsupportedIdFormat> {
        let unsupported = || UnsupportedIdFormat(raw.to_owned());

        if let Some(caps) = IMDB_MOVIE.captures(raw) {
            return Ok(Self::Imdb {
                imdb_id: caps[1].to_owned(),
            });
        }

        if let Some(caps) = IMDB_EPISODE.captures(raw) {
            return Ok(Self::ImdbEpisode {
                imdb_id: caps[1].to_owned(),
                season: caps[2].parse().map_err(|_| unsupported())?,
                episode: caps[3].parse().map_err(|_| unsupported())?,
            });
        }

        if let Some(caps) = KITSU.captures(raw) {
            let kitsu_id = caps[1].parse().map_err(|_| unsupported())?;
            return match caps.get(2) {
                Some(episode) => Ok(Self::KitsuEpisode {
                    kitsu_id,
                    episode: episode.as_str().parse().map_err(|_| unsupported())?,
                }),
                None => Ok(Self::Kitsu { kitsu_id }),
            };
        }

        Err(unsupported())
    }
}

/// One torrent entry as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub title: String,
    #[serde(default)]
    pub seeders: Option<u32>,
    pub info_hash: String,
    #[serde(default)]
    pub file_index: Option<u32>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl CandidateRecord {
    /// The number of seeders, missing values count as zero.
    pub fn seeders(&self) -> u32 {
        self.seeders.unwrap_or(0)
    }
}

/// A coarse video quality class derived from a release title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Quality {
    Uhd,
    FullHd,
    Hd,
    Sd,
    #[default]
    Unknown,
    Cam,
}

impl Quality {
    /// Classifies a release title.
    pub fn from_title(title: &str) -> Self {
        let title = title.to_lowercase();
        if is_low_quality(&title) {
            Self::Cam
        } else if title.contains("2160p") || title.contains("4k") || title.contains("uhd") {
            Self::Uhd
        } else if title.contains("1080p") {
            Self::FullHd
        } else if title.contains("720p") {
            Self::Hd
        } else if title.contains("480p") || title.contains("dvdrip") {
            Self::Sd
        } else {
            Self::Unknown
        }
    }

    /// The human readable label used in stream names.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uhd => "4k",
            Self::FullHd => "1080p",
            Self::Hd => "720p",
            Self::Sd => "480p",
            Self::Unknown => "unknown",
            Self::Cam => "CAM",
        }
    }

    /// Parses a `qualityfilter` entry, unknown entries yield `None`.
    pub fn from_filter_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "4k" | "2160p" => Some(Self::Uhd),
            "1080p" => Some(Self::FullHd),
            "720p" => Some(Self::Hd),
            "480p" | "sd" => Some(Self::Sd),
            "unknown" => Some(Self::Unknown),
            "cam" | "scr" => Some(Self::Cam),
            _ => None,
        }
    }
}

/// Whether a lowercased title looks like a cam or screener release.
pub(crate) fn is_low_quality(lowercase_title: &str) -> bool {
    ["cam", "telesync", "scr"]
        .iter()
        .any(|marker| lowercase_title.contains(marker))
}

/// Hints for the player, see the addon protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binge_group: Option<String>,
}

impl BehaviorHints {
    pub fn is_empty(&self) -> bool {
        self.binge_group.is_none()
    }
}

/// Properties of a stream that are used for filtering and sorting, but never serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMeta {
    pub quality: Quality,
    pub seeders: u32,
    pub size: Option<u64>,
}

/// A playable stream as handed to addon clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_idx: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BehaviorHints::is_empty")]
    pub behavior_hints: BehaviorHints,
    #[serde(skip)]
    pub meta: StreamMeta,
}

impl From<CandidateRecord> for Stream {
    fn from(record: CandidateRecord) -> Self {
        let quality = Quality::from_title(&record.title);
        let seeders = record.seeders();

        let mut details = format!("👤 {seeders}");
        if let Some(size) = record.size {
            details.push_str(&format!(" 💾 {}", format_size(size)));
        }
        if let Some(ref provider) = record.provider {
            details.push_str(&format!(" ⚙️ {provider}"));
        }

        Stream {
            name: format!("StreamPick\n{}", quality.label()),
            title: format!("{}\n{details}", record.title),
            info_hash: Some(record.info_hash.to_lowercase()),
            file_idx: record.file_index,
            url: None,
            behavior_hints: BehaviorHints::default(),
            meta: StreamMeta {
                quality,
                seeders,
                size: record.size,
            },
        }
    }
}

fn format_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = MB * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else {
        format!("{:.0} MB", bytes / MB)
    }
}

/// Per-request options, parsed from the addon configuration path segment.
///
/// Pairs are separated by `|` or `&`, keys are case insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestExtras(BTreeMap<String, String>);

impl RequestExtras {
    pub fn parse(raw: &str) -> Self {
        let mut extras = BTreeMap::new();
        for part in raw.split('|') {
            for (key, value) in url::form_urlencoded::parse(part.as_bytes()) {
                if !key.is_empty() {
                    extras.insert(key.to_lowercase(), value.into_owned());
                }
            }
        }
        Self(extras)
    }

    /// Parses extras whose percent-encoding was already removed, such as decoded path segments.
    ///
    /// Unlike [`parse`](Self::parse), `+` and `%` are kept as they are.
    pub fn parse_decoded(raw: &str) -> Self {
        let extras = raw
            .split(['|', '&'])
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (!key.is_empty()).then(|| (key.to_lowercase(), value.to_owned()))
            })
            .collect();
        Self(extras)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the comma separated values of the given key.
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merges the pairs of `other` into these extras, `other` taking precedence.
    pub fn merge(mut self, other: RequestExtras) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The resolved streams of one request, together with their cache lifetimes in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub streams: Vec<Stream>,
    pub cache_max_age: u64,
    #[serde(rename = "staleRevalidate")]
    pub stale_revalidate_age: u64,
    #[serde(rename = "staleError")]
    pub stale_error_age: u64,
}

impl ResolutionResult {
    /// The `Cache-Control` header value matching the cache lifetimes.
    ///
    /// Returns `None` if the result must not be cached at all.
    pub fn cache_control(&self) -> Option<String> {
        if self.cache_max_age == 0 {
            return None;
        }
        Some(format!(
            "max-age={}, stale-while-revalidate={}, stale-if-error={}, public",
            self.cache_max_age, self.stale_revalidate_age, self.stale_error_age
        ))
    }
}
