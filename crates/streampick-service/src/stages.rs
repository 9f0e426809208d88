//! Post-processing of selected streams according to the request extras.
//!
//! These stages are pure and never fail.

use std::cmp::Reverse;

use crate::types::{ContentType, Quality, RequestExtras, Stream};

/// Removes streams whose quality class is excluded with the `qualityfilter` extra.
pub fn post_filter(streams: Vec<Stream>, extras: &RequestExtras) -> Vec<Stream> {
    let excluded: Vec<Quality> = extras
        .list("qualityfilter")
        .into_iter()
        .filter_map(Quality::from_filter_key)
        .collect();

    if excluded.is_empty() {
        return streams;
    }

    streams
        .into_iter()
        .filter(|stream| !excluded.contains(&stream.meta.quality))
        .collect()
}

/// How streams are ordered, selected with the `sort` extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Best quality first, then by seeders.
    #[default]
    Quality,
    /// Most seeders first.
    Seeders,
    /// Largest first.
    Size,
}

impl SortOrder {
    pub fn from_extras(extras: &RequestExtras) -> Self {
        match extras.get("sort").map(str::to_lowercase).as_deref() {
            Some("seeders") => Self::Seeders,
            Some("size") => Self::Size,
            _ => Self::Quality,
        }
    }
}

/// Orders streams according to the `sort` extra.
///
/// Series episodes are always ordered by seeders within a quality, since sizes of individual
/// episode files are not comparable across season packs.
pub fn sort_streams(
    mut streams: Vec<Stream>,
    extras: &RequestExtras,
    content_type: ContentType,
) -> Vec<Stream> {
    match (SortOrder::from_extras(extras), content_type) {
        (SortOrder::Quality, _) | (SortOrder::Size, ContentType::Series) => streams
            .sort_by_key(|stream| (stream.meta.quality, Reverse(stream.meta.seeders))),
        (SortOrder::Seeders, _) => streams.sort_by_key(|stream| Reverse(stream.meta.seeders)),
        (SortOrder::Size, ContentType::Movie) => {
            streams.sort_by_key(|stream| Reverse(stream.meta.size.unwrap_or(0)))
        }
    }
    streams
}

/// Adds player hints that do not depend on the request.
///
/// Streams of the same quality share a binge group, so players keep the quality when
/// automatically continuing with the next episode.
pub fn apply_static_info(mut streams: Vec<Stream>) -> Vec<Stream> {
    for stream in &mut streams {
        if stream.behavior_hints.binge_group.is_none() {
            stream.behavior_hints.binge_group =
                Some(format!("streampick|{}", stream.meta.quality.label()));
        }
    }
    streams
}
