use std::time::Duration;

use crate::config::CacheConfig;

/// How a cached entry of a certain age may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Serve as is.
    Fresh,
    /// Serve as is, and refresh in the background.
    Revalidate,
    /// Recompute, but serve the entry if that fails.
    StaleIfError,
    /// Unusable.
    Expired,
}

impl Freshness {
    /// Classifies an entry that was stored `age` ago.
    ///
    /// `is_empty` selects the shorter fresh age for results that did not contain anything.
    pub fn of(config: &CacheConfig, age: Duration, is_empty: bool) -> Self {
        let fresh_age = if is_empty {
            config.empty_fresh_age
        } else {
            config.fresh_age
        };

        if age < fresh_age {
            Self::Fresh
        } else if age < config.stale_revalidate_age {
            Self::Revalidate
        } else if age < config.stale_error_age {
            Self::StaleIfError
        } else {
            Self::Expired
        }
    }
}
