//! Lookup of torrent candidates in the upstream catalog.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{header, Client, StatusCode};
use url::Url;

use crate::config::CatalogConfig;
use crate::error::ResolveError;
use crate::types::{CandidateRecord, ContentType, MediaId};

const USER_AGENT: &str = concat!("streampick/", env!("CARGO_PKG_VERSION"));

/// A catalog query, derived from the requested content type and media id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogQuery {
    Movie {
        imdb_id: String,
    },
    Episode {
        imdb_id: String,
        season: u32,
        episode: u32,
    },
    KitsuMovie {
        kitsu_id: u64,
    },
    KitsuEpisode {
        kitsu_id: u64,
        episode: u32,
    },
}

impl CatalogQuery {
    /// Picks the lookup for a content type and id.
    ///
    /// Kitsu ids are looked up regardless of the content type, since anime movies and series are
    /// frequently requested as the other type. IMDb ids only resolve for the matching type, every
    /// other combination yields `None` and resolves to nothing.
    pub fn new(content_type: ContentType, id: &MediaId) -> Option<Self> {
        match (content_type, id) {
            (ContentType::Movie, MediaId::Imdb { imdb_id }) => Some(Self::Movie {
                imdb_id: imdb_id.clone(),
            }),
            (
                ContentType::Series,
                MediaId::ImdbEpisode {
                    imdb_id,
                    season,
                    episode,
                },
            ) => Some(Self::Episode {
                imdb_id: imdb_id.clone(),
                season: *season,
                episode: *episode,
            }),
            (_, MediaId::Kitsu { kitsu_id }) => Some(Self::KitsuMovie {
                kitsu_id: *kitsu_id,
            }),
            (_, MediaId::KitsuEpisode { kitsu_id, episode }) => Some(Self::KitsuEpisode {
                kitsu_id: *kitsu_id,
                episode: *episode,
            }),
            _ => None,
        }
    }

    /// The path of this query relative to the catalog base URL.
    pub fn path(&self) -> String {
        match self {
            Self::Movie { imdb_id } => format!("movie/{imdb_id}.json"),
            Self::Episode {
                imdb_id,
                season,
                episode,
            } => format!("series/{imdb_id}/{season}/{episode}.json"),
            Self::KitsuMovie { kitsu_id } => format!("kitsu/{kitsu_id}.json"),
            Self::KitsuEpisode { kitsu_id, episode } => format!("kitsu/{kitsu_id}/{episode}.json"),
        }
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// The source of torrent candidates.
///
/// A lookup that matches nothing succeeds with an empty list.
pub trait Catalog: Send + Sync + 'static {
    fn lookup(
        &self,
        query: CatalogQuery,
    ) -> BoxFuture<'static, Result<Vec<CandidateRecord>, ResolveError>>;
}

/// A [`Catalog`] answering queries from a JSON HTTP API.
///
/// Every query maps to a `GET` of [`CatalogQuery::path`] below the configured base URL, which
/// answers with a JSON array of candidates. A `404` means there are no candidates.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: Client,
    base_url: Option<Url>,
    timeout: Duration,
}

impl HttpCatalog {
    pub fn new(client: Client, base_url: Option<Url>, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
        }
    }

    /// Creates a catalog client with the configured timeouts.
    pub fn from_config(config: &CatalogConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("failed to create catalog HTTP client")?;

        if config.url.is_none() {
            tracing::warn!("No catalog configured, all lookups will fail");
        }

        Ok(Self::new(client, config.url.clone(), config.timeout))
    }

    fn endpoint(&self, query: &CatalogQuery) -> Result<Url, ResolveError> {
        let mut base = self
            .base_url
            .clone()
            .ok_or_else(|| ResolveError::Upstream("no catalog configured".into()))?;

        // make sure the last path segment of the base is not replaced when joining
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        base.join(&query.path())
            .map_err(|err| ResolveError::Upstream(format!("invalid catalog url: {err}")))
    }
}

impl Catalog for HttpCatalog {
    fn lookup(
        &self,
        query: CatalogQuery,
    ) -> BoxFuture<'static, Result<Vec<CandidateRecord>, ResolveError>> {
        let client = self.client.clone();
        let timeout = self.timeout;
        let endpoint = self.endpoint(&query);

        async move {
            let url = endpoint?;
            tracing::debug!("Fetching catalog entries from `{}`", url);

            let response = client
                .get(url)
                .header(header::USER_AGENT, USER_AGENT)
                .timeout(timeout)
                .send()
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        ResolveError::Timeout(timeout)
                    } else {
                        ResolveError::from(err)
                    }
                })?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                tracing::debug!("No catalog entries for {query}");
                return Ok(Vec::new());
            }
            if !status.is_success() {
                return Err(ResolveError::Upstream(format!(
                    "catalog responded with {status}"
                )));
            }

            let body = response.bytes().await.map_err(|err| {
                if err.is_timeout() {
                    ResolveError::Timeout(timeout)
                } else {
                    ResolveError::from(err)
                }
            })?;

            let records: Vec<CandidateRecord> = serde_json::from_slice(&body)
                .map_err(|err| ResolveError::Malformed(err.to_string()))?;
            tracing::trace!("Catalog returned {} entries for {query}", records.len());

            Ok(records)
        }
        .boxed()
    }
}
