//! Enrichment of streams with debrid playback links.
//!
//! A debrid service downloads a torrent on behalf of the user and serves it as a plain HTTP file.
//! Clients pass their debrid API key in the request extras, and every stream is rewritten to a
//! link on the resolver, which performs the debrid calls once the user actually starts playback.

use futures::future::{self, BoxFuture};
use url::Url;

use crate::config::DebridConfig;
use crate::error::ResolveError;
use crate::types::{RequestExtras, Stream};

/// The file served for streams whose debrid access could not be set up.
pub const FAILED_ACCESS: &str = "failed_access.mp4";

/// Debrid providers, in the order of precedence when several keys are given.
pub const PROVIDERS: &[&str] = &[
    "realdebrid",
    "alldebrid",
    "premiumize",
    "debridlink",
    "offcloud",
    "putio",
];

/// Transforms the playback links of resolved streams.
pub trait Debrid: Send + Sync + 'static {
    fn enrich(
        &self,
        streams: Vec<Stream>,
        extras: &RequestExtras,
    ) -> BoxFuture<'static, Result<Vec<Stream>, ResolveError>>;
}

/// A [`Debrid`] implementation pointing streams at a debrid link resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverLinks {
    resolver_url: Option<Url>,
}

impl ResolverLinks {
    pub fn new(resolver_url: Option<Url>) -> Self {
        Self { resolver_url }
    }

    pub fn from_config(config: &DebridConfig) -> Self {
        Self::new(config.resolver_url.clone())
    }

    fn link(&self, resolver: &Url, path: &str) -> String {
        format!("{}/{path}", resolver.as_str().trim_end_matches('/'))
    }

    fn apply(&self, mut streams: Vec<Stream>, extras: &RequestExtras) -> Vec<Stream> {
        let Some(ref resolver) = self.resolver_url else {
            return streams;
        };
        let Some((provider, key)) = PROVIDERS
            .iter()
            .find_map(|provider| Some((*provider, extras.get(provider)?)))
        else {
            return streams;
        };

        if !is_valid_key(key) {
            tracing::debug!(provider, "Rejecting malformed debrid key");
            let failed_access = self.link(resolver, &format!("static/{FAILED_ACCESS}"));
            for stream in &mut streams {
                stream.info_hash = None;
                stream.file_idx = None;
                stream.url = Some(failed_access.clone());
            }
            return streams;
        }

        for stream in &mut streams {
            let Some(info_hash) = stream.info_hash.take() else {
                continue;
            };
            let file_idx = stream
                .file_idx
                .take()
                .map_or_else(|| "null".to_owned(), |idx| idx.to_string());
            stream.url = Some(self.link(
                resolver,
                &format!("{provider}/{key}/{info_hash}/{file_idx}"),
            ));
            stream.name = format!("[{}+] {}", provider_short_name(provider), stream.name);
        }
        streams
    }
}

impl Debrid for ResolverLinks {
    fn enrich(
        &self,
        streams: Vec<Stream>,
        extras: &RequestExtras,
    ) -> BoxFuture<'static, Result<Vec<Stream>, ResolveError>> {
        Box::pin(future::ready(Ok(self.apply(streams, extras))))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn provider_short_name(provider: &str) -> &'static str {
    match provider {
        "realdebrid" => "RD",
        "alldebrid" => "AD",
        "premiumize" => "PM",
        "debridlink" => "DL",
        "offcloud" => "OC",
        "putio" => "Putio",
        _ => "DB",
    }
}
