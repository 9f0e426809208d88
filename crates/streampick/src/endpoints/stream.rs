use axum::extract;
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use streampick_service::types::RequestExtras;

use super::{AppState, ResponseError};

/// Path parameters of a stream request.
///
/// Extras may be given in a configuration segment in front of the resource, in a trailing
/// segment after the id, or both. The last segment carries a `.json` suffix.
#[derive(Debug, Deserialize)]
pub struct StreamPath {
    #[serde(default)]
    config: Option<String>,
    #[serde(rename = "type")]
    content_type: String,
    id: String,
    #[serde(default)]
    extra: Option<String>,
}

impl StreamPath {
    fn id(&self) -> &str {
        match self.extra {
            Some(_) => &self.id,
            None => strip_json(&self.id),
        }
    }

    /// The extras of both segments, which the router already percent-decoded.
    fn extras(&self) -> RequestExtras {
        let configured = self.config.as_deref().map(RequestExtras::parse_decoded);
        let trailing = self
            .extra
            .as_deref()
            .map(|extra| RequestExtras::parse_decoded(strip_json(extra)));

        configured
            .unwrap_or_default()
            .merge(trailing.unwrap_or_default())
    }
}

fn strip_json(segment: &str) -> &str {
    segment.strip_suffix(".json").unwrap_or(segment)
}

pub async fn get_stream(
    extract::State(state): extract::State<AppState>,
    extract::Path(path): extract::Path<StreamPath>,
) -> Result<Response, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_tag("request.type", &path.content_type);
        scope.set_tag("request.configured", path.config.is_some());
    });

    let result = state
        .resolver
        .resolve(&path.content_type, path.id(), &path.extras())
        .await?;

    let cache_control = result.cache_control();
    let mut response = Json(result).into_response();
    if let Some(cache_control) = cache_control {
        let value = HeaderValue::try_from(cache_control).map_err(anyhow::Error::from)?;
        response.headers_mut().insert(CACHE_CONTROL, value);
    }

    Ok(response)
}
