use axum::extract;
use axum::response::Json;
use serde::Serialize;

use streampick_service::types::ContentType;

use super::AppState;

/// The addon manifest, describing which requests this service answers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<&'static str>,
    pub types: Vec<&'static str>,
    pub id_prefixes: Vec<&'static str>,
    pub catalogs: Vec<()>,
    pub behavior_hints: ManifestHints,
}

#[derive(Debug, Serialize)]
pub struct ManifestHints {
    pub configurable: bool,
}

pub async fn get_manifest(extract::State(state): extract::State<AppState>) -> Json<Manifest> {
    let addon = &state.addon;

    Json(Manifest {
        id: addon.id.clone(),
        version: addon.version.clone(),
        name: addon.name.clone(),
        description: addon.description.clone(),
        resources: vec!["stream"],
        types: vec![ContentType::Movie.as_str(), ContentType::Series.as_str()],
        id_prefixes: vec!["tt", "kitsu"],
        catalogs: vec![],
        behavior_hints: ManifestHints { configurable: true },
    })
}
