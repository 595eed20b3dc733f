use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::debug;

use super::{
    AppState,
    error::{ApiError, ApiResult},
    models::{
        AliasBinding, Dataset, DatasetList, DatasetResponse, DatasetSummary, HealthResponse,
        RegisterDatasetRequest, ShutdownResponse,
    },
};
use crate::registry::ResolvedVia;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.lifecycle.health(),
    })
}

/// Acknowledges immediately; the drain runs on its own task.
pub async fn shutdown(State(state): State<AppState>) -> (StatusCode, Json<ShutdownResponse>) {
    let ack = state.lifecycle.initiate_shutdown();

    (
        StatusCode::ACCEPTED,
        Json(ShutdownResponse {
            acknowledged: true,
            status: state.lifecycle.health(),
            already_in_progress: ack.already_in_progress(),
        }),
    )
}

pub async fn list_datasets(State(state): State<AppState>) -> ApiResult<Json<DatasetList>> {
    let datasets = state
        .registry
        .list()?
        .iter()
        .map(|(entry, aliases)| DatasetSummary::from_entry(entry, aliases.clone()))
        .collect();

    Ok(Json(DatasetList { datasets }))
}

pub async fn register_dataset(
    State(state): State<AppState>,
    Json(payload): Json<RegisterDatasetRequest>,
) -> ApiResult<(StatusCode, Json<DatasetSummary>)> {
    state.lifecycle.ensure_running()?;

    let request = payload.normalized();
    let dataset = Dataset { data: request.data };

    let identifier = match (request.identifier.as_deref(), request.alias.as_deref()) {
        (identifier, Some(alias)) => {
            state
                .registry
                .register_with_alias(identifier, alias, dataset)?
        }
        (Some(identifier), None) => {
            state.registry.register(identifier, dataset)?;
            identifier.to_string()
        }
        (None, None) => state.registry.register_next(dataset)?,
    };

    let found = state.registry.get_by_reference(&identifier)?;

    Ok((
        StatusCode::CREATED,
        Json(DatasetSummary::from_entry(&found.entry, found.aliases)),
    ))
}

pub async fn get_dataset(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<Json<DatasetResponse>> {
    let found = state.registry.get_by_reference(&reference)?;
    if found.resolution.via == ResolvedVia::Alias {
        debug!(alias = %reference, identifier = %found.resolution.identifier, "resolved alias");
    }

    Ok(Json(DatasetResponse {
        summary: DatasetSummary::from_entry(&found.entry, found.aliases),
        resolved_via: found.resolution.via,
        data: found.entry.payload.data.clone(),
    }))
}

pub async fn delete_dataset(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> ApiResult<StatusCode> {
    let resolution = state.registry.resolve(&reference)?;
    state.registry.deregister(&resolution.identifier)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bind_alias(
    State(state): State<AppState>,
    Path((reference, alias)): Path<(String, String)>,
) -> ApiResult<Json<AliasBinding>> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Err(ApiError::input("alias cannot be blank"));
    }

    let resolution = state.registry.resolve(&reference)?;
    state.registry.bind_alias(alias, &resolution.identifier)?;

    Ok(Json(AliasBinding {
        alias: alias.to_string(),
        identifier: resolution.identifier,
    }))
}

pub async fn resolve_alias(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> ApiResult<Json<AliasBinding>> {
    let identifier = state.registry.resolve_alias(&alias)?;
    Ok(Json(AliasBinding { alias, identifier }))
}

pub async fn unbind_alias(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> ApiResult<StatusCode> {
    state.registry.unbind_alias(&alias)?;
    Ok(StatusCode::NO_CONTENT)
}
