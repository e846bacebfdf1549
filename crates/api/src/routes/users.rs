//! Author profiles mirrored from the user service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{AuthorProfile, PricingProfile};
use inventory::{InventoryError, UserDirectory};
use inventory_store::InventoryStore;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct PutUserRequest {
    pub name: String,
    #[serde(default = "default_confirmed")]
    pub confirmed: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub pricing: PricingProfile,
}

fn default_confirmed() -> bool {
    true
}

/// PUT /users/{id}: creates or replaces an author profile.
#[tracing::instrument(skip(state, req))]
pub async fn put<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<PutUserRequest>,
) -> Result<Json<AuthorProfile>, ApiError> {
    let profile = AuthorProfile {
        id: parse_id(&id)?,
        name: req.name,
        confirmed: req.confirmed,
        banned: req.banned,
        pricing: req.pricing,
    };
    state.users.insert(profile.clone()).await;
    Ok(Json(profile))
}

/// GET /users/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AuthorProfile>, ApiError> {
    let id = parse_id(&id)?;
    let profile = state
        .users
        .get_author(id)
        .await
        .ok_or(InventoryError::UserNotFound(id))?;
    Ok(Json(profile))
}
