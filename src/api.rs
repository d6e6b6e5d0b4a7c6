//! HTTP API endpoints.
//!
//! Public routes read the catalog through the cache and drive the game
//! session. Admin routes edit the catalog behind the password gate and drop
//! whatever cached data they touch.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth;
use crate::catalog::{CatalogError, CatalogSnapshot, QuestionSource};
use crate::llm::LlmError;
use crate::session::{SessionError, SessionSnapshot, SettingsUpdate};
use crate::state::AppState;
use crate::types::*;

/// Error returned by any handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn catalog_status(error: &CatalogError) -> StatusCode {
    match error {
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::Invalid(_) => StatusCode::BAD_REQUEST,
        CatalogError::Conflict(_) => StatusCode::CONFLICT,
        CatalogError::Generation(_) => StatusCode::BAD_GATEWAY,
        CatalogError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Catalog(e) => catalog_status(e),
            ApiError::Session(e) => match e {
                SessionError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                SessionError::InvalidTransition { .. }
                | SessionError::NotActive
                | SessionError::Superseded => StatusCode::CONFLICT,
                SessionError::Fetch(CatalogError::NotFound(_)) => StatusCode::NOT_FOUND,
                SessionError::Fetch(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/categories", post(create_category))
        .route(
            "/categories/{category}",
            put(update_category).delete(delete_category),
        )
        .route("/categories/{category}/questions", post(create_question))
        .route("/categories/{category}/generate", post(generate_questions))
        .route("/categories/{category}/sanitize", post(sanitize_category))
        .route(
            "/questions/{question}",
            put(update_question).delete(delete_question),
        )
        .route("/catalog/export", get(export_catalog))
        .route("/catalog/import", post(import_catalog))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/api/categories", get(list_categories))
        .route("/api/categories/{name}/questions", get(list_questions))
        .route("/api/game", get(get_game))
        .route("/api/game/start", post(start_game))
        .route("/api/game/next", post(next_question))
        .route("/api/game/end", post(end_game))
        .route("/api/game/reset", post(reset_game))
        .route("/api/game/summary", post(show_summary))
        .route("/api/game/settings", put(update_settings))
        .route("/api/game/players", put(set_players))
        .nest("/api/admin", admin)
        .with_state(state)
}

// =============================================================================
// Catalog reads
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.pool().categories(query.refresh).await?))
}

/// GET /api/categories/{name}/questions
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<Question>>> {
    let category = state.pool().find_category(&name).await?;
    Ok(Json(
        state.pool().questions_for(&category, query.refresh).await?,
    ))
}

// =============================================================================
// Game session
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartGameRequest {
    pub category: String,
    pub mode: Option<GameMode>,
    pub how_many: Option<HowMany>,
    pub preset_count: Option<u32>,
    pub time_per_round_seconds: Option<u32>,
    pub pairing: Option<Pairing>,
}

#[derive(Debug, Deserialize)]
pub struct PlayersRequest {
    pub player1: String,
    pub player2: String,
}

/// GET /api/game
pub async fn get_game(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.game.snapshot().await)
}

/// POST /api/game/start
///
/// Fields left out keep the values currently configured on the session.
pub async fn start_game(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartGameRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let current = state.game.snapshot().await.config;
    let config = GameConfig {
        mode: request.mode.unwrap_or(current.mode),
        how_many: request.how_many.unwrap_or(current.how_many),
        preset_count: request.preset_count.unwrap_or(current.preset_count),
        time_per_round_seconds: request
            .time_per_round_seconds
            .unwrap_or(current.time_per_round_seconds),
        pairing: request.pairing.unwrap_or(current.pairing),
    };

    Ok(Json(state.game.start_game(&request.category, config).await?))
}

/// POST /api/game/next
pub async fn next_question(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.game.next_question().await?))
}

/// POST /api/game/end
pub async fn end_game(State(state): State<Arc<AppState>>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.game.end_game().await?))
}

/// POST /api/game/reset
pub async fn reset_game(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.game.reset_game().await)
}

/// POST /api/game/summary
pub async fn show_summary(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.game.show_summary().await?))
}

/// PUT /api/game/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.game.update_settings(update).await?))
}

/// PUT /api/game/players
pub async fn set_players(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlayersRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(
        state
            .game
            .set_players(&request.player1, &request.player2)
            .await?,
    ))
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionTextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuestionsRequest {
    pub count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub categories: usize,
    pub questions: usize,
}

/// POST /api/admin/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state
        .catalog
        .create_category(&request.name, &request.description)
        .await?;
    state.pool().invalidate_categories();
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/admin/categories/{id}
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCategoryRequest>,
) -> ApiResult<Json<Category>> {
    let category = state
        .catalog
        .update_category(&id, request.name.as_deref(), request.description.as_deref())
        .await?;
    state.invalidate_category(&id);
    Ok(Json(category))
}

/// DELETE /api/admin/categories/{id}
///
/// Also deletes the category's questions.
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Category>> {
    let category = state.catalog.delete_category(&id).await?;
    state.invalidate_category(&id);
    Ok(Json(category))
}

/// POST /api/admin/categories/{id}/questions
pub async fn create_question(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<String>,
    Json(request): Json<QuestionTextRequest>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let question = state
        .catalog
        .create_question(&category_id, &request.text)
        .await?;
    state.invalidate_category(&category_id);
    Ok((StatusCode::CREATED, Json(question)))
}

/// PUT /api/admin/questions/{id}
pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<QuestionTextRequest>,
) -> ApiResult<Json<Question>> {
    let question = state
        .catalog
        .update_question_text(&id, &request.text)
        .await?;
    state.invalidate_category(&question.category_id);
    Ok(Json(question))
}

/// DELETE /api/admin/questions/{id}
pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Question>> {
    let question = state.catalog.delete_question(&id).await?;
    state.invalidate_category(&question.category_id);
    Ok(Json(question))
}

/// POST /api/admin/categories/{id}/generate
///
/// Runs in the background; clients re-fetch the category afterwards.
pub async fn generate_questions(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<String>,
    Json(request): Json<GenerateQuestionsRequest>,
) -> ApiResult<StatusCode> {
    if request.count == 0 {
        return Err(CatalogError::Invalid(
            "Number of new questions must be at least 1".to_string(),
        )
        .into());
    }
    if !state.catalog.can_generate() {
        return Err(CatalogError::from(LlmError::ConfigError(
            "No LLM providers configured".to_string(),
        ))
        .into());
    }
    let category = state.catalog.get_category(&category_id).await?;

    let state_clone = state.clone();
    tokio::spawn(async move {
        match state_clone
            .catalog
            .generate_questions(&category.id, request.count)
            .await
        {
            Ok(created) => {
                state_clone.invalidate_category(&category.id);
                tracing::info!("Generated {} questions for {}", created.len(), category.name);
            }
            Err(e) => {
                tracing::error!("Question generation for {} failed: {}", category.name, e);
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// POST /api/admin/categories/{name}/sanitize
///
/// Returns the cleaned questions and replaces the cached copy with them.
pub async fn sanitize_category(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<Question>>> {
    let category = state.pool().find_category(&name).await?;
    let cleaned = state.pool().sanitize_category(&category).await?;
    state.pool().invalidate_categories();
    Ok(Json(cleaned))
}

/// GET /api/admin/catalog/export
pub async fn export_catalog(State(state): State<Arc<AppState>>) -> Json<CatalogSnapshot> {
    Json(state.catalog.export_snapshot().await)
}

/// POST /api/admin/catalog/import
///
/// Replaces the whole catalog.
pub async fn import_catalog(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<CatalogSnapshot>,
) -> ApiResult<Json<ImportResponse>> {
    let before = state.catalog.fetch_categories().await?;
    state.catalog.import_snapshot(snapshot).await?;
    let after = state.catalog.fetch_categories().await?;

    for category in before.iter().chain(after.iter()) {
        state.invalidate_category(&category.id);
    }

    Ok(Json(ImportResponse {
        categories: after.len(),
        questions: after.iter().map(|c| c.questions.len()).sum(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::from(CatalogError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (ApiError::from(CatalogError::Invalid("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(CatalogError::Conflict("x".into())), StatusCode::CONFLICT),
            (
                ApiError::from(CatalogError::Generation(LlmError::ApiError("x".into()))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(SessionError::InvalidConfig("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::from(SessionError::NotActive), StatusCode::CONFLICT),
            (
                ApiError::from(SessionError::Fetch(CatalogError::Unavailable("x".into()))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::from(SessionError::Fetch(CatalogError::NotFound("x".into()))),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{}", error);
        }
    }
}
