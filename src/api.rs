//! HTTP API for members and the admin surface.
//!
//! Member routes identify the caller through [`CurrentUser`]; admin routes sit
//! behind [`admin_auth_middleware`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::auth::{admin_auth_middleware, AuthConfig, CurrentUser};
use crate::error::{ApiError, GameError};
use crate::notify::BroadcastNotifier;
use crate::scheduler::TickReport;
use crate::state::{
    CurrentRound, EditionPatch, GameService, LeaderboardEntry, RoundSummary, VoteReceipt,
};
use crate::store::{MemoryStore, StoreSnapshot};
use crate::types::*;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: GameService,
    /// Source of the per-group event streams
    pub events: BroadcastNotifier,
    /// Set when running on the in-memory store; enables export/import
    pub snapshots: Option<MemoryStore>,
    /// Lowercased name of the identity header
    pub user_header: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub edition_id: EditionId,
}

#[derive(Debug, Deserialize)]
pub struct RenameGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// `null` abstains
    pub target_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEditionRequest {
    pub name: String,
    pub slug: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StatementRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Build the full router; callers add tracing/CORS layers
pub fn router(state: AppState, auth_config: Arc<AuthConfig>) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/editions", get(list_editions).post(create_edition))
        .route(
            "/api/admin/editions/{id}",
            patch(update_edition).delete(delete_edition),
        )
        .route(
            "/api/admin/editions/{id}/statements",
            get(list_statements).post(create_statement),
        )
        .route(
            "/api/admin/statements/{id}",
            patch(update_statement).delete(delete_statement),
        )
        .route("/api/admin/tick", post(run_tick))
        .route("/api/admin/export", get(export_store))
        .route("/api/admin/import", post(import_store))
        .layer(middleware::from_fn_with_state(
            auth_config,
            admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/groups", get(list_groups).post(create_group))
        .route(
            "/api/groups/{id}",
            get(get_group).patch(rename_group).delete(delete_group),
        )
        .route("/api/groups/{id}/members", post(add_member))
        .route(
            "/api/groups/{id}/members/{user_id}",
            axum::routing::delete(remove_member),
        )
        .route(
            "/api/groups/{id}/rounds",
            get(round_history).post(start_round),
        )
        .route("/api/groups/{id}/rounds/current", get(current_round))
        .route("/api/groups/{id}/leaderboard", get(leaderboard))
        .route("/api/groups/{id}/events", get(group_events))
        .route("/api/rounds/{id}/vote", put(submit_vote).get(my_vote))
        .route("/api/rounds/{id}/result", get(round_result))
        .route(
            "/api/rounds/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// Groups

async fn create_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let group = state
        .service
        .create_group(&user, req.name, &req.edition_id, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn list_groups(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<Group>> {
    Ok(Json(state.service.groups_for_user(&user).await?))
}

async fn get_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> ApiResult<Group> {
    Ok(Json(state.service.get_group(&id, &user).await?))
}

async fn rename_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
    Json(req): Json<RenameGroupRequest>,
) -> ApiResult<Group> {
    Ok(Json(state.service.rename_group(&id, &user, req.name).await?))
}

async fn delete_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_group(&id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<Group> {
    Ok(Json(state.service.add_member(&id, &user, &req.user_id).await?))
}

async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, member_id)): Path<(GroupId, UserId)>,
) -> ApiResult<Group> {
    Ok(Json(
        state.service.remove_member(&id, &user, &member_id).await?,
    ))
}

// Rounds

async fn start_round(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> Result<(StatusCode, Json<Round>), ApiError> {
    let round = state.service.start_round(&id, &user, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

async fn current_round(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> ApiResult<CurrentRound> {
    Ok(Json(state.service.current_round(&id, &user).await?))
}

async fn round_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> ApiResult<Vec<RoundSummary>> {
    Ok(Json(state.service.round_history(&id, &user).await?))
}

async fn leaderboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    state.service.get_group(&id, &user).await?;
    Ok(Json(state.service.leaderboard(&id).await?))
}

/// Server-sent events for one group's round transitions
async fn group_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<GroupId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state.service.get_group(&id, &user).await?;
    let rx = state.events.subscribe();

    let events = stream::unfold((rx, id), |(mut rx, group_id)| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.group_id() == group_id => {
                    match Event::default().event(event.name()).json_data(&event) {
                        Ok(sse) => return Some((Ok(sse), (rx, group_id))),
                        Err(e) => tracing::warn!("Failed to encode event: {}", e),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%group_id, skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn submit_vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<RoundId>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<VoteReceipt> {
    Ok(Json(
        state
            .service
            .submit_vote(&id, &user, req.target_id, Utc::now())
            .await?,
    ))
}

async fn my_vote(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<RoundId>,
) -> ApiResult<Vote> {
    state
        .service
        .my_vote(&id, &user)
        .await?
        .map(Json)
        .ok_or_else(|| GameError::NotFound(format!("no vote on round {}", id)).into())
}

async fn round_result(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<RoundId>,
) -> ApiResult<RoundResult> {
    Ok(Json(state.service.round_result(&id, &user).await?))
}

async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<RoundId>,
) -> ApiResult<Vec<Comment>> {
    Ok(Json(state.service.list_comments(&id, &user).await?))
}

async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<RoundId>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state
        .service
        .add_comment(&id, &user, &req.text, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// Admin

async fn list_editions(State(state): State<AppState>) -> ApiResult<Vec<Edition>> {
    Ok(Json(state.service.list_editions().await?))
}

async fn create_edition(
    State(state): State<AppState>,
    Json(req): Json<CreateEditionRequest>,
) -> Result<(StatusCode, Json<Edition>), ApiError> {
    let edition = state
        .service
        .create_edition(req.name, req.slug, req.active)
        .await?;
    Ok((StatusCode::CREATED, Json(edition)))
}

async fn update_edition(
    State(state): State<AppState>,
    Path(id): Path<EditionId>,
    Json(patch): Json<EditionPatch>,
) -> ApiResult<Edition> {
    Ok(Json(state.service.update_edition(&id, patch).await?))
}

async fn delete_edition(
    State(state): State<AppState>,
    Path(id): Path<EditionId>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_edition(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_statements(
    State(state): State<AppState>,
    Path(id): Path<EditionId>,
) -> ApiResult<Vec<Statement>> {
    Ok(Json(state.service.list_statements(&id).await?))
}

async fn create_statement(
    State(state): State<AppState>,
    Path(id): Path<EditionId>,
    Json(req): Json<StatementRequest>,
) -> Result<(StatusCode, Json<Statement>), ApiError> {
    let statement = state.service.create_statement(&id, req.text).await?;
    Ok((StatusCode::CREATED, Json(statement)))
}

async fn update_statement(
    State(state): State<AppState>,
    Path(id): Path<StatementId>,
    Json(req): Json<StatementRequest>,
) -> ApiResult<Statement> {
    Ok(Json(state.service.update_statement(&id, req.text).await?))
}

async fn delete_statement(
    State(state): State<AppState>,
    Path(id): Path<StatementId>,
) -> ApiResult<Statement> {
    Ok(Json(state.service.delete_statement(&id).await?))
}

/// Run one scheduler pass now
async fn run_tick(State(state): State<AppState>) -> Json<TickReport> {
    Json(state.service.run_tick(Utc::now()).await)
}

fn snapshot_store(state: &AppState) -> Result<&MemoryStore, ApiError> {
    state.snapshots.as_ref().ok_or_else(|| {
        GameError::Validation("export/import is only available with the in-memory store".to_string())
            .into()
    })
}

/// Export the entire store as JSON.
///
/// GET /api/admin/export
async fn export_store(State(state): State<AppState>) -> ApiResult<StoreSnapshot> {
    let store = snapshot_store(&state)?;
    Ok(Json(store.export_snapshot().await))
}

/// Replace the entire store with a snapshot.
///
/// POST /api/admin/import
async fn import_store(
    State(state): State<AppState>,
    Json(snapshot): Json<StoreSnapshot>,
) -> Result<impl IntoResponse, ApiError> {
    let store = snapshot_store(&state)?;
    match store.import_snapshot(snapshot).await {
        Ok(()) => Ok((StatusCode::OK, "Snapshot imported successfully")),
        Err(e) => {
            tracing::error!("Snapshot import failed: {}", e);
            Err(GameError::Validation(format!("import failed: {}", e)).into())
        }
    }
}
