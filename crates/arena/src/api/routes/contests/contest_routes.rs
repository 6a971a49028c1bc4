use arena_core::Capability;
use axum::{
    extract::State,
    http::StatusCode,
    response::{ErrorResponse, IntoResponse},
    Json,
};
use log::error;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::extractors::{ApiJson, ApiPath, AuthUser},
    domain::{ContestStatusUpdate, CreateContest, DeclareWinner, UpdateContest},
    startup::AppState,
};

pub async fn create_contest(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(body): ApiJson<CreateContest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let creator = auth.require(Capability::AuthorContest)?;

    state
        .contests
        .create_contest(creator, body)
        .await
        .map(|contest| {
            (
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "message": "Contest created successfully",
                    "contest": contest,
                })),
            )
        })
        .map_err(|e| {
            error!("Failed to create contest: {:?}", e);
            e.into()
        })
}

pub async fn get_contest(
    State(state): State<Arc<AppState>>,
    ApiPath(contest_id): ApiPath<Uuid>,
) -> Result<Json<Value>, ErrorResponse> {
    state
        .contests
        .get_contest(contest_id)
        .await
        .map(|contest| Json(json!({ "success": true, "contest": contest })))
        .map_err(|e| {
            error!("Failed to get contest {}: {:?}", contest_id, e);
            e.into()
        })
}

pub async fn update_contest(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(contest_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateContest>,
) -> Result<Json<Value>, ErrorResponse> {
    let creator = auth.require(Capability::AuthorContest)?;

    state
        .contests
        .update_contest(creator, contest_id, body)
        .await
        .map(|contest| {
            Json(json!({
                "success": true,
                "message": "Contest updated and sent back for approval",
                "contest": contest,
            }))
        })
        .map_err(|e| {
            error!("Failed to update contest {}: {:?}", contest_id, e);
            e.into()
        })
}

pub async fn update_contest_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(contest_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<ContestStatusUpdate>,
) -> Result<Json<Value>, ErrorResponse> {
    auth.require(Capability::ModerateContest)?;

    state
        .contests
        .set_status(contest_id, body.status)
        .await
        .map(|contest| {
            Json(json!({
                "success": true,
                "message": format!("Contest status updated to {}", contest.status),
                "contest": contest,
            }))
        })
        .map_err(|e| {
            error!("Failed to update contest {} status: {:?}", contest_id, e);
            e.into()
        })
}

pub async fn declare_winner(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(contest_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<DeclareWinner>,
) -> Result<Json<Value>, ErrorResponse> {
    let creator = auth.require(Capability::DeclareWinner)?;

    state
        .contests
        .declare_winner(creator, contest_id, body.winner_user_id)
        .await
        .map(|contest| {
            Json(json!({
                "success": true,
                "message": "Winner declared successfully",
                "contest": contest,
            }))
        })
        .map_err(|e| {
            error!("Failed to declare winner for contest {}: {:?}", contest_id, e);
            e.into()
        })
}
