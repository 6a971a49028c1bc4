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
    domain::{AdmitRequest, UpdateSubmission},
    startup::AppState,
};

pub async fn join_contest(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(body): ApiJson<AdmitRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let participant = auth.require(Capability::JoinContest)?;

    state
        .admission
        .admit(participant, body)
        .await
        .map(|submission| {
            (
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "message": "Joined contest successfully",
                    "submission": submission,
                })),
            )
        })
        .map_err(|e| {
            error!("Failed to join contest: {:?}", e);
            e.into()
        })
}

pub async fn my_participations(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Value>, ErrorResponse> {
    let participant = &auth.0;

    state
        .admission
        .my_participations(participant)
        .await
        .map(|submissions| {
            Json(json!({
                "success": true,
                "count": submissions.len(),
                "data": submissions,
            }))
        })
        .map_err(|e| {
            error!(
                "Failed to fetch participations for {}: {:?}",
                participant.user_id, e
            );
            e.into()
        })
}

pub async fn contest_submissions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(contest_id): ApiPath<Uuid>,
) -> Result<Json<Value>, ErrorResponse> {
    let creator = auth.require(Capability::ReviewSubmissions)?;

    state
        .admission
        .contest_submissions(creator, contest_id)
        .await
        .map(|submissions| {
            Json(json!({
                "success": true,
                "count": submissions.len(),
                "data": submissions,
            }))
        })
        .map_err(|e| {
            error!("Failed to fetch submissions for contest {}: {:?}", contest_id, e);
            e.into()
        })
}

pub async fn update_submission(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(participation_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateSubmission>,
) -> Result<Json<Value>, ErrorResponse> {
    let participant = auth.require(Capability::EditSubmission)?;

    state
        .admission
        .update_submission(participant, participation_id, body)
        .await
        .map(|submission| {
            Json(json!({
                "success": true,
                "message": "Submission updated successfully",
                "submission": submission,
            }))
        })
        .map_err(|e| {
            error!("Failed to update submission {}: {:?}", participation_id, e);
            e.into()
        })
}
