//! Engagement handlers: create, fetch, transition, chat attachment.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, AppState};
use crate::state::transitions::Action;
use crate::types::{EngagementId, EngagementStatus, EngagementView, ParticipantId, VerificationCode};

/// Body for `POST /api/v1/engagements`.
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub initiator: ParticipantId,
    pub recipient: ParticipantId,
}

/// Creates an engagement in `Requested` on the initiator's behalf.
pub async fn create_handler(
    State(app): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> Result<(StatusCode, Json<EngagementView>), ApiError> {
    let initiator = request.initiator.clone();
    let engagement = app.store().create(request.initiator, request.recipient).await?;
    debug!(id = %engagement.id, "engagement created via API");
    Ok((StatusCode::CREATED, Json(engagement.view_for(Some(&initiator)))))
}

/// Query parameters for reads: who is looking.
#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub viewer: Option<ParticipantId>,
}

/// Fetches one engagement, redacted for the viewer.
pub async fn get_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<EngagementView>, ApiError> {
    let engagement = app.store().get(&EngagementId::new(id)).await?;
    Ok(Json(engagement.view_for(query.viewer.as_ref())))
}

/// Body for `POST /api/v1/engagements/{id}/transition`.
///
/// `expected_status` is the optimistic-concurrency precondition: the status
/// the caller last saw. The action and its payload are flattened in, e.g.
/// `{"expected_status": "scheduled", "actor": "alice", "action": "start_verification"}`.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub expected_status: EngagementStatus,
    pub actor: ParticipantId,
    #[serde(flatten)]
    pub action: Action,
}

/// Response to a committed transition.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub engagement: EngagementView,

    /// Present only when the transition minted a code owed to the caller:
    /// the confirmation code for `schedule`, the handshake code for
    /// `start_verification`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disclosed_code: Option<VerificationCode>,
}

/// Applies a guarded transition and fires its side effects after the commit.
pub async fn transition_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let id = EngagementId::new(id);
    let applied = app
        .store()
        .apply_transition(&id, request.expected_status, &request.actor, request.action)
        .await?;

    // Effects run strictly after the commit, detached from the response path;
    // their failure is the dispatcher's problem, never the caller's.
    if !applied.effects.is_empty() {
        let dispatcher = app.dispatcher();
        let engagement = applied.engagement.clone();
        let effects = applied.effects.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&engagement, effects).await;
        });
    }

    Ok(Json(TransitionResponse {
        engagement: applied.engagement.view_for(Some(&request.actor)),
        disclosed_code: applied.disclosed_code,
    }))
}

/// Body for `POST /api/v1/engagements/{id}/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub requested_by: ParticipantId,
}

/// Provisions a chat channel via the external collaborator and attaches the
/// returned reference (once; re-attachment is a conflict).
pub async fn chat_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<EngagementView>, ApiError> {
    let id = EngagementId::new(id);
    let engagement = app.store().get(&id).await?;

    let chat_ref = app
        .chat()
        .create_channel(&engagement.initiator, &engagement.recipient)
        .await?;
    let updated = app.store().attach_chat_ref(&id, chat_ref).await?;

    Ok(Json(updated.view_for(Some(&request.requested_by))))
}
