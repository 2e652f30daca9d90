//! Per-participant display buckets.
//!
//! The read model behind the main list view: every engagement the
//! participant is party to, grouped by the classifier into pending /
//! upcoming / past. Declined, withdrawn, and cancelled engagements are
//! excluded entirely.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use super::{ApiError, AppState};
use crate::classify::{DisplayBucket, classify};
use crate::types::{EngagementView, ParticipantId};

/// Response for `GET /api/v1/participants/{participant}/engagements`.
#[derive(Debug, Serialize)]
pub struct BucketsResponse {
    pub pending: Vec<EngagementView>,
    pub upcoming: Vec<EngagementView>,
    pub past: Vec<EngagementView>,
}

/// Groups the participant's engagements into display buckets, redacted for
/// that participant.
pub async fn buckets_handler(
    State(app): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<BucketsResponse>, ApiError> {
    let participant = ParticipantId::new(participant);
    let now = app.store().now();

    let mut response = BucketsResponse {
        pending: Vec::new(),
        upcoming: Vec::new(),
        past: Vec::new(),
    };

    for engagement in app.store().list_for_participant(&participant).await {
        let view = engagement.view_for(Some(&participant));
        match classify(&engagement, now) {
            Some(DisplayBucket::Pending) => response.pending.push(view),
            Some(DisplayBucket::Upcoming) => response.upcoming.push(view),
            Some(DisplayBucket::Past) => response.past.push(view),
            None => {}
        }
    }

    Ok(Json(response))
}
