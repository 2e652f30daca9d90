//! HTTP server for the engagement core.
//!
//! This module implements the HTTP surface that:
//! - Creates engagements and serves per-viewer reads
//! - Accepts guarded transition requests and fires their side effects
//! - Provisions chat channels through the external collaborator
//! - Serves the participant's display buckets
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /api/v1/engagements` - create an engagement (returns 201)
//! - `GET /api/v1/engagements/{id}` - fetch one engagement, redacted per viewer
//! - `POST /api/v1/engagements/{id}/transition` - apply a guarded transition
//! - `POST /api/v1/engagements/{id}/chat` - provision and attach a chat channel
//! - `GET /api/v1/participants/{participant}/engagements` - display buckets
//! - `GET /health` - returns 200 if the server is running

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub mod engagements;
pub mod health;
pub mod participants;

pub use engagements::{chat_handler, create_handler, get_handler, transition_handler};
pub use health::health_handler;
pub use participants::buckets_handler;

use crate::dispatch::{ChatError, ChatProvisioner, Dispatcher};
use crate::state::transitions::TransitionError;
use crate::store::{EngagementStore, StoreError};

/// Shared application state, passed to all handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// The engagement table and its guarded transitions.
    store: EngagementStore,

    /// Post-commit effect delivery.
    dispatcher: Arc<Dispatcher>,

    /// External chat collaborator.
    chat: Box<dyn ChatProvisioner>,
}

impl AppState {
    pub fn new(
        store: EngagementStore,
        dispatcher: Arc<Dispatcher>,
        chat: Box<dyn ChatProvisioner>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                dispatcher,
                chat,
            }),
        }
    }

    pub fn store(&self) -> &EngagementStore {
        &self.inner.store
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.inner.dispatcher.clone()
    }

    pub fn chat(&self) -> &dyn ChatProvisioner {
        self.inner.chat.as_ref()
    }
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            // The loser of a race refetches and retries.
            ApiError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::ChatAlreadyAttached(_)) => StatusCode::CONFLICT,
            // Wrong code, illegal action, wrong actor: the request was
            // well-formed but not processable.
            ApiError::Store(StoreError::Transition(TransitionError::NotParticipant { .. })) => {
                StatusCode::FORBIDDEN
            }
            ApiError::Store(StoreError::Transition(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(StoreError::SameParticipant)
            | ApiError::Store(StoreError::EmptyParticipant)
            | ApiError::Store(StoreError::ChatBeforeAcceptance(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Chat(_) => StatusCode::BAD_GATEWAY,
        };

        (status, self.to_string()).into_response()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/api/v1/engagements", post(create_handler))
        .route("/api/v1/engagements/{id}", get(get_handler))
        .route("/api/v1/engagements/{id}/transition", post(transition_handler))
        .route("/api/v1/engagements/{id}/chat", post(chat_handler))
        .route(
            "/api/v1/participants/{participant}/engagements",
            get(buckets_handler),
        )
        .route("/health", get(health_handler))
        .with_state(app_state)
}
