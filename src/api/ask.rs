//! Ask endpoint
//!
//! The inbound trigger for the dispatcher: a client posts the selected
//! text, the relay answers with the dispatch outcome. Failure to get an
//! answer out of any key is not an HTTP error; it comes back as
//! `ok = false` with the message to display.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::server::state::AppState;

/// Request body for POST /ask
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// The user's text (originally a page selection)
    pub text: String,
}

/// Response body for POST /ask
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub ok: bool,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_position: Option<usize>,
}

/// POST /ask
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, RelayError> {
    let outcome = state.relay.ask(&request.text).await?;

    Ok(Json(AskResponse {
        ok: outcome.ok,
        answer: outcome.text,
        used_position: outcome.used_position,
    }))
}

/// Response body for GET /history
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub question: Option<String>,
    pub answer: Option<String>,
}

/// GET /history
pub async fn history(
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, RelayError> {
    let (question, answer) = state.relay.last_exchange().await?;
    Ok(Json(HistoryResponse { question, answer }))
}
