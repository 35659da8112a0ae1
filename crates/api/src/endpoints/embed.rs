//! Embeddable widget endpoints.
//!
//! A trimmed-down surface for polls rendered inside third-party pages:
//! a reduced poll view and a single-option vote. Embed votes are always
//! anonymous and land in the same tally transaction as regular votes.

use axum::{Json, Router, extract::State, routing::post};
use pollo_common::{AppError, AppResult};
use pollo_core::services::{
    ResultsService,
    results::OptionResult,
    vote::{VoteReceipt, VoterIdentity},
};
use serde::{Deserialize, Serialize};

use crate::{middleware::AppState, response::ApiResponse};

/// Voter id used when the embedding page supplies none.
const DEFAULT_EMBED_VOTER: &str = "embed_user";

/// Embed show request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedShowRequest {
    pub poll_id: String,
}

/// Reduced poll view for embeds.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedPollResponse {
    pub poll_id: String,
    pub title: String,
    pub is_open: bool,
    pub allow_multiple: bool,
    pub require_login: bool,
    pub total_votes: i32,
    pub options: Vec<OptionResult>,
}

/// Get the reduced poll view for an embed.
async fn show_embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedShowRequest>,
) -> AppResult<ApiResponse<EmbedPollResponse>> {
    let detail = state.poll_service.get(&req.poll_id).await?;
    let results = ResultsService::project(&detail.poll, detail.options);

    Ok(ApiResponse::ok(EmbedPollResponse {
        poll_id: detail.poll.id,
        title: detail.poll.title,
        is_open: detail.poll.is_open,
        allow_multiple: detail.poll.allow_multiple,
        require_login: detail.poll.require_login,
        total_votes: detail.poll.total_votes,
        options: results.options,
    }))
}

/// Embed vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedVoteRequest {
    pub poll_id: String,
    /// Embeds vote for exactly one option.
    pub option_id: String,
    pub voter_id: Option<String>,
}

/// Cast an anonymous vote from an embed.
async fn vote_embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedVoteRequest>,
) -> AppResult<ApiResponse<VoteReceipt>> {
    let detail = state.poll_service.get(&req.poll_id).await?;
    if detail.poll.require_login {
        return Err(AppError::Unauthorized);
    }

    // Embed voters share a default id, so the repeat-voter gate is
    // skipped; the widget tracks has-voted state client-side.
    let anon_id = req
        .voter_id
        .unwrap_or_else(|| DEFAULT_EMBED_VOTER.to_string());
    let identity = VoterIdentity::anonymous(anon_id)?;

    let receipt = state
        .vote_service
        .cast(&req.poll_id, vec![req.option_id], &identity)
        .await?;

    Ok(ApiResponse::ok(receipt))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/show", post(show_embed))
        .route("/vote", post(vote_embed))
}
