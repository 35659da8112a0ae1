//! Poll lifecycle and voting endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::header,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use pollo_common::{AppError, AppResult};
use pollo_core::services::{
    DEFAULT_VOTERS_LIMIT,
    poll::{CreatePollInput, PollWithOptions},
    results::{OptionResult, RecentVoter},
    vote::{VoteReceipt, VoteStatus, VoterIdentity},
};
use pollo_db::entities::{poll, user};
use serde::{Deserialize, Serialize};

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    rate_limit::{self, RateLimiterState},
    response::ApiResponse,
};

/// Upper bound (and default) for poll list pages.
const MAX_LIST_LIMIT: u64 = 50;

const fn default_list_limit() -> u64 {
    MAX_LIST_LIMIT
}

/// A poll with its options and share links.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetailResponse {
    #[serde(flatten)]
    pub poll: PollWithOptions,
    pub share_url: String,
    pub embed_url: String,
}

/// Create a new poll.
async fn create_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreatePollInput>,
) -> AppResult<ApiResponse<PollDetailResponse>> {
    let created = state.poll_service.create(&user, input).await?;
    let poll_id = created.poll.id.clone();

    Ok(ApiResponse::ok(PollDetailResponse {
        poll: created,
        share_url: state.poll_service.share_url(&poll_id),
        embed_url: state.poll_service.embed_url(&poll_id),
    }))
}

/// Show poll request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPollRequest {
    pub poll_id: String,
    /// Anonymous voter id, for callers without an account.
    pub voter_id: Option<String>,
}

/// Full poll view: live results plus the caller's voting state.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPollResponse {
    #[serde(flatten)]
    pub poll: poll::Model,
    pub options: Vec<OptionResult>,
    pub vote_status: VoteStatus,
    pub share_url: String,
    pub embed_url: String,
}

/// Get a poll with aggregated results and the caller's prior choices.
async fn show_poll(
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ShowPollRequest>,
) -> AppResult<ApiResponse<ShowPollResponse>> {
    let detail = state.poll_service.get(&req.poll_id).await?;
    let results = pollo_core::ResultsService::project(&detail.poll, detail.options);

    let vote_status = match voter_id_of(maybe_user.as_ref(), req.voter_id.as_deref()) {
        Some(voter_id) => state.vote_service.vote_status(&req.poll_id, &voter_id).await?,
        None => VoteStatus {
            has_voted: false,
            option_ids: Vec::new(),
        },
    };

    Ok(ApiResponse::ok(ShowPollResponse {
        poll: detail.poll,
        options: results.options,
        vote_status,
        share_url: state.poll_service.share_url(&req.poll_id),
        embed_url: state.poll_service.embed_url(&req.poll_id),
    }))
}

/// Toggle open request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TogglePollRequest {
    pub poll_id: String,
}

/// Open or close a poll (creator only).
async fn toggle_open(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TogglePollRequest>,
) -> AppResult<ApiResponse<poll::Model>> {
    let updated = state.poll_service.toggle_open(&req.poll_id, &user.id).await?;

    Ok(ApiResponse::ok(updated))
}

/// Delete poll request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePollRequest {
    pub poll_id: String,
}

/// Delete poll response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePollResponse {
    pub ok: bool,
}

/// Delete a poll and everything under it (creator only).
async fn delete_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<DeletePollRequest>,
) -> AppResult<ApiResponse<DeletePollResponse>> {
    state.poll_service.delete(&req.poll_id, &user.id).await?;

    Ok(ApiResponse::ok(DeletePollResponse { ok: true }))
}

/// My polls request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyPollsRequest {
    #[serde(default = "default_list_limit")]
    pub limit: u64,
    /// Return polls older than this id.
    pub until_id: Option<String>,
}

/// List the caller's polls, newest first.
async fn my_polls(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<MyPollsRequest>,
) -> AppResult<ApiResponse<Vec<poll::Model>>> {
    let limit = req.limit.min(MAX_LIST_LIMIT);
    let polls = state
        .poll_service
        .get_user_polls(&user.id, limit, req.until_id.as_deref())
        .await?;

    Ok(ApiResponse::ok(polls))
}

/// Recent polls request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentPollsRequest {
    #[serde(default = "default_list_limit")]
    pub limit: u64,
    pub until_id: Option<String>,
    /// Title/description substring filter.
    pub search: Option<String>,
}

/// List the latest polls, optionally filtered by a search query.
async fn recent_polls(
    State(state): State<AppState>,
    Json(req): Json<RecentPollsRequest>,
) -> AppResult<ApiResponse<Vec<poll::Model>>> {
    let limit = req.limit.min(MAX_LIST_LIMIT);

    let query = req.search.as_deref().map(str::trim).unwrap_or_default();
    let polls = if query.is_empty() {
        state
            .poll_service
            .get_recent(limit, req.until_id.as_deref())
            .await?
    } else {
        state.poll_service.search(query, limit).await?
    };

    Ok(ApiResponse::ok(polls))
}

/// Voters request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotersRequest {
    pub poll_id: String,
    pub limit: Option<u64>,
}

/// List recent voters for a poll, newest first.
///
/// Hidden voter lists are visible to the creator only.
async fn voters(
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<VotersRequest>,
) -> AppResult<ApiResponse<Vec<RecentVoter>>> {
    let requester = maybe_user.as_ref().map(|u| u.id.as_str());
    let limit = req
        .limit
        .unwrap_or(DEFAULT_VOTERS_LIMIT)
        .min(MAX_LIST_LIMIT);

    let voters = state
        .results_service
        .recent_voters(&req.poll_id, requester, limit)
        .await?;

    Ok(ApiResponse::ok(voters))
}

/// Vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub poll_id: String,
    /// Selected options; more than one only when the poll allows it.
    pub option_ids: Vec<String>,
    /// Anonymous voter id, required when not signed in.
    pub voter_id: Option<String>,
}

/// Cast a vote.
async fn vote(
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteReceipt>> {
    let identity = match maybe_user {
        Some(user) => VoterIdentity::from_user(&user),
        None => {
            let anon_id = req.voter_id.ok_or_else(|| {
                AppError::BadRequest("A voter id is required for anonymous voting".to_string())
            })?;
            VoterIdentity::anonymous(anon_id)?
        }
    };

    let receipt = state
        .vote_service
        .submit(&req.poll_id, req.option_ids, &identity)
        .await?;

    Ok(ApiResponse::ok(receipt))
}

/// Has-voted request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HasVotedRequest {
    pub poll_id: String,
    pub voter_id: Option<String>,
}

/// Check whether the caller has voted in a poll.
///
/// A hint for clients; the authoritative check happens on submission.
async fn has_voted(
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<HasVotedRequest>,
) -> AppResult<ApiResponse<VoteStatus>> {
    let status = match voter_id_of(maybe_user.as_ref(), req.voter_id.as_deref()) {
        Some(voter_id) => state.vote_service.vote_status(&req.poll_id, &voter_id).await?,
        None => VoteStatus {
            has_voted: false,
            option_ids: Vec::new(),
        },
    };

    Ok(ApiResponse::ok(status))
}

/// Export request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub poll_id: String,
}

/// Download a poll's votes as a CSV attachment.
async fn export_csv(
    MaybeAuthUser(maybe_user): MaybeAuthUser,
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> AppResult<Response> {
    let requester = maybe_user.as_ref().map(|u| u.id.as_str());
    let export = state
        .export_service
        .export_csv(&req.poll_id, requester)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.content,
    )
        .into_response())
}

/// The id a voter's rows are keyed by: the account id when signed in,
/// otherwise the client-supplied anonymous id.
fn voter_id_of(user: Option<&user::Model>, anon_id: Option<&str>) -> Option<String> {
    user.map(|u| u.id.clone())
        .or_else(|| anon_id.map(ToString::to_string))
}

pub fn router(rate_limiter: RateLimiterState) -> Router<AppState> {
    let mutations = Router::new()
        .route("/create", post(create_poll))
        .route("/toggle-open", post(toggle_open))
        .route("/delete", post(delete_poll))
        .route("/vote", post(vote))
        .route_layer(middleware::from_fn_with_state(
            rate_limiter.clone(),
            rate_limit::rate_limit_write_middleware,
        ));

    let exports = Router::new()
        .route("/export", post(export_csv))
        .route_layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit::rate_limit_heavy_middleware,
        ));

    Router::new()
        .route("/show", post(show_poll))
        .route("/mine", post(my_polls))
        .route("/recent", post(recent_polls))
        .route("/voters", post(voters))
        .route("/has-voted", post(has_voted))
        .merge(mutations)
        .merge(exports)
}
