//! Administrative HTTP handlers.
//!
//! ```text
//! POST   /api/v1/admin/groups/{group_id}/prompts       Create this week's prompt
//! POST   /api/v1/admin/prompts/{prompt_id}/reminders   Send a manual reminder
//! POST   /api/v1/admin/prompts/{prompt_id}/suggestions Recompute suggestions
//! DELETE /api/v1/admin/tokens/{token_id}               Revoke a magic-link token
//! GET    /api/v1/admin/analytics/tokens                Token validation summary
//! ```
//!
//! Admin authorisation happens at the gateway; these handlers trust the
//! forwarded identity.

use actix_web::{HttpResponse, delete, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ports::AnalyticsRepositoryError;
use crate::domain::{
    AnalyticsSummary, Error, GroupId, PromptId, PromptOverrides, TokenId, UserId,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::availability::{PromptView, SuggestionView};
use crate::inbound::http::state::HttpState;

/// Optional body for manual prompt creation; unset fields use the group's
/// settings defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePromptRequest {
    pub deadline: Option<DateTime<Utc>>,
    pub auto_schedule: Option<bool>,
    pub blind_voting: Option<bool>,
    pub custom_message: Option<String>,
}

/// Optional body narrowing a reminder to one member.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderRequest {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRoundResponse {
    pub reminded: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummaryResponse {
    pub attempts: u64,
    pub successes: u64,
    pub grace_uses: u64,
    pub invalid_token: u64,
    pub token_not_found: u64,
    pub token_revoked: u64,
    pub token_expired: u64,
}

impl From<AnalyticsSummary> for AnalyticsSummaryResponse {
    fn from(summary: AnalyticsSummary) -> Self {
        Self {
            attempts: summary.attempts,
            successes: summary.successes,
            grace_uses: summary.grace_uses,
            invalid_token: summary.invalid_token,
            token_not_found: summary.token_not_found,
            token_revoked: summary.token_revoked,
            token_expired: summary.token_expired,
        }
    }
}

fn map_analytics_error(error: AnalyticsRepositoryError) -> Error {
    match error {
        AnalyticsRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("analytics store unavailable: {message}"))
        }
        AnalyticsRepositoryError::Query { message } => {
            Error::internal(format!("analytics query failed: {message}"))
        }
    }
}

/// Create (or replace) the current week's prompt for a group, mailing fresh
/// form links to every active member.
#[post("/admin/groups/{group_id}/prompts")]
pub async fn trigger_prompt(
    state: web::Data<HttpState>,
    path: web::Path<Uuid>,
    body: Option<web::Json<CreatePromptRequest>>,
) -> ApiResult<HttpResponse> {
    let group_id = GroupId::from_uuid(path.into_inner());
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    let overrides = PromptOverrides {
        deadline: request.deadline,
        auto_schedule: request.auto_schedule,
        blind_voting: request.blind_voting,
        custom_message: request.custom_message,
    };
    let prompt = state.orchestrator.manual_trigger(&group_id, overrides).await?;
    Ok(HttpResponse::Created().json(PromptView::from(&prompt)))
}

/// Send an out-of-band reminder, to one member or to everyone still owing a
/// response.
#[post("/admin/prompts/{prompt_id}/reminders")]
pub async fn send_reminders(
    state: web::Data<HttpState>,
    path: web::Path<Uuid>,
    body: Option<web::Json<ReminderRequest>>,
) -> ApiResult<HttpResponse> {
    let prompt_id = PromptId::from_uuid(path.into_inner());
    let target = body
        .map(web::Json::into_inner)
        .unwrap_or_default()
        .user_id
        .map(UserId::from_uuid);
    let reminded = state
        .orchestrator
        .manual_reminder(&prompt_id, target.as_ref())
        .await?;
    Ok(HttpResponse::Ok().json(ReminderRoundResponse { reminded }))
}

/// Recompute an open prompt's suggestion set from current responses.
#[post("/admin/prompts/{prompt_id}/suggestions")]
pub async fn recompute_suggestions(
    state: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let prompt_id = PromptId::from_uuid(path.into_inner());
    let suggestions = state.availability.recompute(&prompt_id).await?;
    let views: Vec<SuggestionView> = suggestions.iter().map(SuggestionView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

/// Revoke a single magic-link token.
#[delete("/admin/tokens/{token_id}")]
pub async fn revoke_token(
    state: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let token_id = TokenId::from_uuid(path.into_inner());
    if state.tokens.revoke(&token_id).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(Error::not_found(format!("token {token_id} does not exist")))
    }
}

/// Aggregate token validation analytics.
#[get("/admin/analytics/tokens")]
pub async fn analytics_summary(state: web::Data<HttpState>) -> ApiResult<HttpResponse> {
    let summary = state
        .analytics
        .summary()
        .await
        .map_err(map_analytics_error)?;
    Ok(HttpResponse::Ok().json(AnalyticsSummaryResponse::from(summary)))
}
