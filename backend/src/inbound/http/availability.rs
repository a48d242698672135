//! Availability form HTTP handlers.
//!
//! ```text
//! GET  /api/v1/availability/form          Resolve a magic-link token
//! POST /api/v1/availability/responses     Submit availability slots
//! GET  /api/v1/prompts/{id}/suggestions   Ranked meeting suggestions
//! GET  /api/v1/prompts/{id}/respondents   Who has responded
//! ```
//!
//! Token-gated endpoints never reveal why a link was rejected; every
//! rejection carries the same generic message.

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AvailabilityPrompt, AvailabilityResponse, Error, FormContext, PromptId, RequestMetadata,
    RespondentStatus, SubmissionOutcome, Suggestion, TimeSlot, GENERIC_TOKEN_MESSAGE,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::require_caller;
use crate::inbound::http::state::HttpState;

/// Query string for resolving a form token.
#[derive(Debug, Deserialize)]
pub struct FormQuery {
    pub token: String,
}

/// One availability window in a submission payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPayload {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub timezone: String,
    #[serde(default)]
    pub preferred: bool,
}

/// Submission request body. The token may arrive here or in the query
/// string; the body wins when both are present.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub token: Option<String>,
    /// Instant the form was rendered, echoed back by the client. Feeds the
    /// post-expiry grace rule.
    pub form_loaded_at: Option<DateTime<Utc>>,
    /// Empty means "no availability this week" and is a valid submission.
    #[serde(default)]
    pub slots: Vec<SlotPayload>,
}

/// Optional token in the submission query string.
#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptView {
    pub id: String,
    pub group_id: String,
    pub status: String,
    pub week: String,
    pub created_at: String,
    pub deadline: String,
    pub custom_message: Option<String>,
    pub blind_voting: bool,
}

impl From<&AvailabilityPrompt> for PromptView {
    fn from(prompt: &AvailabilityPrompt) -> Self {
        Self {
            id: prompt.id.to_string(),
            group_id: prompt.group_id.to_string(),
            status: prompt.status.as_str().to_owned(),
            week: prompt.week.as_str().to_owned(),
            created_at: prompt.created_at.to_rfc3339(),
            deadline: prompt.deadline.to_rfc3339(),
            custom_message: prompt.custom_message.clone(),
            blind_voting: prompt.blind_voting,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub slots: Vec<SlotPayload>,
    pub submitted_at: Option<String>,
}

impl From<&AvailabilityResponse> for ResponseView {
    fn from(response: &AvailabilityResponse) -> Self {
        Self {
            slots: response
                .slots
                .iter()
                .map(|slot| SlotPayload {
                    starts_at: slot.starts_at,
                    ends_at: slot.ends_at,
                    timezone: slot.timezone.clone(),
                    preferred: slot.preferred,
                })
                .collect(),
            submitted_at: response.submitted_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormContextResponse {
    pub prompt: PromptView,
    pub respondent_id: String,
    pub display_name: String,
    pub existing_response: Option<ResponseView>,
    pub grace_used: bool,
}

impl From<FormContext> for FormContextResponse {
    fn from(context: FormContext) -> Self {
        Self {
            prompt: PromptView::from(&context.prompt),
            respondent_id: context.respondent.to_string(),
            display_name: context.display_name,
            existing_response: context.existing.as_ref().map(ResponseView::from),
            grace_used: context.grace_used,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub status: &'static str,
    pub grace_used: bool,
    pub late: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionView {
    pub id: String,
    pub starts_at: String,
    pub ends_at: String,
    pub participant_count: u32,
    pub participants: Vec<String>,
    pub preferred_count: u32,
    pub meets_minimum: bool,
    pub score: f64,
    pub converted_event_id: Option<String>,
}

impl From<&Suggestion> for SuggestionView {
    fn from(suggestion: &Suggestion) -> Self {
        Self {
            id: suggestion.id.to_string(),
            starts_at: suggestion.starts_at.to_rfc3339(),
            ends_at: suggestion.ends_at.to_rfc3339(),
            participant_count: suggestion.participant_count,
            participants: suggestion
                .participants
                .iter()
                .map(ToString::to_string)
                .collect(),
            preferred_count: suggestion.preferred_count,
            meets_minimum: suggestion.meets_minimum,
            score: suggestion.score,
            converted_event_id: suggestion.converted_event_id.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentView {
    pub user_id: String,
    pub display_name: String,
    pub has_submitted: bool,
    pub submitted_at: Option<String>,
}

impl From<&RespondentStatus> for RespondentView {
    fn from(status: &RespondentStatus) -> Self {
        Self {
            user_id: status.user_id.to_string(),
            display_name: status.display_name.clone(),
            has_submitted: status.has_submitted,
            submitted_at: status.submitted_at.map(|at| at.to_rfc3339()),
        }
    }
}

fn request_metadata(request: &HttpRequest) -> RequestMetadata {
    let ip = request
        .connection_info()
        .realip_remote_addr()
        .map(ToOwned::to_owned);
    let user_agent = request
        .headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    RequestMetadata { ip, user_agent }
}

fn rejected_link_error() -> Error {
    Error::unauthorized(GENERIC_TOKEN_MESSAGE)
}

fn parse_slots(payload: Vec<SlotPayload>) -> Result<Vec<TimeSlot>, Error> {
    payload
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            TimeSlot::try_new(slot.starts_at, slot.ends_at, slot.timezone, slot.preferred)
                .map_err(|err| Error::invalid_request(format!("slot {index}: {err}")))
        })
        .collect()
}

/// Resolve a magic-link token into form render context.
#[get("/availability/form")]
pub async fn form_context(
    state: web::Data<HttpState>,
    request: HttpRequest,
    query: web::Query<FormQuery>,
) -> ApiResult<HttpResponse> {
    let context = state
        .availability
        .form_context(&query.token, request_metadata(&request))
        .await?
        .map_err(|_| rejected_link_error())?;
    Ok(HttpResponse::Ok().json(FormContextResponse::from(context)))
}

/// Submit availability slots against a magic-link token.
#[post("/availability/responses")]
pub async fn submit_response(
    state: web::Data<HttpState>,
    request: HttpRequest,
    query: web::Query<SubmitQuery>,
    payload: web::Json<SubmitRequest>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    let token = body
        .token
        .or_else(|| query.into_inner().token)
        .ok_or_else(rejected_link_error)?;
    let slots = parse_slots(body.slots)?;

    let outcome = state
        .availability
        .submit(
            &token,
            body.form_loaded_at,
            slots,
            request_metadata(&request),
        )
        .await?;

    match outcome {
        SubmissionOutcome::Accepted {
            grace_used, late, ..
        } => Ok(HttpResponse::Ok().json(SubmissionResponse {
            status: "accepted",
            grace_used,
            late,
        })),
        SubmissionOutcome::Rejected { .. } => Err(rejected_link_error()),
    }
}

/// The ranked suggestion set for a prompt.
#[get("/prompts/{prompt_id}/suggestions")]
pub async fn list_suggestions(
    state: web::Data<HttpState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let prompt_id = PromptId::from_uuid(path.into_inner());
    let suggestions = state.availability.suggestions(&prompt_id).await?;
    let views: Vec<SuggestionView> = suggestions.iter().map(SuggestionView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

/// Respondent roster for a prompt, as visible to the caller.
#[get("/prompts/{prompt_id}/respondents")]
pub async fn list_respondents(
    state: web::Data<HttpState>,
    request: HttpRequest,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let caller = require_caller(&request)?;
    let prompt_id = PromptId::from_uuid(path.into_inner());
    let statuses = state
        .availability
        .respondent_status(&prompt_id, &caller)
        .await?;
    let views: Vec<RespondentView> = statuses.iter().map(RespondentView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}
