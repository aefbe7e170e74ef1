use crate::calendar;
use crate::config::Config;
use crate::enrollment;
use crate::errors::AppError;
use crate::models::*;
use crate::notifier::EmailNotifier;
use crate::pricing;
use crate::services::{CepService, CnpjService};
use crate::session::{FormSession, SessionStore};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// ReceitaWS client (cached, retried, circuit-broken).
    pub cnpj_service: CnpjService,
    /// ViaCEP client (cached, retried, circuit-broken).
    pub cep_service: CepService,
    pub notifier: EmailNotifier,
    /// In-progress forms keyed by session id.
    pub sessions: SessionStore,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-adesao-api",
            "version": env!("CARGO_PKG_VERSION"),
            "email_test_mode": state.notifier.is_test_mode()
        })),
    )
}

// ============ Pricing & calendar ============

/// GET /api/v1/plans
///
/// Every plan with its display label and today's pro-rata quote.
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Json<Vec<PlanOption>> {
    Json(pricing::plan_options(&state.config, calendar::today_in_brazil()))
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub plano: String,
}

/// GET /api/v1/quote?plano=Opção 1
pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Quote>, AppError> {
    let plan = Plan::from_label(&params.plano)
        .ok_or_else(|| AppError::BadRequest(format!("Plano inválido: '{}'", params.plano)))?;

    Ok(Json(pricing::quote(&state.config, plan, calendar::today_in_brazil())))
}

#[derive(Debug, Serialize)]
pub struct HolidayEntry {
    pub data: NaiveDate,
    pub nome: &'static str,
}

/// GET /api/v1/holidays/:year
pub async fn list_holidays(Path(year): Path<i32>) -> Result<Json<Vec<HolidayEntry>>, AppError> {
    if !(1583..=9999).contains(&year) {
        return Err(AppError::BadRequest(format!(
            "Ano fora do intervalo suportado: {}",
            year
        )));
    }

    let holidays = calendar::list_holidays(year)
        .into_iter()
        .map(|(data, nome)| HolidayEntry { data, nome })
        .collect();
    Ok(Json(holidays))
}

// ============ Lookups ============

/// GET /api/v1/lookup/cnpj/:cnpj
pub async fn lookup_cnpj(
    State(state): State<Arc<AppState>>,
    Path(cnpj): Path<String>,
) -> Json<LookupOutcome<CompanyLookup>> {
    Json(state.cnpj_service.lookup(&cnpj).await)
}

/// GET /api/v1/lookup/cep/:cep
pub async fn lookup_cep(
    State(state): State<Arc<AppState>>,
    Path(cep): Path<String>,
) -> Json<LookupOutcome<AddressLookup>> {
    Json(state.cep_service.lookup(&cep).await)
}

// ============ Stateless submission ============

/// POST /api/v1/submissions
///
/// Validates and sends a complete form in one call.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<SubmissionRequest>,
) -> Result<Json<SubmissionResponse>, AppError> {
    request.form.ensure_equipment_row();
    let response = enrollment::submit_form(
        &state.config,
        &state.notifier,
        &request.form,
        &request.anexos,
        calendar::today_in_brazil(),
    )
    .await?;

    tracing::info!("✓ Enrollment submitted by {}", response.primeiro_nome);
    Ok(Json(response))
}

// ============ Sessions ============

/// A session plus the quote for its selected plan.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: FormSession,
    pub cotacao: Option<Quote>,
}

impl SessionView {
    fn new(config: &Config, session: FormSession) -> Self {
        let cotacao = session
            .form
            .plan()
            .map(|plan| pricing::quote(config, plan, calendar::today_in_brazil()));
        Self { session, cotacao }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionLookupResponse<T> {
    pub lookup: LookupOutcome<T>,
    pub session: SessionView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionSubmitRequest {
    pub anexos: Vec<AttachmentPayload>,
}

/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SessionView>) {
    let session = state.sessions.create().await;
    tracing::info!("Session {} started", session.id);
    (
        StatusCode::CREATED,
        Json(SessionView::new(&state.config, session)),
    )
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(SessionView::new(&state.config, session)))
}

/// PATCH /api/v1/sessions/:id
pub async fn patch_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<SessionPatch>,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state.sessions.get(id).await?;
    session.apply_patch(patch);
    state.sessions.save(&session).await;
    Ok(Json(SessionView::new(&state.config, session)))
}

/// POST /api/v1/sessions/:id/equipment
pub async fn add_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state.sessions.get(id).await?;
    session.add_equipment();
    state.sessions.save(&session).await;
    Ok(Json(SessionView::new(&state.config, session)))
}

/// DELETE /api/v1/sessions/:id/equipment/:index
pub async fn remove_equipment(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state.sessions.get(id).await?;
    session.remove_equipment(index)?;
    state.sessions.save(&session).await;
    Ok(Json(SessionView::new(&state.config, session)))
}

/// POST /api/v1/sessions/:id/lookup/cnpj
///
/// Looks up the session's CNPJ and fills the company name when found.
pub async fn session_lookup_cnpj(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionLookupResponse<CompanyLookup>>, AppError> {
    let mut session = state.sessions.get(id).await?;
    let lookup = state.cnpj_service.lookup(&session.form.company.cnpj).await;

    session.apply_company(&lookup);
    state.sessions.save(&session).await;
    Ok(Json(SessionLookupResponse {
        lookup,
        session: SessionView::new(&state.config, session),
    }))
}

/// POST /api/v1/sessions/:id/lookup/cep
///
/// Looks up the session's CEP and fills street, district, city and state.
pub async fn session_lookup_cep(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionLookupResponse<AddressLookup>>, AppError> {
    let mut session = state.sessions.get(id).await?;
    let lookup = state.cep_service.lookup(&session.form.address.cep).await;

    session.apply_address(&lookup);
    state.sessions.save(&session).await;
    Ok(Json(SessionLookupResponse {
        lookup,
        session: SessionView::new(&state.config, session),
    }))
}

/// POST /api/v1/sessions/:id/submit
///
/// Sends the session's form. On success the form is cleared and the session
/// is marked as submitted until reset; on failure the form is kept as typed.
/// A submit arriving while another one is sending gets a conflict.
pub async fn submit_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<SessionSubmitRequest>>,
) -> Result<Json<SubmissionResponse>, AppError> {
    // Held until the outcome is saved, so a concurrent submit sees `submitted`.
    let _claim = state.sessions.claim_submit(id)?;
    let mut session = state.sessions.get(id).await?;
    if session.submitted {
        return Err(AppError::Conflict(
            "Formulário já foi enviado anteriormente".to_string(),
        ));
    }

    let anexos = body.map(|Json(request)| request.anexos).unwrap_or_default();
    let result = enrollment::submit_form(
        &state.config,
        &state.notifier,
        &session.form,
        &anexos,
        calendar::today_in_brazil(),
    )
    .await;

    match result {
        Ok(response) => {
            session.reset();
            session.submitted = true;
            state.sessions.save(&session).await;
            tracing::info!("✓ Session {} submitted", id);
            Ok(Json(response))
        }
        Err(err) => {
            session.errors = match err.root() {
                AppError::Validation(errors) => errors.clone(),
                _ => Vec::new(),
            };
            state.sessions.save(&session).await;
            Err(err)
        }
    }
}

/// POST /api/v1/sessions/:id/reset
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state.sessions.get(id).await?;
    session.reset();
    state.sessions.save(&session).await;
    tracing::info!("Session {} reset", id);
    Ok(Json(SessionView::new(&state.config, session)))
}
