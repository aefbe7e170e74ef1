//! Server-side form sessions.
//!
//! Each session carries one in-progress enrollment. Handlers load a clone,
//! mutate it and write it back, so concurrent writes to the same session
//! resolve as last write wins. Submits are the exception: a session is
//! claimed for the whole send, so its form goes out at most once.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    AddressLookup, CompanyLookup, EnrollmentForm, LookupOutcome, Plan, SessionPatch,
};

#[derive(Debug, Clone, Serialize)]
pub struct FormSession {
    pub id: Uuid,
    pub form: EnrollmentForm,
    /// Set after a successful send; cleared by an explicit reset.
    pub submitted: bool,
    /// Errors of the last rejected submit, shown until the next attempt.
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for FormSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FormSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            form: EnrollmentForm::default(),
            submitted: false,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Overwrites the fields present in `patch`.
    pub fn apply_patch(&mut self, patch: SessionPatch) {
        let form = &mut self.form;
        let set = |target: &mut String, value: Option<String>| {
            if let Some(value) = value {
                *target = value;
            }
        };

        set(&mut form.applicant.nome_completo, patch.nome_completo);
        set(&mut form.applicant.cpf, patch.cpf);
        set(&mut form.applicant.email, patch.email);
        set(&mut form.applicant.telefone, patch.telefone);
        set(&mut form.company.cnpj, patch.cnpj);
        set(&mut form.company.razao_social, patch.razao_social);
        set(&mut form.address.cep, patch.cep);
        set(&mut form.address.logradouro, patch.logradouro);
        set(&mut form.address.numero, patch.numero);
        set(&mut form.address.complemento, patch.complemento);
        set(&mut form.address.bairro, patch.bairro);
        set(&mut form.address.cidade, patch.cidade);
        set(&mut form.address.estado, patch.estado);

        if let Some(selection) = patch.plano {
            form.plano = match Plan::from_label(&selection) {
                Some(plan) => plan.label().to_string(),
                None => selection,
            };
        }
        if let Some(equipment) = patch.equipamentos {
            form.equipamentos = equipment;
            form.ensure_equipment_row();
        }
        if patch.grupo.is_some() {
            form.grupo = patch.grupo;
        }
        self.touch();
    }

    pub fn add_equipment(&mut self) {
        self.form.add_equipment();
        self.touch();
    }

    /// Removes an equipment row; the last row cannot be removed.
    pub fn remove_equipment(&mut self, index: usize) -> Result<(), AppError> {
        if self.form.remove_equipment(index) {
            self.touch();
            return Ok(());
        }
        if index >= self.form.equipamentos.len() {
            Err(AppError::NotFound(format!("Equipamento {} não existe", index + 1)))
        } else {
            Err(AppError::BadRequest(
                "Pelo menos um equipamento deve permanecer no formulário".to_string(),
            ))
        }
    }

    /// Fills the company name from a lookup. A miss leaves the form as is.
    pub fn apply_company(&mut self, outcome: &LookupOutcome<CompanyLookup>) {
        if let Some(company) = &outcome.data {
            self.form.company.razao_social = company.razao_social.clone();
            self.touch();
        }
    }

    /// Fills the address from a lookup. A miss leaves the form as is.
    pub fn apply_address(&mut self, outcome: &LookupOutcome<AddressLookup>) {
        if let Some(address) = &outcome.data {
            self.form.apply_address(address);
            self.touch();
        }
    }

    /// Back to an empty form, ready for another enrollment.
    pub fn reset(&mut self) {
        self.form = EnrollmentForm::default();
        self.submitted = false;
        self.errors.clear();
        self.touch();
    }
}

/// Exclusive right to submit one session, released on drop.
#[derive(Debug)]
pub struct SubmitClaim {
    id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for SubmitClaim {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.id);
        }
    }
}

/// In-memory sessions with idle expiry.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, FormSession>,
    /// Sessions with a submit in progress.
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            sessions: Cache::builder()
                .time_to_idle(ttl)
                .max_capacity(max_capacity)
                .build(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claims a session for submitting. Fails with a conflict while another
    /// submit of the same session holds its claim.
    pub fn claim_submit(&self, id: Uuid) -> Result<SubmitClaim, AppError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| AppError::InternalError("Submit claims unavailable".to_string()))?;
        if !in_flight.insert(id) {
            return Err(AppError::Conflict(
                "Envio do formulário já está em andamento".to_string(),
            ));
        }
        Ok(SubmitClaim {
            id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub async fn create(&self) -> FormSession {
        let session = FormSession::new();
        self.sessions.insert(session.id, session.clone()).await;
        tracing::debug!("Session {} created", session.id);
        session
    }

    pub async fn get(&self, id: Uuid) -> Result<FormSession, AppError> {
        self.sessions
            .get(&id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Sessão {} não encontrada ou expirada", id)))
    }

    pub async fn save(&self, session: &FormSession) {
        self.sessions.insert(session.id, session.clone()).await;
    }
}
