use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

// ============ Form Models ============

/// Insurance plan offered on the form.
///
/// Serialized by its display name ("Opção 1"). Deserialization also accepts the
/// formatted option shown to the user ("Opção 1 -\nR$ 2.505,53/ano").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Plan {
    #[serde(rename = "Opção 1")]
    Opcao1,
    #[serde(rename = "Opção 2")]
    Opcao2,
    #[serde(rename = "Opção 3")]
    Opcao3,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Opcao1, Plan::Opcao2, Plan::Opcao3];

    /// Display name of the plan.
    pub fn label(&self) -> &'static str {
        match self {
            Plan::Opcao1 => "Opção 1",
            Plan::Opcao2 => "Opção 2",
            Plan::Opcao3 => "Opção 3",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Plan::Opcao1 => 0,
            Plan::Opcao2 => 1,
            Plan::Opcao3 => 2,
        }
    }

    /// Annual price used when no override is configured.
    pub fn default_price(&self) -> BigDecimal {
        let raw = match self {
            Plan::Opcao1 => "2505.53",
            Plan::Opcao2 => "4008.85",
            Plan::Opcao3 => "7015.49",
        };
        BigDecimal::from_str(raw).unwrap_or_default()
    }

    /// Parses a plan from its name or from a formatted radio option.
    ///
    /// Only the first line counts and a trailing " -" is ignored, so
    /// "Opção 2 -\nR$ 4.008,85/ano" yields `Opcao2`. Matching ignores case,
    /// accented letters included.
    pub fn from_label(raw: &str) -> Option<Plan> {
        let first_line = raw.lines().next().unwrap_or("").replace(" -", "");
        let name = first_line.trim().to_lowercase();
        Plan::ALL.into_iter().find(|plan| {
            plan.label().to_lowercase() == name || plan.ascii_label().to_lowercase() == name
        })
    }

    fn ascii_label(&self) -> &'static str {
        match self {
            Plan::Opcao1 => "Opcao 1",
            Plan::Opcao2 => "Opcao 2",
            Plan::Opcao3 => "Opcao 3",
        }
    }
}

impl TryFrom<String> for Plan {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Plan::from_label(&value).ok_or_else(|| format!("Plano desconhecido: '{}'", value))
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Person responsible for the policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Applicant {
    pub nome_completo: String,
    pub cpf: String,
    pub email: String,
    pub telefone: String,
}

/// Insured business (the kiosk).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Company {
    pub cnpj: String,
    /// Legal name, filled from the CNPJ lookup and editable afterwards.
    pub razao_social: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub cep: String,
    pub logradouro: String,
    pub numero: String,
    pub complemento: String,
    pub bairro: String,
    pub cidade: String,
    pub estado: String,
}

/// Equipment without invoice declared by the applicant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentItem {
    pub tipo: String,
    pub descricao: String,
    /// Declared value as typed by the user (currency-like, not parsed).
    pub valor: String,
}

impl EquipmentItem {
    /// A row counts only when its type is filled.
    pub fn is_valid(&self) -> bool {
        !self.tipo.trim().is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.tipo.trim().is_empty()
            && self.descricao.trim().is_empty()
            && self.valor.trim().is_empty()
    }
}

/// Kiosk group metadata used when several kiosks enroll together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupInfo {
    pub pertence_grupo: bool,
    pub grupo_id: Option<String>,
    pub numero_quiosque: Option<u32>,
}

fn default_equipment() -> Vec<EquipmentItem> {
    vec![EquipmentItem::default()]
}

/// Accepts a string or null; null means nothing selected.
fn deserialize_selection<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Everything the applicant fills in on the enrollment form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentForm {
    #[serde(flatten)]
    pub applicant: Applicant,
    #[serde(flatten)]
    pub company: Company,
    #[serde(flatten)]
    pub address: Address,
    #[serde(default = "default_equipment")]
    pub equipamentos: Vec<EquipmentItem>,
    /// Plan option as selected, blank when none. Unknown labels are kept so
    /// validation can report them.
    #[serde(default, deserialize_with = "deserialize_selection")]
    pub plano: String,
    #[serde(default)]
    pub grupo: Option<GroupInfo>,
}

impl Default for EnrollmentForm {
    fn default() -> Self {
        Self {
            applicant: Applicant::default(),
            company: Company::default(),
            address: Address::default(),
            equipamentos: default_equipment(),
            plano: String::new(),
            grupo: None,
        }
    }
}

impl EnrollmentForm {
    /// The selected plan, if the selection names one.
    pub fn plan(&self) -> Option<Plan> {
        Plan::from_label(&self.plano)
    }

    /// Appends an empty equipment row.
    pub fn add_equipment(&mut self) {
        self.equipamentos.push(EquipmentItem::default());
    }

    /// Removes the row at `index`. The last remaining row is never removed.
    ///
    /// Returns `true` when a row was removed.
    pub fn remove_equipment(&mut self, index: usize) -> bool {
        if self.equipamentos.len() > 1 && index < self.equipamentos.len() {
            self.equipamentos.remove(index);
            return true;
        }
        false
    }

    /// Restores the one-empty-row default if a client sent an empty list.
    pub fn ensure_equipment_row(&mut self) {
        if self.equipamentos.is_empty() {
            self.equipamentos = default_equipment();
        }
    }

    /// Rows with a filled type, in form order.
    pub fn valid_equipment(&self) -> Vec<&EquipmentItem> {
        self.equipamentos.iter().filter(|e| e.is_valid()).collect()
    }

    /// Fills the address fields returned by a postal-code lookup.
    /// Number and complement are typed by the user and stay untouched.
    pub fn apply_address(&mut self, found: &AddressLookup) {
        self.address.logradouro = found.logradouro.clone();
        self.address.bairro = found.bairro.clone();
        self.address.cidade = found.cidade.clone();
        self.address.estado = found.estado.clone();
    }
}

// ============ Attachments ============

/// File sent along with a submission, base64 encoded in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub nome: String,
    pub mime_type: String,
    pub conteudo_base64: String,
}

/// Decoded attachment ready to be validated and mailed.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFile {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl AttachmentFile {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Summary line for an attachment shown in the email body.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentInfo {
    pub name: String,
    pub size_mb: f64,
}

// ============ Pricing ============

/// Pro-rata price for a plan, derived on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub plano: Plan,
    pub preco_anual: BigDecimal,
    pub data_inclusao: NaiveDate,
    pub data_final_vigencia: NaiveDate,
    pub dias_restantes: i64,
    pub premio_pro_rata: BigDecimal,
    pub premio_formatado: String,
    /// True when the inclusion date was pushed past tomorrow by a weekend or holiday.
    pub data_ajustada: bool,
}

/// Plan as shown in the radio selection.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOption {
    pub plano: Plan,
    pub preco_anual: BigDecimal,
    pub rotulo: String,
    pub cotacao: Quote,
}

// ============ Submission ============

/// The aggregate sent once via email.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub form: EnrollmentForm,
    pub quote: Option<Quote>,
    pub timestamp_utc: DateTime<Utc>,
    pub telefone_e164: Option<String>,
    pub anexos: Vec<AttachmentInfo>,
}

/// Body of the stateless submission endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    #[serde(flatten)]
    pub form: EnrollmentForm,
    #[serde(default)]
    pub anexos: Vec<AttachmentPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResponse {
    pub success: bool,
    pub message: String,
    pub primeiro_nome: String,
    pub cotacao: Option<Quote>,
    /// Rendered email, only returned when the service runs in test mode.
    pub preview_html: Option<String>,
}

// ============ Lookups ============

/// Company name returned by the registry lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyLookup {
    pub cnpj: String,
    pub razao_social: String,
}

/// Partial address returned by the postal-code lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressLookup {
    pub cep: String,
    pub logradouro: String,
    pub bairro: String,
    pub cidade: String,
    pub estado: String,
}

/// Result of an external lookup: the value, or `None` plus a user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupOutcome<T> {
    pub found: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> LookupOutcome<T> {
    pub fn found(data: T) -> Self {
        Self {
            found: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self {
            found: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

// ============ Session ============

/// Partial update of a form session. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionPatch {
    pub nome_completo: Option<String>,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub telefone: Option<String>,
    pub cnpj: Option<String>,
    pub razao_social: Option<String>,
    pub cep: Option<String>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub complemento: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    /// An empty string clears the selection.
    pub plano: Option<String>,
    pub equipamentos: Option<Vec<EquipmentItem>>,
    pub grupo: Option<GroupInfo>,
}
