/// Field and form validation for the enrollment form
///
/// ID-like fields are reduced to their digits before matching a fixed-length
/// pattern, so "529.982.247-25" and "52998224725" are the same CPF. The
/// full-form validator collects every problem instead of stopping at the first.
use base64::Engine;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::LazyLock;

use crate::models::{AttachmentFile, AttachmentPayload, EnrollmentForm};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});
static CNPJ_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{14}$").expect("cnpj regex"));
static CPF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{11}$").expect("cpf regex"));
static CEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8}$").expect("cep regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,11}$").expect("phone regex"));

/// 10 MB per file.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
/// 25 MB for all files of one submission.
pub const MAX_TOTAL_SIZE: usize = 25 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
];

/// Required fields with the label used in error messages, in display order.
pub const REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("nome_completo", "Nome completo"),
    ("cpf", "CPF"),
    ("email", "E-mail"),
    ("telefone", "Telefone"),
    ("cnpj", "CNPJ"),
    ("cep", "CEP"),
    ("logradouro", "Logradouro"),
    ("numero", "Número"),
    ("bairro", "Bairro"),
    ("cidade", "Cidade"),
    ("estado", "Estado"),
    ("plano", "Plano de seguro"),
];

/// Extra checks that are off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Also verify the CPF check digits (mod 11).
    pub strict_cpf: bool,
}

/// Removes every non-digit character.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn validate_digits(raw: &str, pattern: &Regex, reason: &str) -> Result<String, String> {
    let digits = digits_only(raw);
    if pattern.is_match(&digits) {
        Ok(digits)
    } else {
        Err(reason.to_string())
    }
}

/// Returns the 14 CNPJ digits or the reason it is invalid.
pub fn validate_cnpj(raw: &str) -> Result<String, String> {
    validate_digits(raw, &CNPJ_RE, "CNPJ deve conter exatamente 14 números")
}

/// Returns the 11 CPF digits or the reason it is invalid.
pub fn validate_cpf(raw: &str) -> Result<String, String> {
    validate_digits(raw, &CPF_RE, "CPF deve conter exatamente 11 números")
}

/// Returns the 8 CEP digits or the reason it is invalid.
pub fn validate_cep(raw: &str) -> Result<String, String> {
    validate_digits(raw, &CEP_RE, "CEP deve conter exatamente 8 números")
}

/// Returns the 10 or 11 phone digits (area code included) or the reason it is invalid.
pub fn validate_phone(raw: &str) -> Result<String, String> {
    validate_digits(raw, &PHONE_RE, "Telefone deve ter 10 ou 11 dígitos")
}

/// Returns the trimmed email or the reason it is invalid.
pub fn validate_email(raw: &str) -> Result<String, String> {
    let email = raw.trim();
    if EMAIL_RE.is_match(email) {
        Ok(email.to_string())
    } else {
        Err("E-mail inválido".to_string())
    }
}

/// A full name needs at least a first name and a surname.
pub fn validate_full_name(raw: &str) -> Result<String, String> {
    if raw.split_whitespace().count() >= 2 {
        Ok(raw.trim().to_string())
    } else {
        Err("Nome completo deve ter pelo menos nome e sobrenome".to_string())
    }
}

pub fn is_valid_cnpj(raw: &str) -> bool {
    validate_cnpj(raw).is_ok()
}

pub fn is_valid_cpf(raw: &str) -> bool {
    validate_cpf(raw).is_ok()
}

pub fn is_valid_cep(raw: &str) -> bool {
    validate_cep(raw).is_ok()
}

pub fn is_valid_phone(raw: &str) -> bool {
    validate_phone(raw).is_ok()
}

pub fn is_valid_email(raw: &str) -> bool {
    validate_email(raw).is_ok()
}

/// Verifies both CPF check digits.
///
/// Sequences of a single repeated digit pass the mod-11 arithmetic but are
/// not issued, so they are rejected too.
pub fn cpf_checksum_is_valid(raw: &str) -> bool {
    let digits: Vec<u32> = digits_only(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();
    if digits.len() != 11 || digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    let check_digit = |len: usize| -> u32 {
        let sum: u32 = digits[..len]
            .iter()
            .enumerate()
            .map(|(i, d)| d * (len as u32 + 1 - i as u32))
            .sum();
        let rest = (sum * 10) % 11;
        if rest == 10 {
            0
        } else {
            rest
        }
    };

    check_digit(9) == digits[9] && check_digit(10) == digits[10]
}

/// Validates and normalizes a Brazilian phone number to E.164 (+5521987654321).
///
/// Returns `None` when the number cannot be parsed or is not a valid BR number.
pub fn normalize_br_phone(raw: &str) -> Option<String> {
    if raw.trim().is_empty() || raw.len() < 8 {
        return None;
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("Valid BR phone: {} -> {}", raw, formatted);
            Some(formatted)
        }
        Ok(_) => {
            tracing::debug!("Phone is not a valid BR number: {}", raw);
            None
        }
        Err(e) => {
            tracing::debug!("Failed to parse BR phone '{}': {:?}", raw, e);
            None
        }
    }
}

fn field_value<'a>(form: &'a EnrollmentForm, field: &str) -> &'a str {
    match field {
        "nome_completo" => &form.applicant.nome_completo,
        "cpf" => &form.applicant.cpf,
        "email" => &form.applicant.email,
        "telefone" => &form.applicant.telefone,
        "cnpj" => &form.company.cnpj,
        "cep" => &form.address.cep,
        "logradouro" => &form.address.logradouro,
        "numero" => &form.address.numero,
        "bairro" => &form.address.bairro,
        "cidade" => &form.address.cidade,
        "estado" => &form.address.estado,
        "plano" => &form.plano,
        _ => "",
    }
}

/// Validates the whole form and returns every error found, in display order.
///
/// Format checks only run on fields that were filled, so an empty field yields
/// a single "é obrigatório" message rather than two.
pub fn validate_form(form: &EnrollmentForm, options: ValidationOptions) -> Vec<String> {
    let mut errors = Vec::new();

    for (field, label) in REQUIRED_FIELDS {
        if field_value(form, field).trim().is_empty() {
            errors.push(format!("{} é obrigatório", label));
        }
    }

    let applicant = &form.applicant;
    let filled = |value: &str| !value.trim().is_empty();

    if filled(&applicant.email) {
        if let Err(reason) = validate_email(&applicant.email) {
            errors.push(reason);
        }
    }
    if filled(&applicant.telefone) {
        if let Err(reason) = validate_phone(&applicant.telefone) {
            errors.push(reason);
        }
    }
    if filled(&applicant.cpf) {
        match validate_cpf(&applicant.cpf) {
            Err(reason) => errors.push(reason),
            Ok(cpf) if options.strict_cpf && !cpf_checksum_is_valid(&cpf) => {
                errors.push("CPF inválido (dígitos verificadores)".to_string());
            }
            Ok(_) => {}
        }
    }
    if filled(&form.company.cnpj) {
        if let Err(reason) = validate_cnpj(&form.company.cnpj) {
            errors.push(reason);
        }
    }
    if filled(&form.address.cep) {
        if let Err(reason) = validate_cep(&form.address.cep) {
            errors.push(reason);
        }
    }
    if filled(&applicant.nome_completo) {
        if let Err(reason) = validate_full_name(&applicant.nome_completo) {
            errors.push(reason);
        }
    }
    if filled(&form.plano) && form.plan().is_none() {
        errors.push(format!("Plano de seguro inválido: '{}'", form.plano.trim()));
    }

    // Equipment is optional, but a row with any content needs a type.
    for (i, item) in form.equipamentos.iter().enumerate() {
        let has_content = filled(&item.descricao) || filled(&item.valor);
        if has_content && !item.is_valid() {
            errors.push(format!(
                "Equipamento {}: se preenchido, o tipo é obrigatório",
                i + 1
            ));
        }
    }

    errors
}

/// Decodes base64 attachment payloads.
pub fn decode_attachments(
    payloads: &[AttachmentPayload],
) -> Result<Vec<AttachmentFile>, Vec<String>> {
    let mut files = Vec::with_capacity(payloads.len());
    let mut errors = Vec::new();

    for payload in payloads {
        match base64::engine::general_purpose::STANDARD.decode(payload.conteudo_base64.trim()) {
            Ok(content) => files.push(AttachmentFile {
                name: payload.nome.clone(),
                content_type: payload.mime_type.trim().to_lowercase(),
                content,
            }),
            Err(e) => {
                tracing::warn!("Attachment '{}' is not valid base64: {}", payload.nome, e);
                errors.push(format!("Arquivo '{}' não pôde ser lido", payload.nome));
            }
        }
    }

    if errors.is_empty() {
        Ok(files)
    } else {
        Err(errors)
    }
}

/// Enforces the per-file and total size caps and the allowed types.
///
/// Oversized or disallowed files are reported individually; exceeding the
/// total cap rejects the whole batch.
pub fn validate_attachments(
    files: Vec<AttachmentFile>,
) -> Result<Vec<AttachmentFile>, Vec<String>> {
    let mut errors = Vec::new();
    let mut accepted = Vec::new();
    let mut total_size = 0usize;

    for file in files {
        if file.size() > MAX_FILE_SIZE {
            errors.push(format!("Arquivo '{}' excede 10MB", file.name));
            continue;
        }
        if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) {
            errors.push(format!(
                "Tipo de arquivo não permitido: '{}' ({})",
                file.name, file.content_type
            ));
            continue;
        }
        total_size += file.size();
        accepted.push(file);
    }

    if total_size > MAX_TOTAL_SIZE {
        errors.push(format!(
            "Tamanho total dos arquivos excede 25MB ({:.1}MB)",
            total_size as f64 / (1024.0 * 1024.0)
        ));
    }

    if errors.is_empty() {
        Ok(accepted)
    } else {
        Err(errors)
    }
}
