/// Submission workflow shared by the stateless and the session endpoints:
/// 1. Validate every field and collect all errors
/// 2. Decode and check attachments
/// 3. Price the selected plan
/// 4. Email the summary
use chrono::{NaiveDate, Utc};

use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::formatters::first_name;
use crate::models::{
    AttachmentFile, AttachmentInfo, AttachmentPayload, EnrollmentForm, Submission,
    SubmissionResponse,
};
use crate::notifier::EmailNotifier;
use crate::pricing;
use crate::validators::{
    decode_attachments, normalize_br_phone, validate_attachments, validate_form, ValidationOptions,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Validates the form and the attachments together, returning every error.
pub fn validate_submission(
    config: &Config,
    form: &EnrollmentForm,
    payloads: &[AttachmentPayload],
) -> Result<Vec<AttachmentFile>, AppError> {
    let mut errors = validate_form(
        form,
        ValidationOptions {
            strict_cpf: config.strict_cpf,
        },
    );

    let files = match decode_attachments(payloads).and_then(validate_attachments) {
        Ok(files) => files,
        Err(file_errors) => {
            errors.extend(file_errors);
            Vec::new()
        }
    };

    if errors.is_empty() {
        Ok(files)
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Assembles the record that gets emailed.
pub fn build_submission(
    config: &Config,
    form: &EnrollmentForm,
    files: &[AttachmentFile],
    today: NaiveDate,
) -> Submission {
    let mut form = form.clone();
    form.equipamentos.retain(|item| item.is_valid());

    Submission {
        quote: form.plan().map(|plan| pricing::quote(config, plan, today)),
        telefone_e164: normalize_br_phone(&form.applicant.telefone),
        anexos: files
            .iter()
            .map(|file| AttachmentInfo {
                name: file.name.clone(),
                size_mb: file.size() as f64 / BYTES_PER_MB,
            })
            .collect(),
        timestamp_utc: Utc::now(),
        form,
    }
}

/// Validates, prices and sends an enrollment.
///
/// Nothing is sent when validation fails. In test mode the rendered email is
/// returned in `preview_html`.
pub async fn submit_form(
    config: &Config,
    notifier: &EmailNotifier,
    form: &EnrollmentForm,
    payloads: &[AttachmentPayload],
    today: NaiveDate,
) -> Result<SubmissionResponse, AppError> {
    let files = validate_submission(config, form, payloads)?;
    let submission = build_submission(config, form, &files, today);

    tracing::info!(
        "Submitting enrollment for CNPJ {} ({} equipment row(s), {} attachment(s))",
        submission.form.company.cnpj,
        submission.form.equipamentos.len(),
        files.len()
    );

    let preview_html = notifier
        .notify(&submission, &files)
        .await
        .context("Sending enrollment notification")?;

    let primeiro_nome = first_name(&form.applicant.nome_completo);
    Ok(SubmissionResponse {
        success: true,
        message: format!(
            "Obrigado, {}! Sua solicitação foi enviada com sucesso.",
            primeiro_nome
        ),
        primeiro_nome,
        cotacao: submission.quote,
        preview_html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EquipmentItem, Plan};

    fn complete_form() -> EnrollmentForm {
        let mut form = EnrollmentForm::default();
        form.applicant.nome_completo = "Maria Souza".to_string();
        form.applicant.cpf = "529.982.247-25".to_string();
        form.applicant.email = "maria@example.com".to_string();
        form.applicant.telefone = "(21) 98765-4321".to_string();
        form.company.cnpj = "11.222.333/0001-81".to_string();
        form.company.razao_social = "ACME LTDA".to_string();
        form.address.cep = "22070-002".to_string();
        form.address.logradouro = "Avenida Atlântica".to_string();
        form.address.numero = "100".to_string();
        form.address.bairro = "Copacabana".to_string();
        form.address.cidade = "Rio de Janeiro".to_string();
        form.address.estado = "RJ".to_string();
        form.plano = Plan::Opcao1.label().to_string();
        form
    }

    #[test]
    fn test_complete_form_passes() {
        let files = validate_submission(&Config::default(), &complete_form(), &[]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_form_and_attachment_errors_are_combined() {
        let mut form = complete_form();
        form.applicant.nome_completo.clear();
        let payloads = vec![AttachmentPayload {
            nome: "virus.exe".to_string(),
            mime_type: "application/x-msdownload".to_string(),
            conteudo_base64: "AAAA".to_string(),
        }];

        let err = validate_submission(&Config::default(), &form, &payloads).unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains(&"Nome completo é obrigatório".to_string()));
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_build_submission_drops_blank_equipment() {
        let mut form = complete_form();
        form.equipamentos = vec![
            EquipmentItem {
                tipo: "Freezer".to_string(),
                ..Default::default()
            },
            EquipmentItem::default(),
        ];
        let today = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();

        let submission = build_submission(&Config::default(), &form, &[], today);

        assert_eq!(submission.form.equipamentos.len(), 1);
        assert_eq!(submission.telefone_e164.as_deref(), Some("+5521987654321"));
        let quote = submission.quote.unwrap();
        assert_eq!(quote.data_inclusao, NaiveDate::from_ymd_opt(2025, 12, 2).unwrap());
        assert_eq!(quote.dias_restantes, 7);
    }
}
