//! Email notification of a completed enrollment.
//!
//! The insurer always receives the summary; the applicant gets a copy when
//! enabled. In test mode nothing leaves the process and the rendered HTML is
//! handed back to the caller instead.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::formatters::{
    format_brl, format_cep, format_cnpj, format_cpf, format_phone, format_timestamp_brazil,
};
use crate::models::{AttachmentFile, Submission};

pub const DEFAULT_SUBJECT: &str = "Nova Solicitação - Seguro Incêndio Conteúdos";

/// A fully composed email.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub from_email: String,
    pub from_name: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<AttachmentFile>,
}

/// Delivery backend for composed emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError>;

    /// Whether messages are only previewed instead of delivered.
    fn is_preview(&self) -> bool {
        false
    }
}

// ============ SendGrid ============

/// SendGrid v3 mail API. A 202 response means the message was accepted.
pub struct SendGridMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SendGridMailer {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::Configuration(format!("Failed to create SendGrid client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.sendgrid_api_base_url.clone(),
            api_key: config.sendgrid_api_key.clone(),
        })
    }

    fn payload(message: &EmailMessage) -> serde_json::Value {
        let mut body = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": { "email": message.from_email, "name": message.from_name },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html }],
        });

        if !message.attachments.is_empty() {
            let attachments: Vec<_> = message
                .attachments
                .iter()
                .map(|file| {
                    json!({
                        "content": STANDARD.encode(&file.content),
                        "filename": file.name,
                        "type": file.content_type,
                        "disposition": "attachment",
                    })
                })
                .collect();
            body["attachments"] = json!(attachments);
        }

        body
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Configuration(
                "SENDGRID_API_KEY não encontrada. Configure a variável de ambiente.".to_string(),
            )
        })?;

        let url = format!("{}/v3/mail/send", self.base_url);
        tracing::info!(
            "Sending '{}' to {} with {} attachment(s)",
            message.subject,
            message.to,
            message.attachments.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&Self::payload(message))
            .send()
            .await
            .map_err(|e| AppError::NotificationError(format!("SendGrid request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::NotificationError(format!(
                "SendGrid returned {}: {}",
                status, error_text
            )));
        }

        tracing::info!("✓ Email accepted for delivery to {}", message.to);
        Ok(())
    }
}

// ============ Test mode ============

/// Records messages in memory instead of sending them.
#[derive(Default)]
pub struct PreviewMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl PreviewMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far, oldest first.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for PreviewMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), AppError> {
        tracing::info!(
            "[test mode] Email to {} not sent: '{}' ({} bytes of HTML)",
            message.to,
            message.subject,
            message.html.len()
        );
        self.sent
            .lock()
            .map_err(|_| AppError::InternalError("Preview mailbox poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }

    fn is_preview(&self) -> bool {
        true
    }
}

// ============ Composition ============

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Subject line, naming the kiosk and group for grouped enrollments.
pub fn subject_for(submission: &Submission) -> String {
    match &submission.form.grupo {
        Some(group) if group.pertence_grupo => format!(
            "🏪 Grupo de Quiosques - Quiosque {} | ID: {}",
            group.numero_quiosque.unwrap_or(1),
            group.grupo_id.as_deref().unwrap_or("N/A")
        ),
        _ => DEFAULT_SUBJECT.to_string(),
    }
}

fn row(label: &str, value: &str) -> String {
    format!(
        "<tr><td style=\"padding:4px 8px;font-weight:bold\">{}</td><td style=\"padding:4px 8px\">{}</td></tr>",
        label,
        escape_html(value)
    )
}

fn section(title: &str, rows: &[String]) -> String {
    format!(
        "<h3 style=\"color:#1f4e79\">{}</h3><table>{}</table>",
        title,
        rows.concat()
    )
}

/// HTML body of the insurer notification. Every user value is escaped.
pub fn render_email_html(submission: &Submission) -> String {
    let form = &submission.form;
    let applicant = &form.applicant;
    let address = &form.address;

    let mut html = String::from(
        "<html><body style=\"font-family:Arial,sans-serif\"><h2>Nova Solicitação de Adesão</h2>",
    );

    let mut applicant_rows = vec![
        row("Nome completo", &applicant.nome_completo),
        row("CPF", &format_cpf(&applicant.cpf)),
        row("E-mail", &applicant.email),
        row("Telefone", &format_phone(&applicant.telefone)),
    ];
    if let Some(e164) = &submission.telefone_e164 {
        applicant_rows.push(row("Telefone (E.164)", e164));
    }
    html.push_str(&section("Dados do Solicitante", &applicant_rows));

    html.push_str(&section(
        "Dados da Empresa",
        &[
            row("CNPJ", &format_cnpj(&form.company.cnpj)),
            row("Razão social", &form.company.razao_social),
        ],
    ));

    let mut address_rows = vec![
        row("CEP", &format_cep(&address.cep)),
        row("Logradouro", &address.logradouro),
        row("Número", &address.numero),
    ];
    if !address.complemento.trim().is_empty() {
        address_rows.push(row("Complemento", &address.complemento));
    }
    address_rows.extend([
        row("Bairro", &address.bairro),
        row("Cidade", &address.cidade),
        row("Estado", &address.estado),
    ]);
    html.push_str(&section("Endereço", &address_rows));

    let equipment = form.valid_equipment();
    if !equipment.is_empty() {
        html.push_str("<h3 style=\"color:#1f4e79\">Equipamentos</h3><table border=\"1\" cellpadding=\"4\" style=\"border-collapse:collapse\"><tr><th>#</th><th>Tipo</th><th>Descrição</th><th>Valor</th></tr>");
        for (i, item) in equipment.iter().enumerate() {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                i + 1,
                escape_html(&item.tipo),
                escape_html(&item.descricao),
                escape_html(&item.valor)
            ));
        }
        html.push_str("</table>");
    }

    if let Some(quote) = &submission.quote {
        let mut plan_rows = vec![
            row("Plano", quote.plano.label()),
            row("Preço anual", &format_brl(&quote.preco_anual)),
            row("Prêmio pro rata", &quote.premio_formatado),
            row("Dias restantes", &quote.dias_restantes.to_string()),
            row("Data de inclusão", &quote.data_inclusao.format("%d/%m/%Y").to_string()),
            row("Fim da vigência", &quote.data_final_vigencia.format("%d/%m/%Y").to_string()),
        ];
        if quote.data_ajustada {
            plan_rows.push(row("Observação", "Data ajustada para próximo dia útil"));
        }
        html.push_str(&section("Plano Selecionado", &plan_rows));
    }

    if let Some(group) = form.grupo.as_ref().filter(|g| g.pertence_grupo) {
        html.push_str(&section(
            "Grupo de Quiosques",
            &[
                row("ID do grupo", group.grupo_id.as_deref().unwrap_or("N/A")),
                row(
                    "Quiosque",
                    &group.numero_quiosque.unwrap_or(1).to_string(),
                ),
            ],
        ));
    }

    if !submission.anexos.is_empty() {
        html.push_str("<h3 style=\"color:#1f4e79\">Anexos</h3><ul>");
        for info in &submission.anexos {
            html.push_str(&format!(
                "<li>{} ({:.2} MB)</li>",
                escape_html(&info.name),
                info.size_mb
            ));
        }
        html.push_str("</ul>");
    }

    html.push_str(&format!(
        "<p style=\"color:#888;font-size:12px\">Enviado em {}</p></body></html>",
        format_timestamp_brazil(submission.timestamp_utc)
    ));
    html
}

// ============ Notifier ============

/// Composes and dispatches the enrollment notification.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: Arc<dyn Mailer>,
    from_email: String,
    from_name: String,
    insurer_email: String,
    send_applicant_copy: bool,
}

impl EmailNotifier {
    pub fn new(config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            insurer_email: config.insurer_email.clone(),
            send_applicant_copy: config.send_applicant_copy,
        }
    }

    /// Picks SendGrid or the preview mailer according to `EMAIL_TEST_MODE`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let mailer: Arc<dyn Mailer> = if config.email_test_mode {
            Arc::new(PreviewMailer::new())
        } else {
            Arc::new(SendGridMailer::new(config)?)
        };
        Ok(Self::new(config, mailer))
    }

    pub fn is_test_mode(&self) -> bool {
        self.mailer.is_preview()
    }

    fn message(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        files: &[AttachmentFile],
    ) -> EmailMessage {
        EmailMessage {
            from_email: self.from_email.clone(),
            from_name: self.from_name.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
            attachments: files.to_vec(),
        }
    }

    /// Sends the submission to the insurer, plus the applicant copy if enabled.
    ///
    /// Returns the rendered HTML in test mode. A failed applicant copy is
    /// logged and does not fail the submission.
    pub async fn notify(
        &self,
        submission: &Submission,
        attachments: &[AttachmentFile],
    ) -> Result<Option<String>, AppError> {
        let subject = subject_for(submission);
        let html = render_email_html(submission);

        self.mailer
            .send(&self.message(&self.insurer_email, &subject, &html, attachments))
            .await?;

        let applicant_email = submission.form.applicant.email.trim();
        if self.send_applicant_copy && !applicant_email.is_empty() {
            let copy = self.message(applicant_email, &subject, &html, &[]);
            if let Err(e) = self.mailer.send(&copy).await {
                tracing::warn!("Applicant copy to {} failed: {}", applicant_email, e);
            }
        }

        Ok(self.is_test_mode().then_some(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentForm, EquipmentItem, GroupInfo};
    use chrono::Utc;

    fn submission() -> Submission {
        let mut form = EnrollmentForm::default();
        form.applicant.nome_completo = "Maria <b>Souza</b>".to_string();
        form.applicant.cpf = "52998224725".to_string();
        form.applicant.email = "maria@example.com".to_string();
        form.equipamentos = vec![
            EquipmentItem {
                tipo: "Freezer".to_string(),
                descricao: "Horizontal".to_string(),
                valor: "R$ 3.000,00".to_string(),
            },
            EquipmentItem::default(),
        ];
        Submission {
            form,
            quote: None,
            timestamp_utc: Utc::now(),
            telefone_e164: None,
            anexos: Vec::new(),
        }
    }

    #[test]
    fn test_html_escapes_user_input() {
        let html = render_email_html(&submission());
        assert!(html.contains("Maria &lt;b&gt;Souza&lt;/b&gt;"));
        assert!(html.contains("529.982.247-25"));
        assert!(html.contains("Freezer"));
        assert!(!html.contains("<b>Souza"));
    }

    #[test]
    fn test_group_subject() {
        let mut sub = submission();
        assert_eq!(subject_for(&sub), DEFAULT_SUBJECT);

        sub.form.grupo = Some(GroupInfo {
            pertence_grupo: true,
            grupo_id: Some("G-42".to_string()),
            numero_quiosque: Some(3),
        });
        assert_eq!(
            subject_for(&sub),
            "🏪 Grupo de Quiosques - Quiosque 3 | ID: G-42"
        );
    }

    #[tokio::test]
    async fn test_preview_returns_html_and_copies_applicant() {
        let config = Config {
            send_applicant_copy: true,
            ..Config::default()
        };
        let mailer = Arc::new(PreviewMailer::new());
        let notifier = EmailNotifier::new(&config, mailer.clone());

        let preview = notifier.notify(&submission(), &[]).await.unwrap();

        assert!(preview.is_some());
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "informe@cpzseg.com.br");
        assert_eq!(sent[1].to, "maria@example.com");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_configuration_error() {
        let notifier = EmailNotifier::from_config(&Config::default()).unwrap();
        let err = notifier.notify(&submission(), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
