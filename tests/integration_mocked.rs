/// Integration tests with mocked external APIs
/// Exercises the CNPJ/CEP lookups and SendGrid delivery without hitting real services
use chrono::NaiveDate;
use rust_adesao_api::config::Config;
use rust_adesao_api::enrollment::build_submission;
use rust_adesao_api::integrations::lookup_cache::LookupCache;
use rust_adesao_api::integrations::notifier::{
    EmailMessage, EmailNotifier, Mailer, SendGridMailer,
};
use std::sync::Arc;
use rust_adesao_api::integrations::services::{CepService, CnpjService};
use rust_adesao_api::errors::AppError;
use rust_adesao_api::models::{AddressLookup, AttachmentFile, EnrollmentForm};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(base_url: String) -> Config {
    Config {
        cnpj_api_base_url: base_url.clone(),
        cep_api_base_url: base_url.clone(),
        sendgrid_api_base_url: base_url,
        sendgrid_api_key: Some("SG.test".to_string()),
        lookup_timeout_secs: 1,
        lookup_max_retries: 2,
        ..Config::default()
    }
}

fn cache() -> LookupCache {
    LookupCache::new(Duration::from_secs(60), 100)
}

#[tokio::test]
async fn test_cnpj_lookup_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/cnpj/11222333000181"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "OK",
            "nome": "ACME COMERCIO LTDA",
            "cnpj": "11.222.333/0001-81"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CnpjService::new(&config, cache()).unwrap();

    let outcome = service.lookup("11.222.333/0001-81").await;
    assert!(outcome.found);
    assert_eq!(outcome.data.unwrap().razao_social, "ACME COMERCIO LTDA");

    // Second call is served from cache (mock expects a single request)
    let again = service.lookup("11222333000181").await;
    assert!(again.found);
}

#[tokio::test]
async fn test_cnpj_lookup_registry_error_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/cnpj/11222333000181"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ERROR",
            "message": "CNPJ rejeitado pela Receita Federal"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CnpjService::new(&config, cache()).unwrap();

    let outcome = service.lookup("11222333000181").await;
    assert!(!outcome.found);
    assert_eq!(
        outcome.message.as_deref(),
        Some("✗ Erro na consulta CNPJ: CNPJ rejeitado pela Receita Federal")
    );
}

#[tokio::test]
async fn test_cnpj_lookup_without_company_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/cnpj/11222333000181"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "OK",
            "nome": "   "
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CnpjService::new(&config, cache()).unwrap();

    let outcome = service.lookup("11222333000181").await;
    assert!(!outcome.found);
    assert!(outcome.data.is_none());
    assert_eq!(
        outcome.message.as_deref(),
        Some("CNPJ não encontrado na base de dados")
    );

    // Misses are not cached, the next lookup asks the registry again
    service.lookup("11222333000181").await;
}

#[tokio::test]
async fn test_cnpj_lookup_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/cnpj/11222333000181"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CnpjService::new(&config, cache()).unwrap();

    let outcome = service.lookup("11222333000181").await;
    assert!(!outcome.found);
    assert!(outcome
        .message
        .unwrap()
        .starts_with("✗ Erro na consulta do CNPJ"));
}

#[tokio::test]
async fn test_cnpj_lookup_timeout_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/cnpj/11222333000181"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "OK", "nome": "LENTA LTDA"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CnpjService::new(&config, cache()).unwrap();

    let outcome = service.lookup("11222333000181").await;
    assert_eq!(
        outcome.message.as_deref(),
        Some("⏱️ Timeout na consulta do CNPJ. Tente novamente.")
    );
}

#[tokio::test]
async fn test_breaker_opens_after_repeated_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CnpjService::new(&config, cache()).unwrap();

    // 2 attempts per lookup, breaker threshold is 5 consecutive failures
    for _ in 0..3 {
        service.lookup("11222333000181").await;
    }

    let outcome = service.lookup("11222333000181").await;
    assert!(outcome.message.unwrap().contains("indisponível"));
}

#[tokio::test]
async fn test_cep_lookup_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/22070002/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cep": "22070-002",
            "logradouro": "Avenida Atlântica",
            "bairro": "Copacabana",
            "localidade": "Rio de Janeiro",
            "uf": "RJ"
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CepService::new(&config, cache()).unwrap();

    let outcome = service.lookup("22070-002").await;
    assert_eq!(
        outcome.data,
        Some(AddressLookup {
            cep: "22070002".to_string(),
            logradouro: "Avenida Atlântica".to_string(),
            bairro: "Copacabana".to_string(),
            cidade: "Rio de Janeiro".to_string(),
            estado: "RJ".to_string(),
        })
    );
}

#[tokio::test]
async fn test_cep_not_found_leaves_address_unchanged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ws/99999999/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"erro": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CepService::new(&config, cache()).unwrap();

    let mut form = EnrollmentForm::default();
    form.address.logradouro = "Rua Existente".to_string();
    form.address.cidade = "Niterói".to_string();

    let outcome = service.lookup("99999-999").await;
    assert!(outcome.data.is_none());
    assert_eq!(outcome.message.as_deref(), Some("❌ CEP não encontrado."));
    if let Some(found) = &outcome.data {
        form.apply_address(found);
    }
    assert_eq!(form.address.logradouro, "Rua Existente");
    assert_eq!(form.address.cidade, "Niterói");
}

#[tokio::test]
async fn test_invalid_cep_never_calls_provider() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = CepService::new(&config, cache()).unwrap();

    let outcome = service.lookup("2207").await;
    assert_eq!(
        outcome.message.as_deref(),
        Some("❌ CEP deve conter apenas 8 números")
    );
}

fn message() -> EmailMessage {
    EmailMessage {
        from_email: "noreply@cpzseg.com.br".to_string(),
        from_name: "Grupo CPZ - Formulários".to_string(),
        to: "informe@cpzseg.com.br".to_string(),
        subject: "Nova Solicitação - Seguro Incêndio Conteúdos".to_string(),
        html: "<p>ok</p>".to_string(),
        attachments: vec![AttachmentFile {
            name: "nota.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content: b"%PDF".to_vec(),
        }],
    }
}

#[tokio::test]
async fn test_sendgrid_accepts_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer SG.test"))
        .and(body_partial_json(serde_json::json!({
            "subject": "Nova Solicitação - Seguro Incêndio Conteúdos",
            "attachments": [{"filename": "nota.pdf", "content": "JVBERg=="}]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let mailer = SendGridMailer::new(&config).unwrap();

    assert!(mailer.send(&message()).await.is_ok());
}

#[tokio::test]
async fn test_sendgrid_rejection_is_notification_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let mailer = SendGridMailer::new(&config).unwrap();

    let err = mailer.send(&message()).await.unwrap_err();
    assert!(matches!(err, AppError::NotificationError(_)));
}

#[tokio::test]
async fn test_failed_applicant_copy_does_not_fail_submission() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(body_partial_json(serde_json::json!({
            "personalizations": [{"to": [{"email": "informe@cpzseg.com.br"}]}]
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(body_partial_json(serde_json::json!({
            "personalizations": [{"to": [{"email": "maria@example.com"}]}]
        })))
        .respond_with(ResponseTemplate::new(500).set_body_string("mailbox unavailable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = Config {
        send_applicant_copy: true,
        ..create_test_config(mock_server.uri())
    };
    let notifier = EmailNotifier::new(&config, Arc::new(SendGridMailer::new(&config).unwrap()));

    let mut form = EnrollmentForm::default();
    form.applicant.nome_completo = "Maria Souza".to_string();
    form.applicant.email = "maria@example.com".to_string();
    let today = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
    let submission = build_submission(&config, &form, &[], today);

    let result = notifier.notify(&submission, &[]).await;
    assert!(matches!(result, Ok(None)));
}
