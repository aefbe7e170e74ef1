use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

use crate::models::Plan;

/// Default end of the coverage period shared by every plan.
pub const DEFAULT_COVERAGE_END_DATE: &str = "2025-12-08";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Fixed last day of coverage used by the pro-rata calculation.
    pub coverage_end_date: NaiveDate,
    /// Annual prices for Opção 1, 2 and 3, in that order.
    pub plan_prices: [BigDecimal; 3],
    pub cnpj_api_base_url: String,
    pub cep_api_base_url: String,
    pub lookup_timeout_secs: u64,
    pub lookup_max_retries: u32,
    pub lookup_cache_ttl_secs: u64,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_api_base_url: String,
    pub from_email: String,
    pub from_name: String,
    pub insurer_email: String,
    pub send_applicant_copy: bool,
    pub email_test_mode: bool,
    pub strict_cpf: bool,
    pub session_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            coverage_end_date: NaiveDate::from_ymd_opt(2025, 12, 8).unwrap_or_default(),
            plan_prices: Plan::ALL.map(|plan| plan.default_price()),
            cnpj_api_base_url: "https://www.receitaws.com.br".to_string(),
            cep_api_base_url: "https://viacep.com.br".to_string(),
            lookup_timeout_secs: 10,
            lookup_max_retries: 2,
            lookup_cache_ttl_secs: 3600,
            sendgrid_api_key: None,
            sendgrid_api_base_url: "https://api.sendgrid.com".to_string(),
            from_email: "noreply@cpzseg.com.br".to_string(),
            from_name: "Grupo CPZ - Formulários".to_string(),
            insurer_email: "informe@cpzseg.com.br".to_string(),
            send_applicant_copy: false,
            email_test_mode: false,
            strict_cpf: false,
            session_ttl_secs: 3600,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_url(key: &str, default: &str) -> anyhow::Result<String> {
    let url = env_or(key, default);
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))?;
    Ok(url.trim_end_matches('/').to_string())
}

fn parse_number<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T> {
    env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid number", key))
}

fn parse_bool(key: &str) -> anyhow::Result<bool> {
    match env_or(key, "false").trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "sim" => Ok(true),
        "0" | "false" | "no" | "nao" | "não" => Ok(false),
        other => anyhow::bail!("{} must be true or false, got '{}'", key, other),
    }
}

fn parse_price(key: &str, default: &BigDecimal) -> anyhow::Result<BigDecimal> {
    let raw = env_or(key, &default.to_string());
    let price = BigDecimal::from_str(raw.trim())
        .map_err(|_| anyhow::anyhow!("{} must be a decimal price, got '{}'", key, raw))?;
    if price <= BigDecimal::from(0) {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(price)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let coverage_end_date = {
            let raw = env_or("COVERAGE_END_DATE", DEFAULT_COVERAGE_END_DATE);
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                anyhow::anyhow!("COVERAGE_END_DATE must be YYYY-MM-DD, got '{}'", raw)
            })?
        };

        let plan_prices = [
            parse_price("PLAN_PRICE_OPCAO_1", &defaults.plan_prices[0])?,
            parse_price("PLAN_PRICE_OPCAO_2", &defaults.plan_prices[1])?,
            parse_price("PLAN_PRICE_OPCAO_3", &defaults.plan_prices[2])?,
        ];

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            coverage_end_date,
            plan_prices,
            cnpj_api_base_url: parse_url("CNPJ_API_BASE_URL", &defaults.cnpj_api_base_url)?,
            cep_api_base_url: parse_url("CEP_API_BASE_URL", &defaults.cep_api_base_url)?,
            lookup_timeout_secs: parse_number("LOOKUP_TIMEOUT_SECS", "10")?,
            lookup_max_retries: parse_number::<u32>("LOOKUP_MAX_RETRIES", "2")?.max(1),
            lookup_cache_ttl_secs: parse_number("LOOKUP_CACHE_TTL_SECS", "3600")?,
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            sendgrid_api_base_url: parse_url(
                "SENDGRID_API_BASE_URL",
                &defaults.sendgrid_api_base_url,
            )?,
            from_email: env_or("SENDGRID_FROM_EMAIL", &defaults.from_email),
            from_name: env_or("SENDGRID_FROM_NAME", &defaults.from_name),
            insurer_email: env_or("SENDGRID_EMAIL_DESTINO", &defaults.insurer_email),
            send_applicant_copy: parse_bool("SEND_APPLICANT_COPY")?,
            email_test_mode: parse_bool("EMAIL_TEST_MODE")?,
            strict_cpf: parse_bool("STRICT_CPF")?,
            session_ttl_secs: parse_number("SESSION_TTL_SECS", "3600")?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Coverage end date: {}", config.coverage_end_date);
        tracing::debug!("CNPJ API: {}", config.cnpj_api_base_url);
        tracing::debug!("CEP API: {}", config.cep_api_base_url);
        tracing::debug!("Server Port: {}", config.port);
        if config.email_test_mode {
            tracing::warn!("EMAIL_TEST_MODE enabled: submissions are previewed, not sent");
        } else if config.sendgrid_api_key.is_none() {
            tracing::warn!("SENDGRID_API_KEY not set: submissions will fail until configured");
        }

        Ok(config)
    }

    /// Annual price configured for a plan.
    pub fn plan_price(&self, plan: Plan) -> &BigDecimal {
        &self.plan_prices[plan.index()]
    }
}
