use crate::circuit_breaker::{create_lookup_circuit_breaker, LookupBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::lookup_cache::LookupCache;
use crate::models::{AddressLookup, CompanyLookup, LookupOutcome};
use crate::validators::digits_only;
use failsafe::CircuitBreaker;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

// ============ Provider payloads ============

/// ReceitaWS answer. `status` is "OK" or "ERROR".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReceitaWsResponse {
    pub status: String,
    pub nome: Option<String>,
    pub message: Option<String>,
}

/// ViaCEP answer. Unknown codes come back as `{"erro": true}` with HTTP 200.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViaCepResponse {
    pub erro: Option<serde_json::Value>,
    pub logradouro: String,
    pub bairro: String,
    pub localidade: String,
    pub uf: String,
}

impl ViaCepResponse {
    fn is_error(&self) -> bool {
        match &self.erro {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(flag)) => flag != "false",
            Some(_) => true,
        }
    }
}

// ============ Shared retry loop ============

/// Why every attempt of a lookup failed.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupFailure {
    Timeout,
    /// The provider's breaker is open.
    Unavailable,
    Failed(String),
}

/// HTTP client shared by the lookup services: timeout, bounded attempts and a
/// circuit breaker per provider.
#[derive(Clone)]
struct LookupClient {
    provider: &'static str,
    client: Client,
    max_retries: u32,
    breaker: LookupBreaker,
}

impl LookupClient {
    fn new(provider: &'static str, config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.lookup_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::Configuration(format!("Failed to create {} client: {}", provider, e))
            })?;

        Ok(Self {
            provider,
            client,
            max_retries: config.lookup_max_retries.max(1),
            breaker: create_lookup_circuit_breaker(),
        })
    }

    async fn attempt<T: DeserializeOwned>(&self, url: &str) -> Result<T, LookupFailure> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        if !response.status().is_success() {
            return Err(LookupFailure::Failed(format!(
                "{} returned status {}",
                self.provider,
                response.status()
            )));
        }

        response.json::<T>().await.map_err(classify)
    }

    /// GETs `url` and decodes the JSON body, retrying transport failures up to
    /// `max_retries` attempts in total. Each attempt's outcome feeds the breaker.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, LookupFailure> {
        let mut last_failure = LookupFailure::Failed("no attempt made".to_string());

        for attempt in 1..=self.max_retries {
            if !self.breaker.is_call_permitted() {
                tracing::warn!("{} circuit open, skipping lookup", self.provider);
                return Err(LookupFailure::Unavailable);
            }

            let result = self.attempt::<T>(url).await;
            let recorded = result.as_ref().map(|_| ()).map_err(|_| ());
            let _ = self.breaker.call(|| recorded);

            match result {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    tracing::warn!(
                        "{} lookup attempt {}/{} failed: {:?}",
                        self.provider,
                        attempt,
                        self.max_retries,
                        failure
                    );
                    last_failure = failure;
                }
            }
        }

        Err(last_failure)
    }
}

fn classify(err: reqwest::Error) -> LookupFailure {
    if err.is_timeout() {
        LookupFailure::Timeout
    } else {
        LookupFailure::Failed(err.to_string())
    }
}

// ============ CNPJ ============

pub const CNPJ_CACHE_KIND: &str = "cnpj";

/// Company-name lookup by CNPJ against ReceitaWS.
#[derive(Clone)]
pub struct CnpjService {
    http: LookupClient,
    base_url: String,
    cache: LookupCache,
}

impl CnpjService {
    pub fn new(config: &Config, cache: LookupCache) -> Result<Self, AppError> {
        Ok(Self {
            http: LookupClient::new("ReceitaWS", config)?,
            base_url: config.cnpj_api_base_url.clone(),
            cache,
        })
    }

    /// Looks up the razão social for `cnpj` (any punctuation accepted).
    pub async fn lookup(&self, cnpj: &str) -> LookupOutcome<CompanyLookup> {
        let digits = digits_only(cnpj);
        if digits.len() != 14 {
            return LookupOutcome::missing("❌ CNPJ deve conter apenas 14 números");
        }

        if let Some(hit) = self.cache.get::<CompanyLookup>(CNPJ_CACHE_KIND, &digits).await {
            return LookupOutcome::found(hit);
        }

        let url = format!("{}/v1/cnpj/{}", self.base_url, digits);
        tracing::info!("Looking up CNPJ {}", digits);

        let body: ReceitaWsResponse = match self.http.get_json(&url).await {
            Ok(body) => body,
            Err(LookupFailure::Timeout) => {
                return LookupOutcome::missing("⏱️ Timeout na consulta do CNPJ. Tente novamente.")
            }
            Err(LookupFailure::Unavailable) => {
                return LookupOutcome::missing(
                    "⚠️ Serviço de consulta de CNPJ indisponível. Tente novamente em instantes.",
                )
            }
            Err(LookupFailure::Failed(e)) => {
                return LookupOutcome::missing(format!("✗ Erro na consulta do CNPJ: {}", e))
            }
        };

        if body.status != "OK" {
            let reason = body
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "CNPJ inválido".to_string());
            tracing::info!("CNPJ {} rejected by registry: {}", digits, reason);
            return LookupOutcome::missing(format!("✗ Erro na consulta CNPJ: {}", reason));
        }

        let razao_social = body.nome.unwrap_or_default().trim().to_string();
        if razao_social.is_empty() {
            return LookupOutcome::missing("CNPJ não encontrado na base de dados");
        }

        let company = CompanyLookup {
            cnpj: digits.clone(),
            razao_social,
        };
        self.cache.insert(CNPJ_CACHE_KIND, &digits, &company).await;
        tracing::info!("✓ CNPJ {} resolved to '{}'", digits, company.razao_social);
        LookupOutcome::found(company)
    }
}

// ============ CEP ============

pub const CEP_CACHE_KIND: &str = "cep";

/// Address lookup by CEP against ViaCEP.
#[derive(Clone)]
pub struct CepService {
    http: LookupClient,
    base_url: String,
    cache: LookupCache,
}

impl CepService {
    pub fn new(config: &Config, cache: LookupCache) -> Result<Self, AppError> {
        Ok(Self {
            http: LookupClient::new("ViaCEP", config)?,
            base_url: config.cep_api_base_url.clone(),
            cache,
        })
    }

    /// Looks up street, district, city and state for `cep`.
    pub async fn lookup(&self, cep: &str) -> LookupOutcome<AddressLookup> {
        let digits = digits_only(cep);
        if digits.len() != 8 {
            return LookupOutcome::missing("❌ CEP deve conter apenas 8 números");
        }

        if let Some(hit) = self.cache.get::<AddressLookup>(CEP_CACHE_KIND, &digits).await {
            return LookupOutcome::found(hit);
        }

        let url = format!("{}/ws/{}/json/", self.base_url, digits);
        tracing::info!("Looking up CEP {}", digits);

        let body: ViaCepResponse = match self.http.get_json(&url).await {
            Ok(body) => body,
            Err(LookupFailure::Timeout) => {
                return LookupOutcome::missing("⏱️ Timeout na consulta do CEP. Tente novamente.")
            }
            Err(LookupFailure::Unavailable) => {
                return LookupOutcome::missing(
                    "⚠️ Serviço de consulta de CEP indisponível. Tente novamente em instantes.",
                )
            }
            Err(LookupFailure::Failed(e)) => {
                return LookupOutcome::missing(format!("✗ Erro na consulta do CEP: {}", e))
            }
        };

        if body.is_error() {
            tracing::info!("CEP {} not found", digits);
            return LookupOutcome::missing("❌ CEP não encontrado.");
        }

        let address = AddressLookup {
            cep: digits.clone(),
            logradouro: body.logradouro,
            bairro: body.bairro,
            cidade: body.localidade,
            estado: body.uf,
        };
        self.cache.insert(CEP_CACHE_KIND, &digits, &address).await;
        tracing::info!("✓ CEP {} resolved to {}/{}", digits, address.cidade, address.estado);
        LookupOutcome::found(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        Config {
            cnpj_api_base_url: "http://127.0.0.1:9".to_string(),
            cep_api_base_url: "http://127.0.0.1:9".to_string(),
            lookup_timeout_secs: 1,
            ..Config::default()
        }
    }

    fn cache() -> LookupCache {
        LookupCache::new(Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn test_short_cnpj_is_rejected_before_request() {
        let service = CnpjService::new(&offline_config(), cache()).unwrap();
        let outcome = service.lookup("11.222.333").await;
        assert!(!outcome.found);
        assert_eq!(
            outcome.message.as_deref(),
            Some("❌ CNPJ deve conter apenas 14 números")
        );
    }

    #[tokio::test]
    async fn test_cached_cep_skips_network() {
        let cache = cache();
        let address = AddressLookup {
            cep: "22070002".to_string(),
            logradouro: "Avenida Atlântica".to_string(),
            bairro: "Copacabana".to_string(),
            cidade: "Rio de Janeiro".to_string(),
            estado: "RJ".to_string(),
        };
        cache.insert(CEP_CACHE_KIND, "22070002", &address).await;

        let service = CepService::new(&offline_config(), cache).unwrap();
        let outcome = service.lookup("22070-002").await;
        assert_eq!(outcome.data, Some(address));
    }

    #[test]
    fn test_viacep_error_flag_variants() {
        let parse = |s: &str| serde_json::from_str::<ViaCepResponse>(s).unwrap();
        assert!(parse(r#"{"erro": true}"#).is_error());
        assert!(parse(r#"{"erro": "true"}"#).is_error());
        assert!(!parse(r#"{"logradouro": "Rua A", "localidade": "Rio"}"#).is_error());
    }
}
