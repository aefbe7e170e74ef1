//! Insurance Enrollment Form API Library
//!
//! Backend for the "Formulário de Adesão" of the content-fire insurance:
//! pro-rata pricing on the next business day, Brazilian document validation,
//! CNPJ/CEP lookups and the email notification of each enrollment.
//!
//! # Modules
//!
//! - `api`: Route table and shared HTTP layers.
//! - `core`: Domain logic (models, rules, workflow).
//! - `integrations`: External services (lookups, email).
//! - `calendar`: Next business day in Rio de Janeiro.
//! - `circuit_breaker`: Breaker for lookup providers.
//! - `config`: Configuration management.
//! - `enrollment`: Submission workflow.
//! - `errors`: Error handling types.
//! - `formatters`: Document masks and currency.
//! - `handlers`: HTTP request handlers.
//! - `lookup_cache`: Checksummed lookup cache.
//! - `models`: Form and API data models.
//! - `notifier`: Email composition and delivery.
//! - `pricing`: Pro-rata premium.
//! - `services`: CNPJ and CEP lookup clients.
//! - `session`: Server-side form sessions.
//! - `validators`: Field and attachment validation.

pub mod api;
pub mod core;
pub mod integrations;

pub mod calendar;
pub mod circuit_breaker;
pub mod config;
pub mod enrollment;
pub mod errors;
pub mod formatters;
pub mod handlers;
pub mod lookup_cache;
pub mod models;
pub mod notifier;
pub mod pricing;
pub mod services;
pub mod session;
pub mod validators;
