//! Display formatting for Brazilian documents, phone numbers and currency.
//!
//! Formatters only apply a mask when the digit count is exactly right;
//! anything else is returned as typed so nothing the user entered is lost.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::validators::digits_only;

/// `XX.XXX.XXX/XXXX-XX`
pub fn format_cnpj(raw: &str) -> String {
    let d = digits_only(raw);
    if d.len() == 14 {
        return format!("{}.{}.{}/{}-{}", &d[..2], &d[2..5], &d[5..8], &d[8..12], &d[12..]);
    }
    raw.to_string()
}

/// `XXX.XXX.XXX-XX`
pub fn format_cpf(raw: &str) -> String {
    let d = digits_only(raw);
    if d.len() == 11 {
        return format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]);
    }
    raw.to_string()
}

/// `XXXXX-XXX`
pub fn format_cep(raw: &str) -> String {
    let d = digits_only(raw);
    if d.len() == 8 {
        return format!("{}-{}", &d[..5], &d[5..]);
    }
    raw.to_string()
}

/// `(XX) XXXXX-XXXX` for mobiles, `(XX) XXXX-XXXX` for landlines.
pub fn format_phone(raw: &str) -> String {
    let d = digits_only(raw);
    match d.len() {
        11 => format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..]),
        10 => format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..]),
        _ => raw.to_string(),
    }
}

/// Formats a value as Brazilian reais: `R$ 1.234,56`.
pub fn format_brl(value: &BigDecimal) -> String {
    let rounded = value.with_scale_round(2, RoundingMode::HalfEven);
    let text = rounded.to_string();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, text),
    };
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), format!("{:0<2}", f)),
        None => (text.clone(), "00".to_string()),
    };

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("R$ {}{},{}", sign, grouped, frac_part)
}

/// First token of a full name, used to greet the applicant.
pub fn first_name(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Brasília offset (UTC-3, no daylight saving since 2019).
pub fn brazil_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

/// `dd/mm/YYYY às HH:MM:SS` in Brasília time.
pub fn format_timestamp_brazil(at: DateTime<Utc>) -> String {
    at.with_timezone(&brazil_offset())
        .format("%d/%m/%Y às %H:%M:%S")
        .to_string()
}
