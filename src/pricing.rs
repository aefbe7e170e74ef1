//! Pro-rata premium calculation.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::NaiveDate;

use crate::calendar;
use crate::config::Config;
use crate::formatters::format_brl;
use crate::models::{Plan, PlanOption, Quote};

pub const DAYS_PER_YEAR: i64 = 365;

/// Days of coverage and pro-rated premium for an annual price.
///
/// `days_remaining` counts both endpoints. The premium is
/// `price / 365 * days_remaining` rounded half-even to cents. An end date
/// before the inclusion date is not rejected and yields a non-positive result.
pub fn calculate(
    plan_price_annual: &BigDecimal,
    inclusion_date: NaiveDate,
    end_date: NaiveDate,
) -> (i64, BigDecimal) {
    let days_remaining = (end_date - inclusion_date).num_days() + 1;
    if days_remaining <= 0 {
        tracing::warn!(
            "Inclusion date {} is after coverage end {}: {} day(s) remaining",
            inclusion_date,
            end_date,
            days_remaining
        );
    }

    // Multiply before dividing so the only inexact step is the final rounding.
    let premium = (plan_price_annual.clone() * BigDecimal::from(days_remaining))
        / BigDecimal::from(DAYS_PER_YEAR);
    (
        days_remaining,
        premium.with_scale_round(2, RoundingMode::HalfEven),
    )
}

/// Quote for `plan` when requested on `today`, starting on the next business day.
pub fn quote(config: &Config, plan: Plan, today: NaiveDate) -> Quote {
    let (data_inclusao, data_ajustada) = calendar::inclusion_date(today);
    let preco_anual = config.plan_price(plan).clone();
    let (dias_restantes, premio_pro_rata) =
        calculate(&preco_anual, data_inclusao, config.coverage_end_date);

    Quote {
        plano: plan,
        preco_anual,
        data_inclusao,
        data_final_vigencia: config.coverage_end_date,
        dias_restantes,
        premio_formatado: format_brl(&premio_pro_rata),
        premio_pro_rata,
        data_ajustada,
    }
}

/// Radio option text: "Opção 1 -\nR$ 2.505,53/ano".
pub fn option_label(plan: Plan, price: &BigDecimal) -> String {
    format!("{} -\n{}/ano", plan.label(), format_brl(price))
}

/// Every plan with its label and current quote.
pub fn plan_options(config: &Config, today: NaiveDate) -> Vec<PlanOption> {
    Plan::ALL
        .into_iter()
        .map(|plan| {
            let price = config.plan_price(plan).clone();
            PlanOption {
                plano: plan,
                rotulo: option_label(plan, &price),
                preco_anual: price,
                cotacao: quote(config, plan, today),
            }
        })
        .collect()
}
