//! Business-day resolution for the coverage inclusion date.
//!
//! Coverage starts on the next business day in Rio de Janeiro: weekends,
//! national holidays, RJ state holidays and the two municipal holidays of the
//! city are skipped.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use std::collections::BTreeMap;

use crate::formatters::brazil_offset;

/// Upper bound on days skipped while looking for a business day.
pub const MAX_ADVANCES: u32 = 30;

/// National fixed-date holidays used when a full calendar is unavailable.
pub const FIXED_NATIONAL_HOLIDAYS: &[(u32, u32)] = &[
    (1, 1),
    (4, 21),
    (5, 1),
    (9, 7),
    (10, 12),
    (11, 2),
    (11, 15),
    (12, 25),
];

/// Source of holidays for a region.
pub trait HolidayCalendar: Send + Sync {
    /// Named holidays of `year`, or `None` if they cannot be computed.
    fn holidays_in(&self, year: i32) -> Option<BTreeMap<NaiveDate, &'static str>>;
}

/// National + Rio de Janeiro state + Rio de Janeiro city holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct RioCalendar;

/// Minimal national list, independent of Easter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedNationalCalendar;

/// Easter Sunday (Gregorian), anonymous algorithm.
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    if year < 1583 {
        return None;
    }
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn fixed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

impl HolidayCalendar for FixedNationalCalendar {
    fn holidays_in(&self, year: i32) -> Option<BTreeMap<NaiveDate, &'static str>> {
        let names = [
            "Confraternização Universal",
            "Tiradentes",
            "Dia do Trabalhador",
            "Independência do Brasil",
            "Nossa Senhora Aparecida",
            "Finados",
            "Proclamação da República",
            "Natal",
        ];
        let mut holidays = BTreeMap::new();
        for ((month, day), name) in FIXED_NATIONAL_HOLIDAYS.iter().zip(names) {
            holidays.insert(fixed(year, *month, *day)?, name);
        }
        Some(holidays)
    }
}

impl HolidayCalendar for RioCalendar {
    fn holidays_in(&self, year: i32) -> Option<BTreeMap<NaiveDate, &'static str>> {
        let mut holidays = FixedNationalCalendar.holidays_in(year)?;
        let easter = easter_sunday(year)?;

        holidays.insert(easter - Duration::days(2), "Sexta-feira Santa");

        // RJ state holidays
        if year >= 2008 {
            holidays.insert(easter - Duration::days(47), "Carnaval");
            holidays.insert(fixed(year, 4, 23)?, "Dia de São Jorge");
        }
        // State holiday since 2002, national since 2024
        if year >= 2002 {
            holidays.insert(fixed(year, 11, 20)?, "Dia da Consciência Negra");
        }

        // Rio de Janeiro city holidays
        holidays
            .entry(fixed(year, 1, 20)?)
            .or_insert("São Sebastião");
        holidays
            .entry(fixed(year, 3, 1)?)
            .or_insert("Aniversário da Cidade do Rio de Janeiro");

        Some(holidays)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether `date` is a holiday in `calendar`, using the fixed national list
/// when the calendar cannot produce the year.
pub fn is_holiday(calendar: &dyn HolidayCalendar, date: NaiveDate) -> bool {
    match calendar.holidays_in(date.year()) {
        Some(holidays) => holidays.contains_key(&date),
        None => {
            tracing::warn!(
                "Holiday calendar unavailable for {}, using fixed national list",
                date.year()
            );
            FIXED_NATIONAL_HOLIDAYS.contains(&(date.month(), date.day()))
        }
    }
}

pub fn is_business_day(calendar: &dyn HolidayCalendar, date: NaiveDate) -> bool {
    !is_weekend(date) && !is_holiday(calendar, date)
}

/// First business day strictly after `today`.
///
/// Advances one day at a time and gives up after [`MAX_ADVANCES`] skips,
/// returning the last candidate.
pub fn next_business_day_with(calendar: &dyn HolidayCalendar, today: NaiveDate) -> NaiveDate {
    let mut candidate = today + Duration::days(1);
    let mut advances = 0;
    while advances < MAX_ADVANCES && !is_business_day(calendar, candidate) {
        candidate += Duration::days(1);
        advances += 1;
    }
    candidate
}

/// [`next_business_day_with`] using the Rio de Janeiro calendar.
pub fn next_business_day(today: NaiveDate) -> NaiveDate {
    next_business_day_with(&RioCalendar, today)
}

/// Inclusion date for a policy requested on `today`, and whether it was
/// pushed past tomorrow by a weekend or holiday.
pub fn inclusion_date(today: NaiveDate) -> (NaiveDate, bool) {
    let date = next_business_day(today);
    (date, date != today + Duration::days(1))
}

/// Today's date in Brasília time.
pub fn today_in_brazil() -> NaiveDate {
    Utc::now().with_timezone(&brazil_offset()).date_naive()
}

/// Named holidays of `year` in Rio de Janeiro, empty if unavailable.
pub fn list_holidays(year: i32) -> BTreeMap<NaiveDate, &'static str> {
    RioCalendar.holidays_in(year).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Unavailable;

    impl HolidayCalendar for Unavailable {
        fn holidays_in(&self, _year: i32) -> Option<BTreeMap<NaiveDate, &'static str>> {
            None
        }
    }

    #[test]
    fn test_easter_dates() {
        assert_eq!(easter_sunday(2024), Some(date(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(date(2025, 4, 20)));
        assert_eq!(easter_sunday(2026), Some(date(2026, 4, 5)));
    }

    #[test]
    fn test_rio_holidays_2025() {
        let holidays = list_holidays(2025);
        assert_eq!(holidays.get(&date(2025, 4, 18)), Some(&"Sexta-feira Santa"));
        assert_eq!(holidays.get(&date(2025, 3, 4)), Some(&"Carnaval"));
        assert_eq!(holidays.get(&date(2025, 1, 20)), Some(&"São Sebastião"));
        assert_eq!(
            holidays.get(&date(2025, 3, 1)),
            Some(&"Aniversário da Cidade do Rio de Janeiro")
        );
        assert!(holidays.contains_key(&date(2025, 4, 23)));
        assert!(holidays.contains_key(&date(2025, 11, 20)));
        assert!(holidays.contains_key(&date(2025, 12, 25)));
        assert!(!holidays.contains_key(&date(2025, 12, 24)));
    }

    #[test]
    fn test_weekday_before_business_day() {
        // Monday 2025-12-01 -> Tuesday
        assert_eq!(next_business_day(date(2025, 12, 1)), date(2025, 12, 2));
    }

    #[test]
    fn test_friday_skips_weekend() {
        assert_eq!(next_business_day(date(2025, 12, 5)), date(2025, 12, 8));
    }

    #[test]
    fn test_christmas_eve_skips_holiday_and_weekend() {
        // Thu 2026-12-24 -> Fri 25 holiday -> weekend -> Mon 28
        assert_eq!(next_business_day(date(2026, 12, 24)), date(2026, 12, 28));
    }

    #[test]
    fn test_carnival_and_municipal_holidays() {
        // Mon 2025-03-03 -> Tue 04 is Carnaval -> Wed 05
        assert_eq!(next_business_day(date(2025, 3, 3)), date(2025, 3, 5));
        // Sun 2025-01-19 -> Mon 20 São Sebastião -> Tue 21
        assert_eq!(next_business_day(date(2025, 1, 19)), date(2025, 1, 21));
    }

    #[test]
    fn test_inclusion_date_flags_adjustment() {
        assert_eq!(inclusion_date(date(2025, 12, 1)), (date(2025, 12, 2), false));
        assert_eq!(inclusion_date(date(2025, 12, 5)), (date(2025, 12, 8), true));
    }

    #[test]
    fn test_fallback_list_when_calendar_unavailable() {
        // 2025-04-18 is Good Friday; the fixed list does not know it.
        assert!(!is_holiday(&Unavailable, date(2025, 4, 18)));
        assert!(is_holiday(&Unavailable, date(2025, 11, 15)));
        // Thu 2026-12-24 -> Fri 25 (fixed list) -> weekend -> Mon 28
        assert_eq!(
            next_business_day_with(&Unavailable, date(2026, 12, 24)),
            date(2026, 12, 28)
        );
    }

    struct EveryDay;

    impl HolidayCalendar for EveryDay {
        fn holidays_in(&self, year: i32) -> Option<BTreeMap<NaiveDate, &'static str>> {
            let mut all = BTreeMap::new();
            let mut d = NaiveDate::from_ymd_opt(year, 1, 1)?;
            while d.year() == year {
                all.insert(d, "feriado");
                d += Duration::days(1);
            }
            Some(all)
        }
    }

    #[test]
    fn test_search_is_bounded() {
        let today = date(2025, 6, 1);
        assert_eq!(
            next_business_day_with(&EveryDay, today),
            today + Duration::days(1 + MAX_ADVANCES as i64)
        );
    }
}
