//! Period resolution for reflections
//! Maps a period label (and optional day override) onto a concrete date window

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest window a reflection may cover
pub const MAX_PERIOD_DAYS: u32 = 3650;

/// Reflection period label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodLabel {
    Week,
    Month,
    Quarter,
    Custom,
}

impl PeriodLabel {
    /// Look-back length implied by the label
    pub fn default_days(&self) -> u32 {
        match self {
            PeriodLabel::Week => 7,
            PeriodLabel::Month => 30,
            PeriodLabel::Quarter => 90,
            PeriodLabel::Custom => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodLabel::Week => "week",
            PeriodLabel::Month => "month",
            PeriodLabel::Quarter => "quarter",
            PeriodLabel::Custom => "custom",
        }
    }

    /// Parse a user-supplied label; anything unrecognised becomes `Custom`
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "week" | "weekly" => PeriodLabel::Week,
            "month" | "monthly" => PeriodLabel::Month,
            "quarter" | "quarterly" => PeriodLabel::Quarter,
            _ => PeriodLabel::Custom,
        }
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date window a reflection covers. Ephemeral, computed per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub subject: Option<String>,
    pub period_label: PeriodLabel,
}

impl PeriodWindow {
    /// Resolve a window ending at `now`.
    ///
    /// `explicit_days` overrides the label-derived length and is capped at
    /// [`MAX_PERIOD_DAYS`]. The result has no subject; attach one with
    /// [`PeriodWindow::for_subject`].
    pub fn resolve(period_label: PeriodLabel, explicit_days: Option<u32>, now: NaiveDate) -> Self {
        let days = explicit_days
            .unwrap_or_else(|| period_label.default_days())
            .min(MAX_PERIOD_DAYS);
        let start_date = now
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);

        Self {
            start_date,
            end_date: now,
            subject: None,
            period_label,
        }
    }

    pub fn for_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    /// Closed-interval membership test
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Number of days looked back from `end_date`
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// The `span_days` most recent calendar days, oldest first: `(start_date, end_date]`
    pub fn backfill_days(&self) -> Vec<NaiveDate> {
        self.start_date
            .iter_days()
            .skip(1)
            .take_while(|day| *day <= self.end_date)
            .collect()
    }
}

impl fmt::Display for PeriodWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_explicit_days_are_capped() {
        let now = date(2024, 1, 7);
        let window = PeriodWindow::resolve(PeriodLabel::Custom, Some(u32::MAX), now);
        assert_eq!(window.span_days(), i64::from(MAX_PERIOD_DAYS));
        assert_eq!(window.backfill_days().len(), MAX_PERIOD_DAYS as usize);
    }

    #[test]
    fn test_week_resolves_to_seven_days_back() {
        let now = date(2024, 1, 7);
        let window = PeriodWindow::resolve(PeriodLabel::Week, None, now);
        assert_eq!(window.start_date, date(2023, 12, 31));
        assert_eq!(window.end_date, now);
        assert_eq!(window.subject, None);
    }

    #[test]
    fn test_label_lengths() {
        let now = date(2024, 6, 30);
        assert_eq!(PeriodWindow::resolve(PeriodLabel::Month, None, now).span_days(), 30);
        assert_eq!(PeriodWindow::resolve(PeriodLabel::Quarter, None, now).span_days(), 90);
        assert_eq!(PeriodWindow::resolve(PeriodLabel::Custom, None, now).span_days(), 7);
    }

    #[test]
    fn test_explicit_days_override_label() {
        let now = date(2024, 3, 15);
        let window = PeriodWindow::resolve(PeriodLabel::Month, Some(10), now);
        assert_eq!(window.start_date, date(2024, 3, 5));
        assert_eq!(window.period_label, PeriodLabel::Month);
    }

    #[test]
    fn test_resolve_is_deterministic_across_month_boundaries() {
        for offset in 0..400u64 {
            let now = date(2023, 1, 1) + Days::new(offset);
            for days in [0u32, 1, 7, 30, 90] {
                let a = PeriodWindow::resolve(PeriodLabel::Custom, Some(days), now);
                let b = PeriodWindow::resolve(PeriodLabel::Custom, Some(days), now);
                assert_eq!(a, b);
                assert_eq!(a.span_days(), i64::from(days));
                assert!(a.start_date <= a.end_date);
            }
        }
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(PeriodLabel::parse("week"), PeriodLabel::Week);
        assert_eq!(PeriodLabel::parse("Monthly"), PeriodLabel::Month);
        assert_eq!(PeriodLabel::parse(" quarter "), PeriodLabel::Quarter);
        assert_eq!(PeriodLabel::parse("fortnight"), PeriodLabel::Custom);
    }

    #[test]
    fn test_backfill_days_excludes_window_start() {
        let window = PeriodWindow::resolve(PeriodLabel::Week, None, date(2024, 1, 7));
        let days = window.backfill_days();
        assert_eq!(days.len(), 7);
        assert_eq!(days.first(), Some(&date(2024, 1, 1)));
        assert_eq!(days.last(), Some(&date(2024, 1, 7)));
        assert!(days.iter().all(|d| window.contains(*d)));
    }

    #[test]
    fn test_zero_day_window_has_no_backfill_days() {
        let window = PeriodWindow::resolve(PeriodLabel::Week, Some(0), date(2024, 1, 7));
        assert!(window.backfill_days().is_empty());
        assert!(window.contains(date(2024, 1, 7)));
    }
}
