use chrono::NaiveDate;
use serde::Serialize;

/// Days before the due date at which a case counts as urgent.
pub const URGENT_WITHIN_DAYS: i64 = 7;
pub const CRITICAL_WITHIN_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    NoDate,
    Overdue,
    Critical,
    Warning,
    Normal,
}

impl UrgencyTier {
    pub const ALL: &'static [UrgencyTier] = &[
        UrgencyTier::NoDate,
        UrgencyTier::Overdue,
        UrgencyTier::Critical,
        UrgencyTier::Warning,
        UrgencyTier::Normal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyTier::NoDate => "no_date",
            UrgencyTier::Overdue => "overdue",
            UrgencyTier::Critical => "critical",
            UrgencyTier::Warning => "warning",
            UrgencyTier::Normal => "normal",
        }
    }
}

pub fn days_until_due(due: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    due.map(|due| (due - today).num_days())
}

pub fn classify(due: Option<NaiveDate>, today: NaiveDate) -> UrgencyTier {
    match days_until_due(due, today) {
        None => UrgencyTier::NoDate,
        Some(days) if days < 0 => UrgencyTier::Overdue,
        Some(days) if days <= CRITICAL_WITHIN_DAYS => UrgencyTier::Critical,
        Some(days) if days <= URGENT_WITHIN_DAYS => UrgencyTier::Warning,
        Some(_) => UrgencyTier::Normal,
    }
}

/// Value of the stored `urgent` flag; recomputed whenever a case is written.
pub fn is_urgent(due: Option<NaiveDate>, today: NaiveDate) -> bool {
    days_until_due(due, today).is_some_and(|days| days <= URGENT_WITHIN_DAYS)
}
