//! Academic calendar

use chrono::{Datelike, NaiveDate};
use curfew_util::SemesterId;
use std::fmt;

use crate::NoActiveSemester;

/// One of the two terms that have a dormitory roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// March through June
    First,
    /// September through December
    Second,
}

impl Term {
    /// Term covering the given month (1-12), if any
    pub fn for_month(month: u32) -> Option<Self> {
        match month {
            3..=6 => Some(Term::First),
            9..=12 => Some(Term::Second),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Term::First => 1,
            Term::Second => 2,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Map a business date to its semester id, `"<year>-<term>"`.
///
/// January, February, July and August are vacation months and have no roster.
pub fn resolve_semester(date: NaiveDate) -> Result<SemesterId, NoActiveSemester> {
    let term = Term::for_month(date.month()).ok_or(NoActiveSemester { date })?;
    Ok(SemesterId::new(format!("{}-{}", date.year(), term)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_term_boundaries_are_inclusive() {
        assert_eq!(resolve_semester(date(2024, 3, 1)).unwrap().as_str(), "2024-1");
        assert_eq!(resolve_semester(date(2024, 6, 30)).unwrap().as_str(), "2024-1");
        assert_eq!(resolve_semester(date(2024, 9, 1)).unwrap().as_str(), "2024-2");
        assert_eq!(resolve_semester(date(2024, 12, 31)).unwrap().as_str(), "2024-2");
    }

    #[test]
    fn test_vacation_months_have_no_semester() {
        for (m, d) in [(1, 15), (2, 29), (7, 1), (8, 31)] {
            let day = date(2024, m, d);
            assert_eq!(resolve_semester(day), Err(NoActiveSemester { date: day }));
        }
    }

    #[test]
    fn test_year_comes_from_the_date() {
        assert_eq!(resolve_semester(date(2025, 5, 1)).unwrap().as_str(), "2025-1");
        assert_eq!(resolve_semester(date(2023, 10, 9)).unwrap().as_str(), "2023-2");
    }
}
