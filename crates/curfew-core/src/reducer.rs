//! Latest-entry reduction

use chrono::NaiveDateTime;
use curfew_store::EntryEvent;
use curfew_util::StudentId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Reduce a day's entry events to each student's last entry.
///
/// Input order does not matter. A strictly later timestamp replaces the held
/// one; on a tie the first seen is kept.
pub fn latest_entries<I>(events: I) -> HashMap<StudentId, NaiveDateTime>
where
    I: IntoIterator<Item = EntryEvent>,
{
    events.into_iter().fold(HashMap::new(), |mut latest, event| {
        match latest.entry(event.student_id) {
            Entry::Occupied(mut held) => {
                if event.timestamp > *held.get() {
                    held.insert(event.timestamp);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(event.timestamp);
            }
        }
        latest
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sample() -> Vec<EntryEvent> {
        vec![
            EntryEvent::new("u1", at(8, 0, 0)),
            EntryEvent::new("u2", at(12, 0, 0)),
            EntryEvent::new("u1", at(20, 0, 0)),
            EntryEvent::new("u1", at(16, 30, 0)),
            EntryEvent::new("u2", at(12, 0, 0)),
        ]
    }

    #[test]
    fn test_empty_input() {
        assert!(latest_entries(Vec::new()).is_empty());
    }

    #[test]
    fn test_keeps_latest_per_student() {
        let latest = latest_entries(sample());
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&StudentId::new("u1")], at(20, 0, 0));
        assert_eq!(latest[&StudentId::new("u2")], at(12, 0, 0));
    }

    #[test]
    fn test_order_does_not_matter() {
        let expected = latest_entries(sample());

        let mut events = sample();
        events.reverse();
        assert_eq!(latest_entries(events), expected);

        for shift in 1..sample().len() {
            let mut events = sample();
            events.rotate_left(shift);
            assert_eq!(latest_entries(events), expected);
        }
    }

    #[test]
    fn test_sub_second_ordering() {
        let base = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let earlier = base.and_hms_milli_opt(17, 0, 0, 0).unwrap();
        let later = base.and_hms_milli_opt(17, 0, 0, 1).unwrap();

        let latest = latest_entries(vec![
            EntryEvent::new("u1", later),
            EntryEvent::new("u1", earlier),
        ]);
        assert_eq!(latest[&StudentId::new("u1")], later);
    }
}
