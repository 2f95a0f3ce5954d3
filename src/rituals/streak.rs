use chrono::NaiveDate;

use crate::db::models::Streak;

/// Streak after the pair completes the ritual dated `completed_on`.
///
/// Completing the same day twice, or an older day, changes nothing. The day
/// after the last completion extends the streak; any gap restarts it at 1.
pub fn advance(streak: &Streak, completed_on: NaiveDate) -> Streak {
    let current = match streak.last_completed_date {
        Some(last) if last >= completed_on => return streak.clone(),
        Some(last) if last.succ_opt() == Some(completed_on) => streak.current_streak + 1,
        _ => 1,
    };

    Streak {
        relationship_id: streak.relationship_id,
        current_streak: current,
        longest_streak: streak.longest_streak.max(current),
        last_completed_date: Some(completed_on),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn streak(current: i32, longest: i32, last: Option<NaiveDate>) -> Streak {
        Streak {
            relationship_id: Uuid::nil(),
            current_streak: current,
            longest_streak: longest,
            last_completed_date: last,
        }
    }

    #[test]
    fn first_completion_starts_at_one() {
        let next = advance(&streak(0, 0, None), day(1));
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.last_completed_date, Some(day(1)));
    }

    #[test]
    fn consecutive_days_extend() {
        let next = advance(&streak(3, 3, Some(day(4))), day(5));
        assert_eq!(next.current_streak, 4);
        assert_eq!(next.longest_streak, 4);
    }

    #[test]
    fn gap_resets_but_keeps_longest() {
        let next = advance(&streak(6, 9, Some(day(4))), day(6));
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 9);
    }

    #[test]
    fn same_or_earlier_day_is_a_no_op() {
        let s = streak(2, 5, Some(day(10)));
        assert_eq!(advance(&s, day(10)), s);
        assert_eq!(advance(&s, day(8)), s);
    }

    #[test]
    fn month_boundary_counts_as_consecutive() {
        let last = NaiveDate::from_ymd_opt(2026, 4, 30).unwrap();
        let next = advance(&streak(1, 1, Some(last)), day(1));
        assert_eq!(next.current_streak, 2);
    }
}
