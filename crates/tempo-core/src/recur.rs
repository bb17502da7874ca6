use chrono::{Days, Months, NaiveDate};

use crate::task::Recur;

/// Next due date for a completed recurring task. Pure date arithmetic:
/// the caller decides what the base date is (the original due date, or
/// today when the task had none).
pub fn next_occurrence(base: NaiveDate, recur: Recur) -> Option<NaiveDate> {
    match recur {
        Recur::None => None,
        Recur::Daily => base.checked_add_days(Days::new(1)),
        Recur::Weekly => base.checked_add_days(Days::new(7)),
        Recur::Monthly => base.checked_add_months(Months::new(1)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::next_occurrence;
    use crate::task::Recur;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn non_recurring_has_no_next_occurrence() {
        assert_eq!(next_occurrence(date(2024, 1, 1), Recur::None), None);
    }

    #[test]
    fn daily_advances_one_day() {
        assert_eq!(
            next_occurrence(date(2024, 2, 28), Recur::Daily),
            Some(date(2024, 2, 29))
        );
    }

    #[test]
    fn weekly_advances_seven_days() {
        assert_eq!(
            next_occurrence(date(2024, 1, 1), Recur::Weekly),
            Some(date(2024, 1, 8))
        );
    }

    #[test]
    fn monthly_advances_one_calendar_month() {
        assert_eq!(
            next_occurrence(date(2024, 3, 15), Recur::Monthly),
            Some(date(2024, 4, 15))
        );
    }

    // Pins chrono's month arithmetic: when the target month is shorter, the
    // day clamps to the last day of that month. Jan 31 + 1 month is Feb 29
    // in a leap year and Feb 28 otherwise.
    #[test]
    fn monthly_end_of_month_clamps_to_shorter_month() {
        assert_eq!(
            next_occurrence(date(2024, 1, 31), Recur::Monthly),
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            next_occurrence(date(2023, 1, 31), Recur::Monthly),
            Some(date(2023, 2, 28))
        );
    }
}
