//! Derived reception fields: total units, shelf life and expiry status.
//!
//! Every function here is pure. Inputs that are missing or unparsable degrade to
//! zero (or [`StatusKind::Fresh`]) instead of failing, so a half-filled form can
//! still be displayed.

use std::cmp::Ordering;

use time::{Date, OffsetDateTime};

use crate::StatusKind;

#[must_use]
pub fn total_units(cartons: Option<u32>, units_per_carton: Option<u32>) -> u64 {
    match (cartons, units_per_carton) {
        (Some(cartons), Some(units_per_carton)) => {
            u64::from(cartons) * u64::from(units_per_carton)
        }
        _ => 0,
    }
}

/// [`total_units`] over raw form text; anything that is not a non-negative
/// integer counts as absent.
#[must_use]
pub fn total_units_from_text(cartons: &str, units_per_carton: &str) -> u64 {
    total_units(cartons.trim().parse().ok(), units_per_carton.trim().parse().ok())
}

/// Whole calendar months from `from` to `to`, truncated toward zero.
///
/// A month only counts once the day-of-month boundary is reached. When the
/// target month is shorter than the start day, its last day is the boundary
/// (Jan 31 to Feb 29 is one month).
#[must_use]
pub fn months_between(from: Date, to: Date) -> i32 {
    match to.cmp(&from) {
        Ordering::Equal => 0,
        Ordering::Greater => whole_months_forward(from, to),
        Ordering::Less => -whole_months_forward(to, from),
    }
}

#[must_use]
pub fn shelf_life_months(production_date: Option<Date>, expiration_date: Option<Date>) -> i32 {
    match (production_date, expiration_date) {
        (Some(production), Some(expiration)) => months_between(production, expiration),
        _ => 0,
    }
}

/// Classify a reception against `now`.
///
/// Expired once `now` reaches the expiration date. Otherwise near expiry when the
/// months elapsed since production reach one third of the shelf life (inclusive).
/// A zero or negative shelf life therefore never reports fresh for elapsed >= 0.
#[must_use]
pub fn compute_status(
    production_date: Option<Date>,
    expiration_date: Option<Date>,
    now: OffsetDateTime,
) -> StatusKind {
    let (Some(production), Some(expiration)) = (production_date, expiration_date) else {
        return StatusKind::Fresh;
    };

    let today = now.date();
    if today >= expiration {
        return StatusKind::Expired;
    }

    let shelf_life = i64::from(months_between(production, expiration));
    let elapsed = i64::from(months_between(production, today));
    // elapsed >= shelf_life / 3 without the float division
    if elapsed * 3 >= shelf_life {
        StatusKind::NearExpiry
    } else {
        StatusKind::Fresh
    }
}

fn whole_months_forward(earlier: Date, later: Date) -> i32 {
    let calendar_months = (later.year() - earlier.year()) * 12
        + (i32::from(u8::from(later.month())) - i32::from(u8::from(earlier.month())));
    let boundary_day =
        earlier.day().min(time::util::days_in_year_month(later.year(), later.month()));
    if later.day() < boundary_day {
        calendar_months - 1
    } else {
        calendar_months
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn total_units_multiplies_and_defaults_to_zero() {
        assert_eq!(total_units(Some(4), Some(12)), 48);
        assert_eq!(total_units(Some(0), Some(5)), 0);
        assert_eq!(total_units(None, Some(5)), 0);
        assert_eq!(total_units(Some(u32::MAX), Some(2)), u64::from(u32::MAX) * 2);
    }

    #[test]
    fn total_units_from_text_ignores_non_numeric_input() {
        assert_eq!(total_units_from_text("4", " 12 "), 48);
        assert_eq!(total_units_from_text("", "12"), 0);
        assert_eq!(total_units_from_text("four", "12"), 0);
        assert_eq!(total_units_from_text("-4", "12"), 0);
    }

    #[test]
    fn shelf_life_counts_whole_months() {
        assert_eq!(shelf_life_months(Some(date!(2024 - 01 - 15)), Some(date!(2024 - 07 - 15))), 6);
        assert_eq!(shelf_life_months(Some(date!(2024 - 01 - 15)), Some(date!(2024 - 07 - 14))), 5);
        assert_eq!(shelf_life_months(Some(date!(2024 - 01 - 15)), None), 0);
        assert_eq!(shelf_life_months(None, None), 0);
    }

    #[test]
    fn months_between_is_signed_and_truncates_toward_zero() {
        assert_eq!(months_between(date!(2024 - 07 - 15), date!(2024 - 01 - 15)), -6);
        assert_eq!(months_between(date!(2024 - 07 - 14), date!(2024 - 01 - 15)), -5);
        assert_eq!(months_between(date!(2023 - 11 - 20), date!(2025 - 02 - 20)), 15);
        assert_eq!(months_between(date!(2024 - 03 - 10), date!(2024 - 03 - 31)), 0);
    }

    #[test]
    fn months_between_clamps_to_short_month_end() {
        assert_eq!(months_between(date!(2024 - 01 - 31), date!(2024 - 02 - 29)), 1);
        assert_eq!(months_between(date!(2024 - 01 - 31), date!(2024 - 02 - 28)), 0);
        assert_eq!(months_between(date!(2023 - 01 - 31), date!(2023 - 02 - 28)), 1);
        assert_eq!(months_between(date!(2024 - 03 - 31), date!(2024 - 04 - 30)), 1);
    }

    #[test]
    fn status_boundary_at_one_third_is_inclusive() {
        let production = Some(date!(2024 - 01 - 01));
        let expiration = Some(date!(2024 - 07 - 01));

        assert_eq!(
            compute_status(production, expiration, datetime!(2024-03-01 00:00 UTC)),
            StatusKind::NearExpiry
        );
        assert_eq!(
            compute_status(production, expiration, datetime!(2024-02-29 23:59 UTC)),
            StatusKind::Fresh
        );
        assert_eq!(
            compute_status(production, expiration, datetime!(2024-07-02 08:00 UTC)),
            StatusKind::Expired
        );
    }

    #[test]
    fn status_is_expired_on_the_expiration_day() {
        assert_eq!(
            compute_status(
                Some(date!(2024 - 01 - 01)),
                Some(date!(2024 - 07 - 01)),
                datetime!(2024-07-01 00:00 UTC)
            ),
            StatusKind::Expired
        );
    }

    #[test]
    fn status_defaults_to_fresh_without_dates() {
        let now = datetime!(2024-03-01 00:00 UTC);
        assert_eq!(compute_status(None, Some(date!(2024 - 07 - 01)), now), StatusKind::Fresh);
        assert_eq!(compute_status(Some(date!(2024 - 01 - 01)), None, now), StatusKind::Fresh);
    }

    #[test]
    fn zero_shelf_life_is_never_fresh() {
        // Expires in under a month: shelf life 0, so one third is 0.
        assert_eq!(
            compute_status(
                Some(date!(2024 - 01 - 01)),
                Some(date!(2024 - 01 - 20)),
                datetime!(2024-01-01 12:00 UTC)
            ),
            StatusKind::NearExpiry
        );
    }

    #[test]
    fn inverted_dates_are_expired_not_fresh() {
        assert_eq!(
            compute_status(
                Some(date!(2024 - 06 - 01)),
                Some(date!(2024 - 01 - 01)),
                datetime!(2024-06-01 00:00 UTC)
            ),
            StatusKind::Expired
        );
    }
}
