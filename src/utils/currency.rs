/// Currency helpers for XAF amounts.
///
/// XAF has no minor unit in circulation, so every amount in the store is a
/// whole number of francs held in an `i64`. Percentages are decimals and are
/// only ever multiplied against integers here, never carried as floats.
use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::{ToPrimitive, Zero};

/// Commission for `amount_xaf` at `percent` (e.g. `10` or `7.5`), rounded half
/// up to the nearest franc.
pub fn commission_for(amount_xaf: i64, percent: &BigDecimal) -> Option<i64> {
    if amount_xaf < 0 || percent < &BigDecimal::zero() {
        return None;
    }

    let raw = BigDecimal::from(amount_xaf) * percent / BigDecimal::from(100);
    raw.with_scale_round(0, RoundingMode::HalfUp).to_i64()
}

/// Reduce a commission so that the period total never exceeds `monthly_cap`.
/// `already_charged` is what the provider has been charged so far this period.
pub fn apply_monthly_cap(raw_commission: i64, monthly_cap: Option<i64>, already_charged: i64) -> i64 {
    match monthly_cap {
        None => raw_commission,
        Some(cap) => {
            let headroom = (cap - already_charged).max(0);
            raw_commission.min(headroom)
        }
    }
}

/// Split a gross amount into (commission, net). The same rounded commission
/// is used for both halves so they always sum to the gross amount.
pub fn split_gross(amount_xaf: i64, commission_xaf: i64) -> (i64, i64) {
    let commission = commission_xaf.clamp(0, amount_xaf.max(0));
    (commission, amount_xaf - commission)
}

/// Format francs for messages, e.g. `90 000 FCFA`.
pub fn format_xaf(amount_xaf: i64) -> String {
    let digits = amount_xaf.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if amount_xaf < 0 {
        format!("-{} FCFA", grouped)
    } else {
        format!("{} FCFA", grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pct(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_commission_for_whole_percent() {
        assert_eq!(commission_for(100_000, &pct("10")), Some(10_000));
        assert_eq!(commission_for(0, &pct("10")), Some(0));
    }

    #[test]
    fn test_commission_rounds_half_up() {
        // 7.5% of 1_002 = 75.15 -> 75
        assert_eq!(commission_for(1_002, &pct("7.5")), Some(75));
        // 7.5% of 1_010 = 75.75 -> 76
        assert_eq!(commission_for(1_010, &pct("7.5")), Some(76));
        // 2.5% of 1_020 = 25.5 -> 26
        assert_eq!(commission_for(1_020, &pct("2.5")), Some(26));
    }

    #[test]
    fn test_commission_rejects_negative_inputs() {
        assert_eq!(commission_for(-1, &pct("10")), None);
        assert_eq!(commission_for(100, &pct("-1")), None);
    }

    #[test]
    fn test_monthly_cap() {
        assert_eq!(apply_monthly_cap(10_000, None, 1_000_000), 10_000);
        assert_eq!(apply_monthly_cap(10_000, Some(50_000), 0), 10_000);
        assert_eq!(apply_monthly_cap(10_000, Some(50_000), 45_000), 5_000);
        assert_eq!(apply_monthly_cap(10_000, Some(50_000), 50_000), 0);
        assert_eq!(apply_monthly_cap(10_000, Some(50_000), 60_000), 0);
    }

    #[test]
    fn test_split_gross_always_sums_to_amount() {
        for (amount, percent) in [(100_000, "10"), (1_010, "7.5"), (999_999, "3.33"), (1, "50")] {
            let commission = commission_for(amount, &pct(percent)).unwrap();
            let (commission, net) = split_gross(amount, commission);
            assert_eq!(commission + net, amount);
        }
    }

    #[test]
    fn test_format_xaf() {
        assert_eq!(format_xaf(90_000), "90 000 FCFA");
        assert_eq!(format_xaf(1_234_567), "1 234 567 FCFA");
        assert_eq!(format_xaf(500), "500 FCFA");
        assert_eq!(format_xaf(-2_500), "-2 500 FCFA");
    }
}
