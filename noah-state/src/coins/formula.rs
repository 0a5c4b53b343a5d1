// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Bonding curve pricing.
//!
//! A coin with a constant reserve ratio `crr` (percent) follows
//! `reserve = k * volume^(100 / crr)`. The fractional powers are evaluated exactly: the ratio
//! `crr / 100` is reduced to `p / q` and each result is the integer `q`-th root of a rational,
//! floored or ceiled so that rounding always favours the reserve.

use noah_models::Amount;
use num::integer::{gcd, Roots};
use num::{BigUint, One, Zero};

/// `crr / 100` as a reduced fraction
fn crr_fraction(crr: u32) -> (u32, u32) {
    let divisor = gcd(crr, 100);
    (crr / divisor, 100 / divisor)
}

/// `floor(root_q(numerator / denominator))`
fn floor_root(numerator: &BigUint, denominator: &BigUint, q: u32) -> BigUint {
    (numerator / denominator).nth_root(q)
}

/// `ceil(root_q(numerator / denominator))`
fn ceil_root(numerator: &BigUint, denominator: &BigUint, q: u32) -> BigUint {
    let root = floor_root(numerator, denominator, q);
    if &(root.pow(q) * denominator) == numerator {
        root
    } else {
        root + BigUint::one()
    }
}

fn ceil_div(numerator: &BigUint, denominator: &BigUint) -> BigUint {
    (numerator + denominator - BigUint::one()) / denominator
}

/// Coins received when `deposit` base coin is added to the reserve
/// ```
/// # use noah_models::Amount;
/// # use noah_state::formula::calculate_purchase_return;
/// let received = calculate_purchase_return(
///     &Amount::from_u64(1000),
///     &Amount::from_u64(1000),
///     100,
///     &Amount::from_u64(100),
/// );
/// assert_eq!(received, Amount::from_u64(100));
/// ```
pub fn calculate_purchase_return(
    supply: &Amount,
    reserve: &Amount,
    crr: u32,
    deposit: &Amount,
) -> Amount {
    if deposit.is_zero() || reserve.is_zero() {
        return Amount::zero();
    }
    let (supply, reserve, deposit) = (supply.as_biguint(), reserve.as_biguint(), deposit.as_biguint());
    if crr == 100 {
        return Amount::from_raw(supply * deposit / reserve);
    }
    // supply * ((reserve + deposit) / reserve)^(p / q)
    let (p, q) = crr_fraction(crr);
    let numerator = supply.pow(q) * (reserve + deposit).pow(p);
    let denominator = reserve.pow(p);
    let result = floor_root(&numerator, &denominator, q);
    Amount::from_raw(result - supply)
}

/// Base coin that must be added to the reserve to receive exactly `want_receive` coins
pub fn calculate_purchase_amount(
    supply: &Amount,
    reserve: &Amount,
    crr: u32,
    want_receive: &Amount,
) -> Amount {
    if want_receive.is_zero() || supply.is_zero() {
        return Amount::zero();
    }
    let (supply, reserve, want) = (supply.as_biguint(), reserve.as_biguint(), want_receive.as_biguint());
    if crr == 100 {
        return Amount::from_raw(ceil_div(&(reserve * want), supply));
    }
    // reserve * ((supply + want) / supply)^(q / p)
    let (p, q) = crr_fraction(crr);
    let numerator = reserve.pow(p) * (supply + want).pow(q);
    let denominator = supply.pow(q);
    let result = ceil_root(&numerator, &denominator, p);
    Amount::from_raw(result - reserve)
}

/// Base coin returned when `sell_amount` coins are burnt
/// ```
/// # use noah_models::Amount;
/// # use noah_state::formula::calculate_sale_return;
/// let supply = Amount::from_u64(1000);
/// let reserve = Amount::from_u64(500);
/// assert_eq!(calculate_sale_return(&supply, &reserve, 40, &supply), reserve);
/// ```
pub fn calculate_sale_return(
    supply: &Amount,
    reserve: &Amount,
    crr: u32,
    sell_amount: &Amount,
) -> Amount {
    if sell_amount >= supply {
        return reserve.clone();
    }
    if sell_amount.is_zero() {
        return Amount::zero();
    }
    let (supply, reserve, sell) = (supply.as_biguint(), reserve.as_biguint(), sell_amount.as_biguint());
    if crr == 100 {
        return Amount::from_raw(reserve * sell / supply);
    }
    // reserve * (1 - ((supply - sell) / supply)^(q / p))
    let (p, q) = crr_fraction(crr);
    let numerator = reserve.pow(p) * (supply - sell).pow(q);
    let denominator = supply.pow(q);
    let kept = ceil_root(&numerator, &denominator, p);
    if &kept >= reserve {
        return Amount::zero();
    }
    Amount::from_raw(reserve - kept)
}

/// Coins to burn to receive exactly `want_receive` base coin, `None` if the reserve is too small
pub fn calculate_sale_amount(
    supply: &Amount,
    reserve: &Amount,
    crr: u32,
    want_receive: &Amount,
) -> Option<Amount> {
    if want_receive > reserve {
        return None;
    }
    if want_receive == reserve {
        return Some(supply.clone());
    }
    if want_receive.is_zero() {
        return Some(Amount::zero());
    }
    let (supply, reserve, want) = (supply.as_biguint(), reserve.as_biguint(), want_receive.as_biguint());
    if crr == 100 {
        return Some(Amount::from_raw(ceil_div(&(supply * want), reserve)));
    }
    // supply * (1 - ((reserve - want) / reserve)^(p / q))
    let (p, q) = crr_fraction(crr);
    let numerator = supply.pow(q) * (reserve - want).pow(p);
    let denominator = reserve.pow(p);
    let kept = floor_root(&numerator, &denominator, q);
    if kept.is_zero() {
        return Some(Amount::from_raw(supply.clone()));
    }
    Some(Amount::from_raw(supply - kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::ToPrimitive;

    fn noah(value: u64) -> Amount {
        Amount::from_noah(value)
    }

    fn to_f64(amount: &Amount) -> f64 {
        amount.as_biguint().to_f64().unwrap()
    }

    fn assert_close(actual: &Amount, expected: f64) {
        let actual = to_f64(actual);
        let tolerance = expected.abs() * 1e-9 + 1.0;
        assert!(
            (actual - expected).abs() <= tolerance,
            "got {} expected {}",
            actual,
            expected
        );
    }

    #[test]
    fn test_purchase_return_matches_float() {
        let (supply, reserve, deposit) = (noah(1_000_000), noah(500_000), noah(1_000));
        for crr in [10u32, 33, 40, 50, 80, 99] {
            let expected = to_f64(&supply)
                * ((1.0 + to_f64(&deposit) / to_f64(&reserve)).powf(crr as f64 / 100.0) - 1.0);
            assert_close(
                &calculate_purchase_return(&supply, &reserve, crr, &deposit),
                expected,
            );
        }
    }

    #[test]
    fn test_sale_return_matches_float() {
        let (supply, reserve, sell) = (noah(1_000_000), noah(500_000), noah(1_000));
        for crr in [10u32, 25, 50, 75, 100] {
            let expected = to_f64(&reserve)
                * (1.0 - (1.0 - to_f64(&sell) / to_f64(&supply)).powf(100.0 / crr as f64));
            assert_close(&calculate_sale_return(&supply, &reserve, crr, &sell), expected);
        }
    }

    #[test]
    fn test_exact_amounts_are_inverses() {
        let (supply, reserve) = (noah(1_000_000), noah(500_000));
        for crr in [10u32, 50, 100] {
            let want = noah(123);
            let to_sell = calculate_sale_amount(&supply, &reserve, crr, &want).unwrap();
            assert!(calculate_sale_return(&supply, &reserve, crr, &to_sell) >= want);

            let to_pay = calculate_purchase_amount(&supply, &reserve, crr, &want);
            assert!(calculate_purchase_return(&supply, &reserve, crr, &to_pay) >= want);
        }
    }

    #[test]
    fn test_buy_then_sell_never_creates_value() {
        let (supply, reserve) = (noah(1_000_000), noah(500_000));
        for crr in [10u32, 37, 50, 100] {
            let deposit = noah(7_777);
            let received = calculate_purchase_return(&supply, &reserve, crr, &deposit);
            let new_supply = &supply + &received;
            let new_reserve = &reserve + &deposit;
            let returned = calculate_sale_return(&new_supply, &new_reserve, crr, &received);
            assert!(returned <= deposit, "crr {}", crr);
        }
    }

    #[test]
    fn test_edges() {
        let (supply, reserve) = (noah(1000), noah(10));
        assert_eq!(
            calculate_sale_return(&supply, &reserve, 10, &supply),
            reserve
        );
        assert!(calculate_sale_return(&supply, &reserve, 10, &Amount::zero()).is_zero());
        assert!(calculate_purchase_return(&supply, &reserve, 10, &Amount::zero()).is_zero());
        assert_eq!(calculate_sale_amount(&supply, &reserve, 10, &noah(11)), None);
        assert_eq!(
            calculate_sale_amount(&supply, &reserve, 10, &reserve),
            Some(supply)
        );
    }
}
