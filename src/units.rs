use crate::error::UnitError;
use crate::ledger::{Amount, NATIVE_DECIMALS};

pub fn pow10(exp: u32) -> Amount {
    Amount::exp10(exp as usize)
}

pub fn parse_ether(input: &str) -> Result<Amount, UnitError> {
    let text = input.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(UnitError::Malformed(input.to_string()));
    }
    if fraction.len() > NATIVE_DECIMALS as usize {
        return Err(UnitError::TooPrecise(input.to_string()));
    }
    let overflow = || UnitError::Overflow(input.to_string());
    let whole = if whole.is_empty() {
        Amount::zero()
    } else {
        Amount::from_dec_str(whole).map_err(|_| overflow())?
    };
    let fraction_value = if fraction.is_empty() {
        Amount::zero()
    } else {
        Amount::from_dec_str(fraction).map_err(|_| overflow())?
            * pow10(NATIVE_DECIMALS - fraction.len() as u32)
    };
    whole
        .checked_mul(pow10(NATIVE_DECIMALS))
        .and_then(|scaled| scaled.checked_add(fraction_value))
        .ok_or_else(overflow)
}

pub fn format_ether(amount: Amount) -> String {
    let unit = pow10(NATIVE_DECIMALS);
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>18}", fraction.to_string());
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
