//! Compound duration literals: `300ms`, `1.5h`, `1h2m3s`.
//!
//! Grammar: an optional sign, then one or more `<number><unit>` pairs where
//! the number may carry a fraction and the unit is one of `ns`, `us`
//! (`µs`, `μs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted. Negative
//! non-zero durations are rejected because the destination is
//! `std::time::Duration`.

use std::time::Duration;

use serde_json::{Value, json};

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 60 * 60 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a duration literal.
pub fn parse(literal: &str) -> Result<Duration, String> {
    let (negative, mut rest) = match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, literal),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(format!("invalid duration {literal:?}"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_number) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid duration {literal:?}"));
        }

        let unit_len = after_number
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map_or(after_number.len(), |(i, _)| i);
        let (unit, tail) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(format!("missing unit in duration {literal:?}"));
        }
        let scale = unit_nanos(unit)
            .ok_or_else(|| format!("unknown unit {unit:?} in duration {literal:?}"))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| format!("invalid duration {literal:?}"))?
        };
        let mut component = whole
            .checked_mul(scale)
            .ok_or_else(|| format!("duration {literal:?} overflows"))?;

        // Digits beyond nanosecond precision cannot contribute.
        let frac_digits = &frac_part[..frac_part.len().min(18)];
        if !frac_digits.is_empty() {
            let numerator: u128 = frac_digits
                .parse()
                .map_err(|_| format!("invalid duration {literal:?}"))?;
            let denominator = 10u128.pow(frac_digits.len() as u32);
            component += numerator * scale / denominator;
        }

        total = total
            .checked_add(component)
            .ok_or_else(|| format!("duration {literal:?} overflows"))?;
        rest = tail;
    }

    if negative && total != 0 {
        return Err(format!("negative duration {literal:?} is not supported"));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| format!("duration {literal:?} overflows"))?;
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}

/// The serde representation of `std::time::Duration`.
pub fn to_value(d: Duration) -> Value {
    json!({ "secs": d.as_secs(), "nanos": d.subsec_nanos() })
}
