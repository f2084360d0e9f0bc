use anyhow::{anyhow, Context, Result};

/// Decodes a `0x`-prefixed JSON-RPC hex quantity.
pub fn parse_hex_quantity(data: &str) -> Result<u128> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    if digits.is_empty() {
        return Err(anyhow!("Empty hex quantity"));
    }
    u128::from_str_radix(digits, 16).context("Failed to decode hex quantity")
}

/// Renders an amount of the smallest unit as a decimal string in whole units.
///
/// Trailing fractional zeros are dropped, so `32500000000000000000` with 18
/// decimals renders as `32.5` and `10^18` as `1`.
pub fn format_units(amount: u128, decimals: u32) -> String {
    let Some(base) = 10u128.checked_pow(decimals) else {
        return format!("0.{:0>width$}", amount, width = decimals as usize)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string();
    };

    let whole = amount / base;
    let frac = amount % base;
    if frac == 0 {
        return whole.to_string();
    }

    let frac = format!("{:0>width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
