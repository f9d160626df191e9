//! Display strings for the wallet panel.

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use num_format::{Locale, ToFormattedString};

use crate::domain::Derived;
use crate::session::SessionSnapshot;
use crate::state_machine::ConnectionState;

pub const PLACEHOLDER: &str = "...";
pub const ERROR_LABEL: &str = "Error";
pub const BALANCE_SIGNIFICANT_DIGITS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLight {
    Active,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletView {
    pub status: StatusLight,
    pub chain_id: String,
    pub block_number: String,
    pub account: String,
    pub balance: String,
    pub error: Option<String>,
    /// A user-visible connection attempt is open.
    pub prompting: bool,
    pub can_connect: bool,
    pub can_deactivate: bool,
}

impl WalletView {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let connection = &snapshot.connection;
        let status = match connection {
            ConnectionState::Connected { .. } => StatusLight::Active,
            ConnectionState::Error { .. } => StatusLight::Failed,
            _ => StatusLight::Pending,
        };
        Self {
            status,
            chain_id: connection
                .chain_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_owned()),
            block_number: render_derived(&snapshot.block_number, |n| group_thousands(*n)),
            account: connection
                .account()
                .map(|account| truncate_address(&account))
                .unwrap_or_else(|| PLACEHOLDER.to_owned()),
            balance: render_derived(&snapshot.balance, |wei| {
                format!("Ξ{}", format_ether(*wei, BALANCE_SIGNIFICANT_DIGITS))
            }),
            error: connection.error().map(|cause| cause.to_string()),
            prompting: connection.is_prompting(),
            can_connect: !connection.is_connecting() && !connection.is_connected(),
            can_deactivate: connection.is_connected() || connection.error().is_some(),
        }
    }
}

fn render_derived<T>(value: &Derived<T>, render: impl FnOnce(&T) -> String) -> String {
    match value {
        Derived::Unknown => PLACEHOLDER.to_owned(),
        Derived::Ready(inner) => render(inner),
        Derived::Failed(_) => ERROR_LABEL.to_owned(),
    }
}

/// `0xAbCdEf...1234` from the checksummed form.
pub fn truncate_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

pub fn group_thousands(value: u64) -> String {
    value.to_formatted_string(&Locale::en)
}

/// Wei rendered in ether with `significant` digits.
pub fn format_ether(wei: U256, significant: usize) -> String {
    let ether = format_units(wei, "ether").unwrap_or_else(|_| wei.to_string());
    match ether.parse::<f64>() {
        Ok(value) => to_precision(value, significant),
        Err(_) => ether,
    }
}

/// Digits after the point needed to print any `f64` exactly.
const EXACT_F64_DIGITS: usize = 767;

/// `Number.prototype.toPrecision`: round half up on the exact value, then
/// fixed notation unless the exponent is below -6 or at least `precision`.
pub fn to_precision(value: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return format!("{:.*}", precision - 1, 0.0);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    let exact = format!("{:.*e}", EXACT_F64_DIGITS, value.abs());
    let Some((mantissa, exponent)) = exact.split_once('e') else {
        return exact;
    };
    let Ok(mut exponent) = exponent.parse::<i32>() else {
        return exact;
    };

    let all: Vec<u8> = mantissa.bytes().filter(u8::is_ascii_digit).collect();
    let mut digits = all[..precision.min(all.len())].to_vec();
    digits.resize(precision, b'0');
    if all.get(precision).is_some_and(|next| *next >= b'5') && round_up(&mut digits) {
        exponent += 1;
    }
    let digits = String::from_utf8_lossy(&digits).into_owned();

    let body = if exponent < -6 || exponent >= precision as i32 {
        let (lead, rest) = digits.split_at(1);
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        let point = if rest.is_empty() { "" } else { "." };
        format!("{lead}{point}{rest}e{exp_sign}{}", exponent.abs())
    } else if exponent < 0 {
        format!("0.{}{digits}", "0".repeat((-exponent - 1) as usize))
    } else {
        let (int, frac) = digits.split_at(exponent as usize + 1);
        if frac.is_empty() {
            int.to_owned()
        } else {
            format!("{int}.{frac}")
        }
    };
    format!("{sign}{body}")
}

/// Add one ulp to a decimal digit string. Returns true when it carried
/// out of the top digit (`999` -> `100`, one order of magnitude up).
fn round_up(digits: &mut [u8]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return false;
        }
    }
    if let Some(first) = digits.first_mut() {
        *first = b'1';
    }
    true
}
