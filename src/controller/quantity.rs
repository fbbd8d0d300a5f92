//! Kubernetes resource quantity parsing ("5Gi", "500m", "1e3")

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

const QUANTITY_PATTERN: &str = r"^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$";

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 10] = ["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

static QUANTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(QUANTITY_PATTERN).expect("quantity pattern is a valid regex"));

fn quantity_error(value: &str) -> Error {
    Error::QuantityError {
        value: value.to_string(),
        pattern: QUANTITY_PATTERN,
    }
}

fn valid_number(number: &str) -> bool {
    let digits = number.trim_start_matches(['+', '-']);
    digits.matches('.').count() <= 1 && digits.chars().any(|c| c.is_ascii_digit())
}

fn valid_suffix(suffix: &str) -> bool {
    if BINARY_SUFFIXES.contains(&suffix) || DECIMAL_SUFFIXES.contains(&suffix) {
        return true;
    }
    let Some(exponent) = suffix.strip_prefix(['e', 'E']) else {
        return false;
    };
    let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    !exponent.is_empty() && exponent.chars().all(|c| c.is_ascii_digit())
}

/// Parse a quantity string, rejecting anything the API server would reject.
pub fn parse_quantity(value: &str) -> Result<Quantity> {
    let captures = QUANTITY_RE
        .captures(value)
        .ok_or_else(|| quantity_error(value))?;

    let number = captures.get(1).map_or("", |m| m.as_str());
    let suffix = captures.get(2).map_or("", |m| m.as_str());
    if !valid_number(number) || !valid_suffix(suffix) {
        return Err(quantity_error(value));
    }

    Ok(Quantity(value.to_string()))
}
