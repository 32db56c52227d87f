//! Tax id (CUIT/CUIL) checksum, formatting and amount consistency checks.

use crate::utils::error::{InvoicingError, Result};

const CHECKSUM_WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];
const SEPARATORS: [char; 4] = ['-', ' ', '.', '/'];

/// Largest gap between the sum of the parts and the total, in cents.
pub const AMOUNT_TOLERANCE_CENTS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonKind {
    NaturalPerson,
    LegalEntity,
    Unknown,
}

/// Prefix used when deriving a tax id from a personal document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonType {
    Male,
    Female,
    Other,
    Company,
}

impl PersonType {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Male => "20",
            Self::Female => "27",
            Self::Other => "23",
            Self::Company => "30",
        }
    }
}

/// Check digit over the first ten digits; 11 maps to 0 and 10 maps to 9.
pub fn checksum_digit(first_ten: &[u8]) -> Option<u8> {
    if first_ten.len() != 10 || first_ten.iter().any(|d| *d > 9) {
        return None;
    }
    let sum: u32 = first_ten
        .iter()
        .zip(CHECKSUM_WEIGHTS)
        .map(|(digit, weight)| u32::from(*digit) * weight)
        .sum();
    let expected = match 11 - (sum % 11) {
        11 => 0,
        10 => 9,
        other => other,
    };
    Some(expected as u8)
}

fn digits_of(value: &str) -> Option<Vec<u8>> {
    let stripped: String = value.chars().filter(|c| !SEPARATORS.contains(c)).collect();
    if stripped.len() != 11 || !stripped.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(stripped.bytes().map(|b| b - b'0').collect())
}

pub fn validate_tax_id(value: &str) -> bool {
    match digits_of(value) {
        Some(digits) => checksum_digit(&digits[..10]) == Some(digits[10]),
        None => false,
    }
}

/// Digits only.
pub fn clean_tax_id(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Canonical `PP-DDDDDDDD-C`; values without exactly 11 digits come back cleaned.
pub fn format_tax_id(value: &str) -> String {
    let digits = clean_tax_id(value);
    if digits.len() != 11 {
        return digits;
    }
    format!("{}-{}-{}", &digits[..2], &digits[2..10], &digits[10..])
}

pub fn classify_tax_id(value: &str) -> PersonKind {
    let digits = clean_tax_id(value);
    match digits.get(..2) {
        Some("20" | "23" | "24" | "27") => PersonKind::NaturalPerson,
        Some("30" | "33" | "34") => PersonKind::LegalEntity,
        _ => PersonKind::Unknown,
    }
}

/// Parses a tax id that must pass the checksum into its numeric form.
pub fn parse_tax_id(field: &str, value: &str) -> Result<u64> {
    if !validate_tax_id(value) {
        return Err(InvoicingError::validation(
            field,
            format!("'{}' is not a valid CUIT/CUIL", value),
        ));
    }
    clean_tax_id(value)
        .parse()
        .map_err(|_| InvoicingError::validation(field, format!("'{}' is not numeric", value)))
}

/// Builds the tax id for a personal document number (inverse of `validate_tax_id`).
pub fn generate_from_id(personal_id: &str, person_type: PersonType) -> Result<String> {
    let trimmed = clean_tax_id(personal_id);
    if trimmed.is_empty() || trimmed.len() > 8 || trimmed.len() != personal_id.trim().len() {
        return Err(InvoicingError::validation(
            "personal_id",
            format!("'{}' must be 1 to 8 digits", personal_id),
        ));
    }

    let body = format!("{}{:0>8}", person_type.prefix(), trimmed);
    let digits: Vec<u8> = body.bytes().map(|b| b - b'0').collect();
    let check = checksum_digit(&digits).ok_or_else(|| {
        InvoicingError::validation("personal_id", format!("cannot derive checksum for '{}'", body))
    })?;
    Ok(format!("{}{}", body, check))
}

/// `|net + tax + exempt + untaxed - total| <= 1` cent. Amounts whose sum
/// overflows never validate.
pub fn validate_amounts(net: i64, tax: i64, exempt: i64, untaxed: i64, total: i64) -> bool {
    sum_cents([net, tax, exempt, untaxed])
        .map(|sum| within_tolerance(sum, total))
        .unwrap_or(false)
}

/// Checked sum of cent amounts; `None` on overflow.
pub fn sum_cents(amounts: impl IntoIterator<Item = i64>) -> Option<i64> {
    amounts
        .into_iter()
        .try_fold(0i64, |acc, value| acc.checked_add(value))
}

pub fn within_tolerance(a: i64, b: i64) -> bool {
    a.abs_diff(b) <= AMOUNT_TOLERANCE_CENTS.unsigned_abs()
}

pub fn format_invoice_number(sale_point: u32, number: u64) -> String {
    format!("{:05}-{:08}", sale_point, number)
}

pub fn parse_invoice_number(value: &str) -> Result<(u32, u64)> {
    let invalid = || {
        InvoicingError::validation(
            "invoice_number",
            format!("'{}' is not in PPPPP-NNNNNNNN form", value),
        )
    };
    let (point, number) = value.trim().split_once('-').ok_or_else(invalid)?;
    if point.len() != 5 || number.len() != 8 {
        return Err(invalid());
    }
    let point: u32 = point.parse().map_err(|_| invalid())?;
    let number: u64 = number.parse().map_err(|_| invalid())?;
    if point == 0 || number == 0 {
        return Err(invalid());
    }
    Ok((point, number))
}
