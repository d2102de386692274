use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// International dialling code prepended to national numbers.
pub const COUNTRY_CODE: &str = "254";

/// Length of a full subscriber number including the country code.
const MSISDN_LEN: usize = 12;

/// A subscriber phone number in the gateway's international format
/// (`254XXXXXXXXX`, digits only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Msisdn(String);

impl Msisdn {
    /// Normalizes a user-entered number.
    ///
    /// A leading national `0` is replaced by the country code, `+254...` and
    /// `254...` pass through, and a bare 9-digit subscriber number gets the
    /// country code prepended. Spaces and dashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        let digits = compact.strip_prefix('+').unwrap_or(&compact);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PaymentError::InvalidPhone(raw.to_string()));
        }

        let normalized = if let Some(national) = digits.strip_prefix('0') {
            format!("{COUNTRY_CODE}{national}")
        } else if digits.starts_with(COUNTRY_CODE) {
            digits.to_string()
        } else {
            format!("{COUNTRY_CODE}{digits}")
        };

        if normalized.len() != MSISDN_LEN {
            return Err(PaymentError::InvalidPhone(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Msisdn {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Msisdn> for String {
    fn from(msisdn: Msisdn) -> Self {
        msisdn.0
    }
}

impl fmt::Display for Msisdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_forms_normalize_identically() {
        let expected = "254712345678";
        for raw in ["0712345678", "254712345678", "+254712345678"] {
            assert_eq!(Msisdn::parse(raw).unwrap().as_str(), expected, "{raw}");
        }
    }

    #[test]
    fn test_bare_subscriber_number_gets_country_code() {
        assert_eq!(Msisdn::parse("712345678").unwrap().as_str(), "254712345678");
        assert_eq!(
            Msisdn::parse("0712 345-678").unwrap().as_str(),
            "254712345678"
        );
    }

    #[test]
    fn test_rejects_garbage() {
        for raw in ["", "+", "07123abc78", "07123", "2547123456789"] {
            assert!(
                matches!(Msisdn::parse(raw), Err(PaymentError::InvalidPhone(_))),
                "{raw}"
            );
        }
    }
}
