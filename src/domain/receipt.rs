use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shortest receipt code accepted from a customer.
pub const MIN_CLAIM_LEN: usize = 8;
/// Longest receipt code accepted from a customer.
pub const MAX_CLAIM_LEN: usize = 12;

/// The gateway's identifier for a completed payment, upper-cased.
///
/// This is the global deduplication key of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptCode(String);

impl ReceiptCode {
    /// Accepts a receipt reported by the gateway itself. Only emptiness is
    /// rejected; the gateway is trusted on format.
    pub fn new(raw: &str) -> Result<Self, PaymentError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(PaymentError::InvalidReceiptFormat(raw.to_string()));
        }
        Ok(Self(code))
    }

    /// Validates a receipt typed in by a customer for manual verification.
    pub fn parse_claim(raw: &str) -> Result<Self, PaymentError> {
        let code = raw.trim().to_ascii_uppercase();
        let len = code.chars().count();
        if !(MIN_CLAIM_LEN..=MAX_CLAIM_LEN).contains(&len)
            || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(PaymentError::InvalidReceiptFormat(raw.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ReceiptCode {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ReceiptCode> for String {
    fn from(code: ReceiptCode) -> Self {
        code.0
    }
}

impl fmt::Display for ReceiptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_length_bounds_are_inclusive() {
        assert!(ReceiptCode::parse_claim("ABCD123").is_err());
        assert!(ReceiptCode::parse_claim("ABCD1234").is_ok());
        assert!(ReceiptCode::parse_claim("ABCD12345678").is_ok());
        assert!(ReceiptCode::parse_claim("ABCD123456789").is_err());
    }

    #[test]
    fn test_claim_is_case_normalized_and_trimmed() {
        let code = ReceiptCode::parse_claim("  sh12xy34za ").unwrap();
        assert_eq!(code.as_str(), "SH12XY34ZA");
    }

    #[test]
    fn test_claim_rejects_symbols() {
        assert!(matches!(
            ReceiptCode::parse_claim("SH12-XY34"),
            Err(PaymentError::InvalidReceiptFormat(_))
        ));
    }

    #[test]
    fn test_gateway_receipt_only_rejects_empty() {
        assert!(ReceiptCode::new("   ").is_err());
        assert_eq!(ReceiptCode::new("qab1cd2efg").unwrap().as_str(), "QAB1CD2EFG");
    }
}
