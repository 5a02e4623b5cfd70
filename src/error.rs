use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse classification of a [`LedgerError`], for callers that map failures onto
/// their own transport (status codes, exit codes, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unsupported,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("account currency mismatch: {symbol} != {expected}")]
    CurrencyMismatch { symbol: String, expected: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Account deleted: {0}")]
    Conflict(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: i64,
        balance: Decimal,
        requested: Decimal,
    },
    /// Store or runtime failure. The detail is kept as the source for logging and is
    /// never part of the displayed message.
    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(Box::new(std::io::Error::other(message.into())))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) | LedgerError::CurrencyMismatch { .. } => {
                ErrorKind::Validation
            }
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::Conflict(_) | LedgerError::InsufficientFunds { .. } => {
                ErrorKind::Conflict
            }
            LedgerError::Unsupported(_) => ErrorKind::Unsupported,
            LedgerError::Internal(_) | LedgerError::Csv(_) | LedgerError::Io(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

#[cfg(feature = "storage-postgres")]
impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Internal(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_hides_detail() {
        let err = LedgerError::internal("connection reset by peer on 10.0.0.5");
        assert_eq!(err.to_string(), "internal error");
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("connection reset"));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn test_mismatch_is_validation() {
        let err = LedgerError::CurrencyMismatch {
            symbol: "KRWUSD".to_string(),
            expected: "USDKRW".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "account currency mismatch: KRWUSD != USDKRW");
    }
}
