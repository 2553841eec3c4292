use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where PesaPal says a transaction stands.
///
/// PesaPal is the only source of truth; nothing here is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    /// Anything else PesaPal reports, kept verbatim for logging.
    Unknown(String),
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Unknown(s) => s,
        }
    }

    /// Case-insensitive. PesaPal reports a reversed payment as terminal failure.
    pub fn from_provider(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "COMPLETED" => Self::Completed,
            "FAILED" | "REVERSED" => Self::Failed,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// COMPLETED and FAILED end polling; everything else keeps it going.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One answer from `GetTransactionStatus`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: TransactionStatus,
    /// The full provider payload, passed through to browsers untouched.
    pub raw: Value,
}

impl StatusReport {
    /// Reads the status out of a provider payload.
    ///
    /// Live PesaPal puts the human status in `payment_status_description` and
    /// an HTTP-like code in `status`; some deployments only send `status`.
    pub fn from_payload(raw: Value) -> Self {
        let description = raw
            .get("payment_status_description")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty());
        let status = description
            .or_else(|| raw.get("status").and_then(Value::as_str))
            .map(TransactionStatus::from_provider)
            .unwrap_or_else(|| TransactionStatus::Unknown(String::new()));

        Self { status, raw }
    }
}
