use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Page size the registry endpoint uses when none is given.
pub const DEFAULT_REGISTRY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationRequest {
    pub hash: String,
}

/// Result of looking a prediction up in the registry by its hash.
///
/// When the hash is unknown only `found` and `message` are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationResult {
    pub found: bool,
    #[serde(default)]
    pub verified: bool,
    pub block_index: Option<u64>,
    pub block_hash: Option<String>,
    pub transaction: Option<serde_json::Value>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudReport {
    pub fraud_type: String,
    pub description: String,
    pub evidence: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter_id: Option<String>,
}

impl FraudReport {
    pub fn new(fraud_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            fraud_type: fraud_type.into(),
            description: description.into(),
            evidence: HashMap::new(),
            reporter_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudReportReceipt {
    pub success: bool,
    pub hash: Option<String>,
    pub block_number: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub id: String,
    pub fraud_type: String,
    pub description: String,
    pub timestamp: String,
    pub block_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkStatus {
    pub status: String,
    pub chain_length: Option<u64>,
    pub pending_transactions: Option<u64>,
    pub last_block_hash: Option<String>,
    pub network_health: Option<String>,
    pub error: Option<String>,
}

/// Registry totals. The service reports only `error` when it cannot count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainStats {
    #[serde(default)]
    pub total_blocks: u64,
    #[serde(default)]
    pub total_transactions: u64,
    #[serde(default)]
    pub fraud_reports: u64,
    #[serde(default)]
    pub predictions: u64,
    #[serde(default)]
    pub pending_transactions: u64,
    pub chain_integrity: Option<String>,
    pub error: Option<String>,
}
