//! Request and response bodies for the scan and fraud registry endpoints.
//!
//! These mirror the scoring service's wire format. The service's
//! classification is opaque; clients only submit input and show the result.

pub mod registry;
pub mod scan;

pub use registry::{
    ChainStats, FraudReport, FraudReportReceipt, NetworkStatus, RegistryEntry, VerificationRequest,
    VerificationResult, DEFAULT_REGISTRY_LIMIT,
};
pub use scan::{
    PredictionResponse, SmsScanRequest, TransactionScanRequest, UrlScanRequest, WebsiteScanRequest,
};
