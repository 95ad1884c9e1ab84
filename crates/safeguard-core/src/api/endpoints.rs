//! Scan and fraud registry endpoints. Thin calls through the pipeline; no
//! scoring happens here.

use super::request::ApiRequest;
use super::{ApiError, RequestPipeline};
use crate::models::{
    ChainStats, FraudReport, FraudReportReceipt, NetworkStatus, PredictionResponse, RegistryEntry,
    SmsScanRequest, TransactionScanRequest, UrlScanRequest, VerificationRequest, VerificationResult,
    WebsiteScanRequest,
};

impl RequestPipeline {
    pub async fn predict_sms(&self, request: &SmsScanRequest) -> Result<PredictionResponse, ApiError> {
        self.execute_json(ApiRequest::post_json("/predict/sms", request)?).await
    }

    pub async fn predict_url(&self, request: &UrlScanRequest) -> Result<PredictionResponse, ApiError> {
        self.execute_json(ApiRequest::post_json("/predict/url", request)?).await
    }

    pub async fn predict_transaction(
        &self,
        request: &TransactionScanRequest,
    ) -> Result<PredictionResponse, ApiError> {
        self.execute_json(ApiRequest::post_json("/predict/transaction", request)?).await
    }

    pub async fn predict_website(&self, request: &WebsiteScanRequest) -> Result<PredictionResponse, ApiError> {
        self.execute_json(ApiRequest::post_json("/predict/website", request)?).await
    }

    /// Service health document, returned as-is
    pub async fn health(&self) -> Result<serde_json::Value, ApiError> {
        self.execute_json(ApiRequest::get("/health/")).await
    }

    pub async fn blockchain_status(&self) -> Result<NetworkStatus, ApiError> {
        self.execute_json(ApiRequest::get("/blockchain/status")).await
    }

    /// Look up a prediction's registry record by the hash it was issued with.
    pub async fn verify_prediction(&self, hash: &str) -> Result<VerificationResult, ApiError> {
        let body = VerificationRequest { hash: hash.to_string() };
        self.execute_json(ApiRequest::post_json("/blockchain/verify", &body)?).await
    }

    pub async fn report_fraud(&self, report: &FraudReport) -> Result<FraudReportReceipt, ApiError> {
        self.execute_json(ApiRequest::post_json("/blockchain/report", report)?).await
    }

    /// One page of reported cases, oldest first.
    pub async fn fraud_registry(&self, limit: u32, offset: u32) -> Result<Vec<RegistryEntry>, ApiError> {
        let path = format!("/blockchain/registry?limit={}&offset={}", limit, offset);
        self.execute_json(ApiRequest::get(path)).await
    }

    pub async fn blockchain_stats(&self) -> Result<ChainStats, ApiError> {
        self.execute_json(ApiRequest::get("/blockchain/stats")).await
    }
}
