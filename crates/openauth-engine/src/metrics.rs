//! Engine metrics
//!
//! Emitted through the `metrics` facade; they are no-ops until the binary
//! installs a recorder.
//!
//! - `openauth_tokens_issued_total` (counter): label `grant_type`
//! - `openauth_code_exchanges_total` (counter): label `outcome`
//! - `openauth_token_validations_total` (counter): label `outcome`
//! - `openauth_refresh_total` (counter): label `outcome`
//! - `openauth_revocations_total` (counter)
//! - `openauth_swept_records_total` (counter): label `kind`

use openauth_core::GrantType;

pub fn record_issued(grant: GrantType) {
    metrics::counter!("openauth_tokens_issued_total", "grant_type" => grant.as_str()).increment(1);
}

pub fn record_code_exchange(outcome: &'static str) {
    metrics::counter!("openauth_code_exchanges_total", "outcome" => outcome).increment(1);
}

pub fn record_validation(outcome: &'static str) {
    metrics::counter!("openauth_token_validations_total", "outcome" => outcome).increment(1);
}

pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("openauth_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_revocation() {
    metrics::counter!("openauth_revocations_total").increment(1);
}

pub fn record_swept(kind: &'static str, count: usize) {
    metrics::counter!("openauth_swept_records_total", "kind" => kind).increment(count as u64);
}
