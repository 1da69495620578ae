//! Error classification for model-service failures.
//!
//! The model service reports failures with a string error code. Two fixed,
//! disjoint code sets drive the invocation layer:
//!
//! - retryable codes: transient service-side conditions expected to
//!   self-resolve, worth spending the retry budget on the same model;
//! - fallback codes: the same model is unlikely to succeed soon, but a
//!   different model might, so skip straight to the fallback.
//!
//! Codes are matched exactly and case-sensitively. Errors without a service
//! code (network failures, parse errors, auth) are never retryable; whether
//! they still reach the fallback is the invoker's call, not this module's.

use tenax_core::error::ProviderError;

/// Error codes that should trigger retry on the primary model.
pub const RETRYABLE_ERROR_CODES: &[&str] = &[
    "ThrottlingException",
    "ServiceUnavailable",
    "InternalFailure",
    "ServiceException",
    "RequestTimeout",
];

/// Error codes that should trigger immediate fallback (no retry).
pub const FALLBACK_ERROR_CODES: &[&str] = &[
    "ModelNotReadyException",
    "ModelStreamErrorException",
    "ModelTimeoutException",
    "ModelErrorException",
    "ServiceQuotaExceededException",
];

/// Whether this error should trigger a retry on the same model.
pub fn is_retryable(error: &ProviderError) -> bool {
    error
        .code()
        .is_some_and(|code| RETRYABLE_ERROR_CODES.contains(&code))
}

/// Whether this error should trigger fallback to the secondary model.
pub fn should_fallback(error: &ProviderError) -> bool {
    error
        .code()
        .is_some_and(|code| FALLBACK_ERROR_CODES.contains(&code))
}
