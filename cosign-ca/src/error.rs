use thiserror::Error;
use cosign_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("storage error: {}", _0)]
    Storage(#[from] sled::Error),
    #[error("stored counter value is corrupted")]
    Corrupted,
    #[error("serial numbers exhausted")]
    Exhausted,
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("not a PEM encoded certificate")]
    Pem,
    #[error("invalid X.509 structure")]
    Der,
    #[error("missing {}", _0)]
    Missing(&'static str),
    #[error("unsupported public key")]
    PublicKey,
    #[error("serial number does not fit in 64 bits")]
    Serial,
    #[error("empty validity window")]
    Validity,
}

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("crypto failure: {}", _0)]
    Crypto(#[from] CryptoError),
    #[error("serial counter: {}", _0)]
    Counter(#[from] CounterError),
    #[error("signing failed: {}", _0)]
    Signing(#[from] rcgen::Error),
    #[error("issued certificate is unreadable: {}", _0)]
    Certificate(#[from] CertificateError),
    #[error("invalid subject name")]
    Subject,
    #[error("validity period must be positive")]
    Validity,
    #[error("issuer key does not match the issuer certificate")]
    IssuerKeyMismatch,
    #[error("issuer is not allowed to sign certificates")]
    IssuerNotAuthority,
}

impl IssuanceError {
    /// Failures worth one more attempt with a fresh serial number.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            &IssuanceError::Counter(CounterError::Storage(_)) | &IssuanceError::Signing(_)
        )
    }
}
