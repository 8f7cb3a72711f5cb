use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The random source or the key encoder failed, not retried.
    #[error("crypto failure: {}", _0)]
    Failure(String),
    #[error("malformed private key")]
    MalformedKey,
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed signature")]
    MalformedSignature,
}
