#![forbid(unsafe_code)]

//! Key material and the signature codec shared by the authority and the ledger.
//!
//! The policy is fixed: NIST P-384 keys, ECDSA over SHA-384, signatures carried
//! as `base64(DER(r, s))`.

mod error;
pub use self::error::CryptoError;

mod key;
pub use self::key::{KeyPair, PublicKey};

mod signature;
pub use self::signature::{Signature, sign, verify, CURVE, DIGEST};

pub use p384::elliptic_curve::zeroize::Zeroizing;
