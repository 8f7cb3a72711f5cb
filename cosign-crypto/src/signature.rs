use std::{fmt, str::FromStr};
use p384::{
    FieldBytes,
    ecdsa::{
        self,
        signature::{Signer, Verifier},
    },
};
use super::{CryptoError, KeyPair, PublicKey};

pub const CURVE: &str = "P-384";
pub const DIGEST: &str = "SHA-384";

const SCALAR_LENGTH: usize = 48;

/// ECDSA signature, the `(r, s)` pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    inner: ecdsa::Signature,
}

impl Signature {
    /// Big-endian scalars, shorter input is left padded.
    pub fn from_scalars(r: &[u8], s: &[u8]) -> Result<Self, CryptoError> {
        fn pad(bytes: &[u8]) -> Result<FieldBytes, CryptoError> {
            if bytes.len() > SCALAR_LENGTH {
                return Err(CryptoError::MalformedSignature);
            }
            let mut padded = FieldBytes::default();
            padded[(SCALAR_LENGTH - bytes.len())..].clone_from_slice(bytes);
            Ok(padded)
        }

        ecdsa::Signature::from_scalars(pad(r)?, pad(s)?)
            .map(|inner| Signature { inner })
            .map_err(|_| CryptoError::MalformedSignature)
    }

    pub fn r(&self) -> FieldBytes {
        self.inner.split_bytes().0
    }

    pub fn s(&self) -> FieldBytes {
        self.inner.split_bytes().1
    }

    /// ASN.1 `ECDSA-Sig-Value` in DER.
    pub fn to_der(&self) -> Vec<u8> {
        self.inner.to_der().as_bytes().to_vec()
    }

    /// Only the canonical DER form is accepted, trailing bytes are not.
    pub fn from_der(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner = ecdsa::Signature::from_der(bytes).map_err(|_| CryptoError::MalformedSignature)?;
        if inner.to_der().as_bytes() != bytes {
            return Err(CryptoError::MalformedSignature);
        }
        Ok(Signature { inner })
    }

    pub fn encode(&self) -> String {
        base64::encode(self.to_der())
    }

    pub fn decode(s: &str) -> Result<Self, CryptoError> {
        let bytes = base64::decode(s.trim()).map_err(|_| CryptoError::MalformedSignature)?;
        Signature::from_der(&bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("r", &hex::encode(self.r()))
            .field("s", &hex::encode(self.s()))
            .finish()
    }
}

impl FromStr for Signature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::decode(s)
    }
}

/// Hashes `message` with SHA-384 and signs the digest. Deterministic nonce
/// (RFC 6979), same key and message give the same signature.
pub fn sign(key: &KeyPair, message: &[u8]) -> Result<Signature, CryptoError> {
    key.signing_key()
        .try_sign(message)
        .map(|inner| Signature { inner })
        .map_err(|error| CryptoError::Failure(error.to_string()))
}

/// Never fails loudly, any decoding problem is just an invalid signature.
pub fn verify(public_key: &PublicKey, message: &[u8], encoded: &str) -> bool {
    let signature = match Signature::decode(encoded) {
        Ok(v) => v,
        Err(_) => return false,
    };
    public_key
        .verifying_key()
        .verify(message, &signature.inner)
        .is_ok()
}
