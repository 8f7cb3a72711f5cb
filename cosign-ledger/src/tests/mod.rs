use time::macros::datetime;
use cosign_ca::{CertificateAuthority, Certificate, KeyUsage, MemoryCounter};
use cosign_crypto::{KeyPair, sign};
use crate::{ContractBody, canonicalize};

mod concurrency;

pub struct Party {
    pub key: KeyPair,
    pub certificate: Certificate,
}

impl Party {
    pub fn sign(&self, body: &ContractBody) -> String {
        sign(&self.key, &canonicalize(body)).unwrap().encode()
    }
}

/// A root and the parties it certified.
pub struct Pki {
    pub authority: CertificateAuthority<MemoryCounter>,
    pub root: Certificate,
    pub root_key: KeyPair,
}

impl Pki {
    pub fn new() -> Self {
        let authority = CertificateAuthority::new(Default::default(), MemoryCounter::default());
        let root_key = KeyPair::generate().unwrap();
        let root = authority
            .issue_root("Cosign Root", &root_key, KeyUsage::authority())
            .unwrap();
        Pki {
            authority,
            root,
            root_key,
        }
    }

    pub fn enroll(&self, name: &str) -> Party {
        let enrollment = self
            .authority
            .enroll(name, KeyUsage::party(), &self.root, &self.root_key)
            .unwrap();
        Party {
            key: enrollment.key,
            certificate: enrollment.certificate,
        }
    }
}

pub fn fence() -> ContractBody {
    ContractBody::new("Build fence", "", 500, datetime!(2025-01-01 0:00 UTC))
}
