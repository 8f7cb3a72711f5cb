use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyUsagePurpose,
    PublicKeyData, SerialNumber, SignatureAlgorithm, PKCS_ECDSA_P384_SHA384,
};
use time::{Duration, OffsetDateTime};
use cosign_crypto::{KeyPair, PublicKey, Zeroizing};
use super::{
    Certificate, IssuanceError, KeyUsage, SerialCounter, Usage,
    certificate::SERIAL_NUMBER_OID,
};

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Written as `O=` into every subject.
    pub organization: String,
    /// `notBefore` is the issuance instant, `notAfter` is `notBefore + validity`.
    pub validity: Duration,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        AuthorityConfig {
            organization: "Cosign Service".to_string(),
            validity: Duration::days(365),
        }
    }
}

/// Freshly enrolled party: the certificate and the key it binds.
pub struct Enrollment {
    pub certificate: Certificate,
    pub key: KeyPair,
}

impl Enrollment {
    pub fn certificate_pem(&self) -> &str {
        self.certificate.pem()
    }

    pub fn private_key_pem(&self) -> Result<Zeroizing<String>, IssuanceError> {
        self.key.export_private().map_err(IssuanceError::from)
    }
}

/// Issues self-signed roots and leaves signed by a root. Serial numbers come
/// from one shared counter, whatever the certificate kind.
pub struct CertificateAuthority<C>
where
    C: SerialCounter,
{
    config: AuthorityConfig,
    counter: C,
}

// subject public key without its private half, enough to be certified
struct SubjectKey(Vec<u8>);

impl PublicKeyData for SubjectKey {
    fn der_bytes(&self) -> &[u8] {
        &self.0
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_ECDSA_P384_SHA384
    }
}

impl<C> CertificateAuthority<C>
where
    C: SerialCounter,
{
    pub fn new(config: AuthorityConfig, counter: C) -> Self {
        CertificateAuthority { config, counter }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    pub fn issue_root(
        &self,
        subject: &str,
        key: &KeyPair,
        usage: KeyUsage,
    ) -> Result<Certificate, IssuanceError> {
        let signer = to_rcgen(key)?;
        let certificate = self.issue(subject, usage, |params| params.self_signed(&signer))?;
        tracing::info!(
            serial = certificate.serial_number(),
            subject = subject,
            "issued root certificate",
        );
        Ok(certificate)
    }

    pub fn issue_leaf(
        &self,
        subject: &str,
        subject_key: &PublicKey,
        issuer: &Certificate,
        issuer_key: &KeyPair,
        usage: KeyUsage,
    ) -> Result<Certificate, IssuanceError> {
        if issuer.public_key() != issuer_key.public() {
            return Err(IssuanceError::IssuerKeyMismatch);
        }
        if !issuer.key_usage().contains(Usage::SignCertificates) {
            return Err(IssuanceError::IssuerNotAuthority);
        }

        let signer = to_rcgen(issuer_key)?;
        // rcgen wants the issuer as its own type, rebuilding it keeps the
        // subject name and the key, which is all the leaf refers to
        let issuer_rcgen = CertificateParams::from_ca_cert_pem(issuer.pem())?.self_signed(&signer)?;
        let subject_key = SubjectKey(subject_key.to_sec1_bytes());

        let certificate = self.issue(subject, usage, |params| {
            params.signed_by(&subject_key, &issuer_rcgen, &signer)
        })?;
        tracing::info!(
            serial = certificate.serial_number(),
            issuer = issuer.serial_number(),
            subject = subject,
            "issued leaf certificate",
        );
        Ok(certificate)
    }

    /// Generates a key pair for `subject` and certifies it by `issuer`.
    pub fn enroll(
        &self,
        subject: &str,
        usage: KeyUsage,
        issuer: &Certificate,
        issuer_key: &KeyPair,
    ) -> Result<Enrollment, IssuanceError> {
        let key = KeyPair::generate()?;
        let certificate = self.issue_leaf(subject, key.public(), issuer, issuer_key, usage)?;
        Ok(Enrollment { certificate, key })
    }

    fn issue<F>(&self, subject: &str, usage: KeyUsage, sign: F) -> Result<Certificate, IssuanceError>
    where
        F: Fn(CertificateParams) -> Result<rcgen::Certificate, rcgen::Error>,
    {
        if subject.trim().is_empty() || subject.contains('\0') {
            return Err(IssuanceError::Subject);
        }
        if self.config.validity <= Duration::ZERO {
            return Err(IssuanceError::Validity);
        }

        match self.try_issue(subject, usage, &sign) {
            Err(error) if error.is_transient() => {
                tracing::warn!("issuance failed, retrying with a fresh serial: {}", error);
                self.try_issue(subject, usage, &sign)
            },
            result => result,
        }
    }

    fn try_issue<F>(&self, subject: &str, usage: KeyUsage, sign: &F) -> Result<Certificate, IssuanceError>
    where
        F: Fn(CertificateParams) -> Result<rcgen::Certificate, rcgen::Error>,
    {
        // durable before anything is signed, a crash here only burns the number
        let serial = self.counter.advance()?;
        let params = self.params(subject, usage, serial)?;
        let issued = sign(params)?;
        Certificate::from_pem(&issued.pem()).map_err(IssuanceError::from)
    }

    fn params(&self, subject: &str, usage: KeyUsage, serial: u64) -> Result<CertificateParams, IssuanceError> {
        let now = OffsetDateTime::now_utc();
        let not_before = now
            .replace_nanosecond(0)
            .map_err(|_| IssuanceError::Validity)?;

        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, subject);
        name.push(DnType::OrganizationName, self.config.organization.as_str());
        name.push(DnType::CustomDnType(SERIAL_NUMBER_OID.to_vec()), serial.to_string());

        let mut params = CertificateParams::default();
        params.distinguished_name = name;
        params.serial_number = Some(SerialNumber::from_slice(&serial_bytes(serial)));
        params.not_before = not_before;
        params.not_after = not_before
            .checked_add(self.config.validity)
            .ok_or(IssuanceError::Validity)?;
        params.key_usages = usage
            .iter()
            .map(|usage| match usage {
                Usage::SignData => KeyUsagePurpose::DigitalSignature,
                Usage::SignCertificates => KeyUsagePurpose::KeyCertSign,
                Usage::SignCrl => KeyUsagePurpose::CrlSign,
            })
            .collect();
        params.is_ca = if usage.contains(Usage::SignCertificates) {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            IsCa::ExplicitNoCa
        };
        Ok(params)
    }
}

fn to_rcgen(key: &KeyPair) -> Result<rcgen::KeyPair, IssuanceError> {
    let pkcs8 = key.export_pkcs8()?;
    rcgen::KeyPair::from_pem(&pkcs8).map_err(IssuanceError::from)
}

// minimal big-endian form, DER integers carry no leading zero bytes
fn serial_bytes(serial: u64) -> Vec<u8> {
    let bytes = serial.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };
    use time::{Duration, OffsetDateTime};
    use cosign_crypto::{KeyPair, sign};
    use crate::{
        AuthorityConfig, CertificateAuthority, Certificate, CounterError, IssuanceError, KeyUsage,
        MemoryCounter, SerialCounter, SledCounter, Usage, verify_pem,
    };

    fn authority() -> CertificateAuthority<MemoryCounter> {
        CertificateAuthority::new(AuthorityConfig::default(), MemoryCounter::default())
    }

    #[test]
    fn root() {
        let ca = authority();
        let key = KeyPair::generate().unwrap();
        let root = ca.issue_root("Root", &key, KeyUsage::authority()).unwrap();

        assert_eq!(root.serial_number(), 1);
        assert_eq!(root.issuer_serial_number(), 1);
        assert!(root.is_self_issued());
        assert_eq!(root.subject_common_name(), "Root");
        assert_eq!(root.organization(), Some("Cosign Service"));
        assert_eq!(root.key_usage(), KeyUsage::authority());
        assert_eq!(root.public_key(), key.public());
        assert!(root.not_before() < root.not_after());
        assert_eq!(root.not_after() - root.not_before(), Duration::days(365));
        assert!(root.is_valid_at(OffsetDateTime::now_utc()));
        assert!(root.is_issued_by(&root));
        assert!(root.pem().starts_with("-----BEGIN CERTIFICATE-----"));

        let parsed = Certificate::from_pem(root.pem()).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.serial_number(), root.serial_number());
    }

    #[test]
    fn leaf() {
        let ca = authority();
        let root_key = KeyPair::generate().unwrap();
        let root = ca.issue_root("Root", &root_key, KeyUsage::authority()).unwrap();

        let party_key = KeyPair::generate().unwrap();
        let leaf = ca
            .issue_leaf("Supplier", party_key.public(), &root, &root_key, KeyUsage::party())
            .unwrap();

        assert_eq!(leaf.serial_number(), 2);
        assert_eq!(leaf.issuer_serial_number(), root.serial_number());
        assert!(!leaf.is_self_issued());
        assert_eq!(leaf.subject_common_name(), "Supplier");
        assert_eq!(leaf.public_key(), party_key.public());
        assert!(leaf.key_usage().contains(Usage::SignData));
        assert!(!leaf.key_usage().contains(Usage::SignCertificates));
        assert!(leaf.is_issued_by(&root));
        assert!(!root.is_issued_by(&leaf));

        let message = b"payload";
        let signature = sign(&party_key, message).unwrap().encode();
        assert!(leaf.verify(message, &signature));
        assert!(verify_pem(leaf.pem(), message, &signature));
        assert!(!root.verify(message, &signature));
        assert!(!verify_pem("garbage", message, &signature));
    }

    #[test]
    fn foreign_root() {
        let ca = authority();
        let root_key = KeyPair::generate().unwrap();
        let root = ca.issue_root("Root", &root_key, KeyUsage::authority()).unwrap();

        // same serial numbers, different key
        let other_ca = authority();
        let other_key = KeyPair::generate().unwrap();
        let other_root = other_ca.issue_root("Root", &other_key, KeyUsage::authority()).unwrap();
        let party = other_ca.enroll("Mallory", KeyUsage::party(), &other_root, &other_key).unwrap();

        assert_eq!(party.certificate.issuer_serial_number(), root.serial_number());
        assert!(!party.certificate.is_issued_by(&root));
        assert!(party.certificate.is_issued_by(&other_root));
    }

    #[test]
    fn issuer_checks() {
        let ca = authority();
        let root_key = KeyPair::generate().unwrap();
        let root = ca.issue_root("Root", &root_key, KeyUsage::authority()).unwrap();
        let wrong_key = KeyPair::generate().unwrap();

        let result = ca.issue_leaf("A", wrong_key.public(), &root, &wrong_key, KeyUsage::party());
        assert!(matches!(result, Err(IssuanceError::IssuerKeyMismatch)));

        let party = ca.enroll("A", KeyUsage::party(), &root, &root_key).unwrap();
        let result = ca.issue_leaf("B", wrong_key.public(), &party.certificate, &party.key, KeyUsage::party());
        assert!(matches!(result, Err(IssuanceError::IssuerNotAuthority)));

        let result = ca.issue_root("  ", &root_key, KeyUsage::authority());
        assert!(matches!(result, Err(IssuanceError::Subject)));
    }

    #[test]
    fn non_positive_validity() {
        let config = AuthorityConfig {
            validity: Duration::ZERO,
            ..AuthorityConfig::default()
        };
        let ca = CertificateAuthority::new(config, MemoryCounter::default());
        let key = KeyPair::generate().unwrap();
        assert!(matches!(
            ca.issue_root("Root", &key, KeyUsage::authority()),
            Err(IssuanceError::Validity)
        ));
    }

    #[test]
    fn validity_out_of_range() {
        let config = AuthorityConfig {
            validity: Duration::days(100_000_000),
            ..AuthorityConfig::default()
        };
        let ca = CertificateAuthority::new(config, MemoryCounter::default());
        let key = KeyPair::generate().unwrap();
        assert!(matches!(
            ca.issue_root("Root", &key, KeyUsage::authority()),
            Err(IssuanceError::Validity)
        ));
    }

    // fails `advance` the given number of times, each failure burns a serial
    struct Flaky {
        inner: MemoryCounter,
        failures: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize) -> Self {
            Flaky {
                inner: MemoryCounter::default(),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl SerialCounter for Flaky {
        fn current(&self) -> Result<u64, CounterError> {
            self.inner.current()
        }

        fn advance(&self) -> Result<u64, CounterError> {
            let serial = self.inner.advance()?;
            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                Err(CounterError::Storage(sled::Error::Unsupported("disk is gone".to_string())))
            } else {
                Ok(serial)
            }
        }
    }

    #[test]
    fn one_retry_after_transient_failure() {
        let key = KeyPair::generate().unwrap();

        let ca = CertificateAuthority::new(AuthorityConfig::default(), Flaky::new(1));
        let root = ca.issue_root("Root", &key, KeyUsage::authority()).unwrap();
        assert_eq!(root.serial_number(), 2);

        let ca = CertificateAuthority::new(AuthorityConfig::default(), Flaky::new(2));
        assert!(matches!(
            ca.issue_root("Root", &key, KeyUsage::authority()),
            Err(IssuanceError::Counter(CounterError::Storage(_)))
        ));
        assert_eq!(ca.counter().current().unwrap(), 2);
    }

    #[test]
    fn enrollment_pem() {
        let ca = authority();
        let root_key = KeyPair::generate().unwrap();
        let root = ca.issue_root("Root", &root_key, KeyUsage::authority()).unwrap();
        let enrollment = ca.enroll("Investor", KeyUsage::party(), &root, &root_key).unwrap();

        let key = KeyPair::import_private(&enrollment.private_key_pem().unwrap()).unwrap();
        let certificate = Certificate::from_pem(enrollment.certificate_pem()).unwrap();
        assert_eq!(certificate.public_key(), key.public());
    }

    #[test]
    fn concurrent_serials() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let counter = SledCounter::new(db.open_tree("serial").unwrap());
        let ca = Arc::new(CertificateAuthority::new(AuthorityConfig::default(), counter));
        let root_key = Arc::new(KeyPair::generate().unwrap());
        let root = Arc::new(ca.issue_root("Root", &root_key, KeyUsage::authority()).unwrap());

        let threads = (0..4)
            .map(|i| {
                let (ca, root, root_key) = (ca.clone(), root.clone(), root_key.clone());
                thread::spawn(move || {
                    (0..4)
                        .map(|j| {
                            let subject = format!("party-{}-{}", i, j);
                            if j % 2 == 0 {
                                let key = KeyPair::generate().unwrap();
                                ca.issue_root(&subject, &key, KeyUsage::authority())
                                    .unwrap()
                                    .serial_number()
                            } else {
                                ca.enroll(&subject, KeyUsage::party(), &root, &root_key)
                                    .unwrap()
                                    .certificate
                                    .serial_number()
                            }
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut serials = HashSet::new();
        serials.insert(root.serial_number());
        for thread in threads {
            for serial in thread.join().unwrap() {
                assert!(serials.insert(serial), "serial {} reused", serial);
            }
        }
        assert_eq!(serials.len(), 17);
    }
}
