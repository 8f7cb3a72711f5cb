use std::fmt;
use time::OffsetDateTime;
use x509_parser::{
    certificate::X509Certificate,
    parse_x509_certificate,
    pem::parse_x509_pem,
    x509::X509Name,
};
use cosign_crypto::PublicKey;
use super::{CertificateError, KeyUsage, Usage};

pub(crate) const SERIAL_NUMBER_OID: &[u64] = &[2, 5, 4, 5];

/// Identity certificate issued by the authority. Built only from a parsed
/// X.509 document, so the fields always agree with the DER bytes.
#[derive(Clone)]
pub struct Certificate {
    serial_number: u64,
    subject_common_name: String,
    organization: Option<String>,
    public_key: PublicKey,
    key_usage: KeyUsage,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    issuer_serial_number: u64,
    der: Vec<u8>,
    pem: String,
}

impl Certificate {
    /// Accepts exactly one `CERTIFICATE` block, surrounding whitespace aside.
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let (rest, block) = parse_x509_pem(pem.trim().as_bytes()).map_err(|_| CertificateError::Pem)?;
        if block.label != "CERTIFICATE" || !rest.iter().all(u8::is_ascii_whitespace) {
            return Err(CertificateError::Pem);
        }
        let mut pem = pem.trim().to_string();
        pem.push('\n');
        Certificate::parse(block.contents, pem)
    }

    fn parse(der: Vec<u8>, pem: String) -> Result<Self, CertificateError> {
        let (rest, x509) = parse_x509_certificate(&der).map_err(|_| CertificateError::Der)?;
        if !rest.is_empty() {
            return Err(CertificateError::Der);
        }

        let serial_number = serial_from_bytes(x509.tbs_certificate.raw_serial())?;
        let subject_common_name = x509
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .ok_or(CertificateError::Missing("subject common name"))?
            .to_string();
        let organization = x509
            .subject()
            .iter_organization()
            .next()
            .and_then(|o| o.as_str().ok())
            .map(str::to_string);
        let issuer_serial_number = serial_from_name(x509.issuer())?;

        let public_key = PublicKey::from_sec1_bytes(&x509.public_key().subject_public_key.data)
            .map_err(|_| CertificateError::PublicKey)?;

        let key_usage = match x509.key_usage() {
            Ok(Some(extension)) => {
                let flags = extension.value;
                let mut usage = KeyUsage::empty();
                if flags.digital_signature() {
                    usage = usage.with(Usage::SignData);
                }
                if flags.key_cert_sign() {
                    usage = usage.with(Usage::SignCertificates);
                }
                if flags.crl_sign() {
                    usage = usage.with(Usage::SignCrl);
                }
                usage
            },
            Ok(None) => KeyUsage::empty(),
            Err(_) => return Err(CertificateError::Der),
        };

        let validity = x509.validity();
        let not_before = OffsetDateTime::from_unix_timestamp(validity.not_before.timestamp())
            .map_err(|_| CertificateError::Validity)?;
        let not_after = OffsetDateTime::from_unix_timestamp(validity.not_after.timestamp())
            .map_err(|_| CertificateError::Validity)?;
        if not_before >= not_after {
            return Err(CertificateError::Validity);
        }

        Ok(Certificate {
            serial_number,
            subject_common_name,
            organization,
            public_key,
            key_usage,
            not_before,
            not_after,
            issuer_serial_number,
            der,
            pem,
        })
    }

    pub fn serial_number(&self) -> u64 {
        self.serial_number
    }

    pub fn subject_common_name(&self) -> &str {
        &self.subject_common_name
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_usage(&self) -> KeyUsage {
        self.key_usage
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    pub fn issuer_serial_number(&self) -> u64 {
        self.issuer_serial_number
    }

    pub fn is_self_issued(&self) -> bool {
        self.issuer_serial_number == self.serial_number
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }

    /// Checks the issuer linkage and the X.509 signature against the issuer's
    /// key. One level only, there is no chain building.
    pub fn is_issued_by(&self, issuer: &Certificate) -> bool {
        if self.issuer_serial_number != issuer.serial_number
            || !issuer.key_usage.contains(Usage::SignCertificates)
        {
            return false;
        }
        match (parse_der(&self.der), parse_der(&issuer.der)) {
            (Some(subject), Some(issuer)) => subject.verify_signature(Some(issuer.public_key())).is_ok(),
            _ => false,
        }
    }

    /// The signature codec's verification bound to this certificate's key.
    /// Any failure, including a foreign curve or a malformed signature, is
    /// just `false`.
    pub fn verify(&self, message: &[u8], encoded_signature: &str) -> bool {
        cosign_crypto::verify(&self.public_key, message, encoded_signature)
    }
}

/// Verification for callers holding the certificate as PEM text.
pub fn verify_pem(certificate_pem: &str, message: &[u8], encoded_signature: &str) -> bool {
    match Certificate::from_pem(certificate_pem) {
        Ok(certificate) => certificate.verify(message, encoded_signature),
        Err(error) => {
            tracing::debug!("certificate rejected: {}", error);
            false
        },
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("serial_number", &self.serial_number)
            .field("subject_common_name", &self.subject_common_name)
            .field("key_usage", &self.key_usage.to_string())
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("issuer_serial_number", &self.issuer_serial_number)
            .field("public_key", &self.public_key)
            .finish()
    }
}

fn parse_der(der: &[u8]) -> Option<X509Certificate<'_>> {
    parse_x509_certificate(der).map(|(_, x509)| x509).ok()
}

fn serial_from_bytes(bytes: &[u8]) -> Result<u64, CertificateError> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let significant = &bytes[start..];
    if significant.len() > 8 {
        return Err(CertificateError::Serial);
    }
    Ok(significant
        .iter()
        .fold(0, |acc, byte| (acc << 8) | u64::from(*byte)))
}

fn serial_from_name(name: &X509Name<'_>) -> Result<u64, CertificateError> {
    let id = SERIAL_NUMBER_OID
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".");
    name.iter_attributes()
        .find(|attribute| attribute.attr_type().to_id_string() == id)
        .and_then(|attribute| attribute.as_str().ok())
        .ok_or(CertificateError::Missing("issuer serial number"))?
        .parse()
        .map_err(|_| CertificateError::Serial)
}
