use std::path::Path;
use serde::{Serialize, Deserialize};
use sled::{Db, Tree};
use thiserror::Error;
use cosign_crypto::{CryptoError, KeyPair};
use cosign_ca::{
    AuthorityConfig, Certificate, CertificateAuthority, CertificateError, IssuanceError,
    KeyUsage, SledCounter,
};
use cosign_ledger::{Identity, IdentityResolver, PartyId, PartyKind, ResolveError, Store};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage: {}", _0)]
    Storage(#[from] sled::Error),
    #[error("record: {}", _0)]
    Codec(#[from] bincode::Error),
    #[error("key: {}", _0)]
    Crypto(#[from] CryptoError),
    #[error("issuance: {}", _0)]
    Issuance(#[from] IssuanceError),
    #[error("certificate: {}", _0)]
    Certificate(#[from] CertificateError),
    #[error("the authority is not initialized, run `init` first")]
    NoAuthority,
}

#[derive(Serialize, Deserialize)]
struct ConfigRecord {
    organization: String,
    validity_seconds: i64,
}

#[derive(Serialize, Deserialize)]
struct PartyRecord {
    name: String,
    certificate_pem: String,
}

pub struct Database {
    db: Db,
    authority: Tree,
    parties: Tree,
}

impl Database {
    pub fn open<P>(path: P) -> sled::Result<Self>
    where
        P: AsRef<Path>,
    {
        let db = sled::open(path)?;
        Ok(Database {
            authority: db.open_tree("authority")?,
            parties: db.open_tree("parties")?,
            db,
        })
    }

    pub fn store(&self) -> sled::Result<Store> {
        Store::with_db(self.db.clone())
    }

    pub fn authority(&self, config: AuthorityConfig) -> sled::Result<CertificateAuthority<SledCounter>> {
        let counter = SledCounter::new(self.db.open_tree("serial")?);
        Ok(CertificateAuthority::new(config, counter))
    }

    /// The configuration the root was issued with, leaves follow it.
    pub fn config(&self) -> Result<AuthorityConfig, DatabaseError> {
        match self.authority.get(b"config")? {
            Some(bytes) => {
                let record: ConfigRecord = bincode::deserialize(&bytes)?;
                Ok(AuthorityConfig {
                    organization: record.organization,
                    validity: time::Duration::seconds(record.validity_seconds),
                })
            },
            None => Ok(AuthorityConfig::default()),
        }
    }

    /// Issues the root on first use, later calls return the stored one.
    pub fn root_or_insert(
        &self,
        authority: &CertificateAuthority<SledCounter>,
        subject: &str,
    ) -> Result<(Certificate, KeyPair), DatabaseError> {
        if let Some(root) = self.root()? {
            return Ok(root);
        }
        let key = KeyPair::generate()?;
        let certificate = authority.issue_root(subject, &key, KeyUsage::authority())?;
        let key_pem = key.export_private()?;
        let config = ConfigRecord {
            organization: authority.config().organization.clone(),
            validity_seconds: authority.config().validity.whole_seconds(),
        };
        self.authority.insert(b"config", bincode::serialize(&config)?)?;
        self.authority
            .insert(b"root_certificate", certificate.pem().as_bytes())?;
        self.authority.insert(b"root_key", key_pem.as_bytes())?;
        self.authority.flush()?;
        Ok((certificate, key))
    }

    pub fn root(&self) -> Result<Option<(Certificate, KeyPair)>, DatabaseError> {
        let certificate = match self.authority.get(b"root_certificate")? {
            Some(v) => v,
            None => return Ok(None),
        };
        let key = self
            .authority
            .get(b"root_key")?
            .ok_or(DatabaseError::NoAuthority)?;
        let certificate = Certificate::from_pem(&String::from_utf8_lossy(&certificate))?;
        let key = KeyPair::import_private(&String::from_utf8_lossy(&key))?;
        Ok(Some((certificate, key)))
    }

    pub fn register(
        &self,
        kind: PartyKind,
        id: PartyId,
        name: &str,
        certificate: &Certificate,
    ) -> Result<(), DatabaseError> {
        let record = PartyRecord {
            name: name.to_string(),
            certificate_pem: certificate.pem().to_string(),
        };
        self.parties
            .insert(party_key(kind, id), bincode::serialize(&record)?)?;
        Ok(())
    }

    pub fn directory(&self) -> Directory {
        Directory {
            parties: self.parties.clone(),
        }
    }
}

fn party_key(kind: PartyKind, id: PartyId) -> [u8; 9] {
    let mut key = [0; 9];
    key[0] = match kind {
        PartyKind::Supplier => b's',
        PartyKind::Investor => b'i',
    };
    key[1..].clone_from_slice(&id.key());
    key
}

/// Parties enrolled through this node.
pub struct Directory {
    parties: Tree,
}

impl IdentityResolver for Directory {
    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Identity, ResolveError> {
        let bytes = self
            .parties
            .get(party_key(kind, id))
            .map_err(|error| ResolveError::Unavailable(error.to_string()))?
            .ok_or(ResolveError::NotFound { kind, id })?;
        let record: PartyRecord = bincode::deserialize(&bytes)
            .map_err(|error| ResolveError::Unavailable(error.to_string()))?;
        Ok(Identity {
            name: record.name,
            certificate_pem: record.certificate_pem,
        })
    }
}
