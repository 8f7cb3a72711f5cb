use std::path::Path;
use serde::{Serialize, de::DeserializeOwned};
use sled::{Db, Tree, transaction::TransactionError};
use super::{Contract, ContractId, LedgerError, Offer, OfferId};

/// Durable contracts and offers. Offers are also indexed by contract, the
/// index key is the contract id followed by the offer id, both big-endian.
#[derive(Clone)]
pub struct Store {
    db: Db,
    pub(crate) contracts: Tree,
    pub(crate) offers: Tree,
    pub(crate) offers_by_contract: Tree,
}

impl Store {
    pub fn open<P>(path: P) -> sled::Result<Self>
    where
        P: AsRef<Path>,
    {
        Store::with_db(sled::open(path)?)
    }

    pub fn temporary() -> sled::Result<Self> {
        Store::with_db(sled::Config::new().temporary(true).open()?)
    }

    pub fn with_db(db: Db) -> sled::Result<Self> {
        Ok(Store {
            contracts: db.open_tree("contracts")?,
            offers: db.open_tree("offers")?,
            offers_by_contract: db.open_tree("offers_by_contract")?,
            db,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Unique and increasing for the lifetime of the database, starts at 1.
    pub(crate) fn next_id(&self) -> Result<u64, LedgerError> {
        Ok(self.db.generate_id()? + 1)
    }

    pub fn contract(&self, id: ContractId) -> Result<Option<Contract>, LedgerError> {
        get(&self.contracts, &id.key())
    }

    pub fn offer(&self, id: OfferId) -> Result<Option<Offer>, LedgerError> {
        get(&self.offers, &id.key())
    }

    pub fn offers_for(&self, contract: ContractId) -> Result<Vec<Offer>, LedgerError> {
        let mut offers = Vec::new();
        for entry in self.offers_by_contract.scan_prefix(contract.key()) {
            let (key, _) = entry?;
            if let Some(offer) = get(&self.offers, &key[8..])? {
                offers.push(offer);
            }
        }
        Ok(offers)
    }

    pub(crate) fn insert_contract(&self, contract: &Contract) -> Result<(), LedgerError> {
        self.contracts.insert(contract.id.key(), encode(contract)?)?;
        Ok(())
    }
}

pub(crate) fn encode<T>(value: &T) -> Result<Vec<u8>, LedgerError>
where
    T: Serialize,
{
    bincode::serialize(value).map_err(LedgerError::from)
}

pub(crate) fn decode<T>(bytes: &[u8]) -> Result<T, LedgerError>
where
    T: DeserializeOwned,
{
    bincode::deserialize(bytes).map_err(LedgerError::from)
}

fn get<T>(tree: &Tree, key: &[u8]) -> Result<Option<T>, LedgerError>
where
    T: DeserializeOwned,
{
    match tree.get(key)? {
        Some(bytes) => decode(bytes.as_ref()).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn flatten<T>(result: Result<T, TransactionError<LedgerError>>) -> Result<T, LedgerError> {
    result.map_err(|error| match error {
        TransactionError::Abort(error) => error,
        TransactionError::Storage(error) => LedgerError::Storage(error),
    })
}
