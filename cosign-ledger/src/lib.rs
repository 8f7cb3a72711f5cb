#![forbid(unsafe_code)]

mod error;
pub use self::error::{LedgerError, Entity};

mod body;
pub use self::body::{ContractBody, canonicalize};

mod record;
pub use self::record::{ContractId, OfferId, PartyId, Stage, Contract, Offer};

mod identity;
pub use self::identity::{
    PartyKind, Identity, ResolveError, IdentityResolver, StaticResolver, CachingResolver,
};

mod store;
pub use self::store::Store;

mod ledger;
pub use self::ledger::LedgerContext;

#[cfg(test)]
mod tests;
