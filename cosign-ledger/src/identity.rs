use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use super::PartyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartyKind {
    Supplier,
    Investor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub certificate_pem: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{:?} {} is unknown", kind, id)]
    NotFound { kind: PartyKind, id: PartyId },
    #[error("identity service unavailable: {}", _0)]
    Unavailable(String),
}

/// Looks up who a party is. Implementations may block on the network, the
/// ledger never calls them while holding a lock.
pub trait IdentityResolver {
    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Identity, ResolveError>;
}

impl<R> IdentityResolver for Arc<R>
where
    R: IdentityResolver + ?Sized,
{
    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Identity, ResolveError> {
        R::resolve(self, kind, id)
    }
}

impl<'a, R> IdentityResolver for &'a R
where
    R: IdentityResolver + ?Sized,
{
    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Identity, ResolveError> {
        R::resolve(self, kind, id)
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    parties: HashMap<(PartyKind, PartyId), Identity>,
}

impl StaticResolver {
    pub fn insert(&mut self, kind: PartyKind, id: PartyId, identity: Identity) -> &mut Self {
        self.parties.insert((kind, id), identity);
        self
    }
}

impl IdentityResolver for StaticResolver {
    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Identity, ResolveError> {
        self.parties
            .get(&(kind, id))
            .cloned()
            .ok_or(ResolveError::NotFound { kind, id })
    }
}

/// Remembers successful lookups for the lifetime of the resolver. Failures
/// are not cached.
pub struct CachingResolver<R> {
    inner: R,
    cache: Mutex<HashMap<(PartyKind, PartyId), Identity>>,
}

impl<R> CachingResolver<R>
where
    R: IdentityResolver,
{
    pub fn new(inner: R) -> Self {
        CachingResolver {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn forget(&self, kind: PartyKind, id: PartyId) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(kind, id));
    }
}

impl<R> IdentityResolver for CachingResolver<R>
where
    R: IdentityResolver,
{
    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Identity, ResolveError> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, id))
            .cloned();
        if let Some(identity) = cached {
            return Ok(identity);
        }

        // the lock is released, a slow upstream does not stall other parties
        let identity = self.inner.resolve(kind, id)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, id), identity.clone());
        Ok(identity)
    }
}
