use sled::transaction::{ConflictableTransactionError, Transactional};
use time::OffsetDateTime;
use cosign_ca::{Certificate, Usage};
use cosign_crypto::Signature;
use super::{
    store::{decode, encode, flatten},
    ContractBody, Contract, ContractId, Offer, OfferId, PartyId, Stage, Store, Entity, LedgerError,
    IdentityResolver, PartyKind, ResolveError, canonicalize,
};

type TxResult<T> = Result<T, ConflictableTransactionError<LedgerError>>;

fn abort<T>(error: LedgerError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(error))
}

/// Contracts move from `Draft` to `Funded` only when the supplier and the
/// investor have both signed the canonical body.
pub struct LedgerContext<R> {
    store: Store,
    resolver: R,
    trust_root: Option<Certificate>,
}

impl<R> LedgerContext<R>
where
    R: IdentityResolver,
{
    pub fn new(store: Store, resolver: R) -> Self {
        LedgerContext {
            store,
            resolver,
            trust_root: None,
        }
    }

    /// Only certificates issued by `root` will verify.
    pub fn with_trust_root(self, root: Certificate) -> Self {
        LedgerContext {
            trust_root: Some(root),
            ..self
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn create_contract(
        &self,
        investor: PartyId,
        body: ContractBody,
    ) -> Result<ContractId, LedgerError> {
        body.validate()?;

        let id = ContractId(self.store.next_id()?);
        let contract = Contract {
            id,
            supplier: None,
            investor,
            stage: Stage::Draft,
            created: OffsetDateTime::now_utc(),
            body,
            supplier_signature: None,
            investor_signature: None,
        };
        self.store.insert_contract(&contract)?;
        tracing::info!(
            contract = tracing::field::display(&id),
            investor = tracing::field::display(&investor),
            "contract created",
        );
        Ok(id)
    }

    pub fn create_offer(
        &self,
        contract_id: ContractId,
        supplier: PartyId,
        supplier_certificate: &Certificate,
        signature: &str,
        comment: Option<String>,
    ) -> Result<OfferId, LedgerError> {
        let contract = self
            .store
            .contract(contract_id)?
            .ok_or(LedgerError::NotFound(Entity::Contract))?;
        if contract.stage != Stage::Draft {
            return Err(LedgerError::WrongStage(contract.stage));
        }

        let now = OffsetDateTime::now_utc();
        let message = canonicalize(&contract.body);
        let signature = self
            .check(supplier_certificate, now, &message, signature)
            .ok_or(LedgerError::SignatureInvalid)?;

        let offer = Offer {
            id: OfferId(self.store.next_id()?),
            contract: contract_id,
            supplier,
            supplier_signature: signature,
            supplier_certificate: supplier_certificate.pem().to_string(),
            comment,
            created: now,
        };
        let bytes = encode(&offer)?;
        let mut index = contract_id.key().to_vec();
        index.extend_from_slice(&offer.id.key());

        let trees = (
            &self.store.contracts,
            &self.store.offers,
            &self.store.offers_by_contract,
        );
        let result = trees.transaction(|(contracts, offers, by_contract)| -> TxResult<()> {
            // the contract may have been funded since it was read
            let contract: Contract = match contracts.get(&contract_id.key())? {
                Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => return abort(LedgerError::NotFound(Entity::Contract)),
            };
            if contract.stage != Stage::Draft {
                return abort(LedgerError::WrongStage(contract.stage));
            }
            offers.insert(&offer.id.key()[..], bytes.as_slice())?;
            by_contract.insert(index.as_slice(), &b""[..])?;
            Ok(())
        });
        flatten(result)?;

        tracing::info!(
            contract = tracing::field::display(&contract_id),
            offer = tracing::field::display(&offer.id),
            supplier = tracing::field::display(&supplier),
            "offer created",
        );
        Ok(offer.id)
    }

    /// Runs as one transaction: either the contract is funded with both
    /// signatures or nothing changes.
    pub fn accept_offer(
        &self,
        contract_id: ContractId,
        offer_id: OfferId,
        investor_certificate: &Certificate,
        signature: &str,
    ) -> Result<(), LedgerError> {
        let now = OffsetDateTime::now_utc();

        let trees = (&self.store.contracts, &self.store.offers);
        let result = trees.transaction(|(contracts, offers)| -> TxResult<PartyId> {
            let mut contract: Contract = match contracts.get(&contract_id.key())? {
                Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => return abort(LedgerError::NotFound(Entity::Contract)),
            };
            if contract.stage != Stage::Draft {
                return abort(LedgerError::WrongStage(contract.stage));
            }
            let offer: Offer = match offers.get(&offer_id.key())? {
                Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => return abort(LedgerError::NotFound(Entity::Offer)),
            };
            if offer.contract != contract_id {
                return abort(LedgerError::NotFound(Entity::Offer));
            }

            let message = canonicalize(&contract.body);
            let supplier_signature = Certificate::from_pem(&offer.supplier_certificate)
                .ok()
                .and_then(|certificate| {
                    self.check(&certificate, now, &message, &offer.supplier_signature)
                });
            let investor_signature = self.check(investor_certificate, now, &message, signature);
            let (supplier_signature, investor_signature) =
                match (supplier_signature, investor_signature) {
                    (Some(s), Some(i)) => (s, i),
                    _ => return abort(LedgerError::SignatureInvalid),
                };

            contract.stage = Stage::Funded;
            contract.supplier = Some(offer.supplier);
            contract.supplier_signature = Some(supplier_signature);
            contract.investor_signature = Some(investor_signature);
            let bytes = encode(&contract).map_err(ConflictableTransactionError::Abort)?;
            contracts.insert(&contract_id.key()[..], bytes)?;
            Ok(offer.supplier)
        });

        match flatten(result) {
            Ok(supplier) => {
                tracing::info!(
                    contract = tracing::field::display(&contract_id),
                    offer = tracing::field::display(&offer_id),
                    supplier = tracing::field::display(&supplier),
                    "contract funded",
                );
                Ok(())
            },
            Err(error) => {
                tracing::debug!(
                    contract = tracing::field::display(&contract_id),
                    offer = tracing::field::display(&offer_id),
                    "accept rejected: {}",
                    error,
                );
                Err(error)
            },
        }
    }

    /// Like `create_offer`, the certificate comes from the resolver.
    pub fn submit_offer(
        &self,
        contract_id: ContractId,
        supplier: PartyId,
        signature: &str,
        comment: Option<String>,
    ) -> Result<OfferId, LedgerError> {
        let certificate = self.resolve(PartyKind::Supplier, supplier)?;
        self.create_offer(contract_id, supplier, &certificate, signature, comment)
    }

    /// Like `accept_offer`, on behalf of the contract's investor.
    pub fn accept(
        &self,
        contract_id: ContractId,
        offer_id: OfferId,
        signature: &str,
    ) -> Result<(), LedgerError> {
        let contract = self
            .store
            .contract(contract_id)?
            .ok_or(LedgerError::NotFound(Entity::Contract))?;
        let certificate = self.resolve(PartyKind::Investor, contract.investor)?;
        self.accept_offer(contract_id, offer_id, &certificate, signature)
    }

    pub fn contract(&self, id: ContractId) -> Result<Contract, LedgerError> {
        self.store
            .contract(id)?
            .ok_or(LedgerError::NotFound(Entity::Contract))
    }

    pub fn offer(&self, id: OfferId) -> Result<Offer, LedgerError> {
        self.store
            .offer(id)?
            .ok_or(LedgerError::NotFound(Entity::Offer))
    }

    pub fn offers_for(&self, id: ContractId) -> Result<Vec<Offer>, LedgerError> {
        self.contract(id)?;
        self.store.offers_for(id)
    }

    fn resolve(&self, kind: PartyKind, id: PartyId) -> Result<Certificate, LedgerError> {
        let identity = self.resolver.resolve(kind, id)?;
        Certificate::from_pem(&identity.certificate_pem).map_err(|error| {
            let reason = format!("certificate of {} is unusable: {}", identity.name, error);
            LedgerError::IdentityUnavailable(ResolveError::Unavailable(reason))
        })
    }

    /// The signature in canonical encoding when it verifies under a trusted
    /// certificate.
    fn check(
        &self,
        certificate: &Certificate,
        now: OffsetDateTime,
        message: &[u8],
        signature: &str,
    ) -> Option<String> {
        if let Some(root) = &self.trust_root {
            // the authority itself is never a party
            let trusted = !certificate.is_self_issued()
                && certificate != root
                && certificate.is_issued_by(root)
                && certificate.is_valid_at(now)
                && certificate.key_usage().contains(Usage::SignData);
            if !trusted {
                return None;
            }
        }
        if !certificate.verify(message, signature) {
            return None;
        }
        Signature::decode(signature).ok().map(|signature| signature.encode())
    }
}
