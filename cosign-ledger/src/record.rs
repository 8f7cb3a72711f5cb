use std::fmt;
use serde::{Serialize, Deserialize};
use time::OffsetDateTime;
use super::ContractBody;

macro_rules! id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian, keys sort like ids.
            pub fn key(&self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id!(ContractId);
id!(OfferId);
id!(PartyId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// No signature yet, offers may be pending.
    Draft,
    /// Both parties signed the same canonical body, terminal.
    Funded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    /// Empty until an offer is accepted.
    pub supplier: Option<PartyId>,
    pub investor: PartyId,
    pub stage: Stage,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub body: ContractBody,
    pub supplier_signature: Option<String>,
    pub investor_signature: Option<String>,
}

/// A supplier's signed commitment to one contract body, immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub contract: ContractId,
    pub supplier: PartyId,
    pub supplier_signature: String,
    /// The certificate the signature verified against when the offer was made.
    pub supplier_certificate: String,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}
