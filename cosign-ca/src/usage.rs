use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    SignData,
    SignCertificates,
    SignCrl,
}

impl Usage {
    const ALL: [Usage; 3] = [Usage::SignData, Usage::SignCertificates, Usage::SignCrl];

    fn bit(self) -> u8 {
        match self {
            Usage::SignData => 0b001,
            Usage::SignCertificates => 0b010,
            Usage::SignCrl => 0b100,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Usage::SignData => "sign-data",
            Usage::SignCertificates => "sign-certificates",
            Usage::SignCrl => "sign-crl",
        }
    }
}

/// Set of key usage flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyUsage {
    bits: u8,
}

impl KeyUsage {
    pub fn empty() -> Self {
        KeyUsage::default()
    }

    /// Identity of a contract party.
    pub fn party() -> Self {
        KeyUsage::empty().with(Usage::SignData)
    }

    /// Root of the authority.
    pub fn authority() -> Self {
        KeyUsage::empty()
            .with(Usage::SignData)
            .with(Usage::SignCertificates)
            .with(Usage::SignCrl)
    }

    pub fn with(self, usage: Usage) -> Self {
        KeyUsage {
            bits: self.bits | usage.bit(),
        }
    }

    pub fn contains(&self, usage: Usage) -> bool {
        self.bits & usage.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Usage> + '_ {
        Usage::ALL.iter().copied().filter(move |u| self.contains(*u))
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.iter().map(Usage::name).collect::<Vec<_>>();
        write!(f, "{}", names.join(","))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownUsage(pub String);

impl fmt::Display for UnknownUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown key usage: {:?}", self.0)
    }
}

impl std::error::Error for UnknownUsage {}

impl FromStr for KeyUsage {
    type Err = UnknownUsage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(KeyUsage::empty(), |acc, name| {
                Usage::ALL
                    .iter()
                    .find(|u| u.name() == name)
                    .map(|u| acc.with(*u))
                    .ok_or_else(|| UnknownUsage(name.to_string()))
            })
    }
}
