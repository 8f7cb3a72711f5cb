#![forbid(unsafe_code)]

mod error;
pub use self::error::{IssuanceError, CounterError, CertificateError};

mod usage;
pub use self::usage::{Usage, KeyUsage, UnknownUsage};

mod serial;
pub use self::serial::{SerialCounter, MemoryCounter, SledCounter};

mod certificate;
pub use self::certificate::{Certificate, verify_pem};

mod authority;
pub use self::authority::{AuthorityConfig, CertificateAuthority, Enrollment};
