//! The signed payload and its canonical encoding.
//!
//! Canonical form, one line with no terminator:
//!
//! ```text
//! contract-body:1;title=<n>:<title>;description=<n>:<description>;amount=<n>:<amount>;mustBeDone=<n>:<instant>;
//! ```
//!
//! Fields appear in this fixed order, `<n>` is the decimal byte length of the
//! UTF-8 value that follows, so a value may contain any character, delimiters
//! included, without ambiguity. `<amount>` is the shortest decimal form of the
//! integer, `<instant>` is `YYYY-MM-DDTHH:MM:SSZ` in UTC with a `.nnnnnnnnn`
//! fraction only when nanoseconds are non-zero.

use std::fmt::Write;
use serde::{Serialize, Deserialize};
use time::{OffsetDateTime, UtcOffset};
use super::LedgerError;

const VERSION_TAG: &str = "contract-body:1;";

/// Immutable once an offer references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractBody {
    pub title: String,
    pub description: String,
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub must_be_done: OffsetDateTime,
}

impl ContractBody {
    /// Normalizes the deadline to UTC, whole seconds.
    pub fn new<T, D>(title: T, description: D, amount: i64, must_be_done: OffsetDateTime) -> Self
    where
        T: Into<String>,
        D: Into<String>,
    {
        let must_be_done = must_be_done.to_offset(UtcOffset::UTC);
        let must_be_done = must_be_done
            .replace_nanosecond(0)
            .unwrap_or(must_be_done);
        ContractBody {
            title: title.into(),
            description: description.into(),
            amount,
            must_be_done,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        let fail = |reason: &str| Err(LedgerError::Validation(reason.to_string()));

        if self.title.trim().is_empty() {
            return fail("title is empty");
        }
        if self.title.contains('\0') || self.description.contains('\0') {
            return fail("text contains NUL");
        }
        if self.amount <= 0 {
            return fail("amount must be positive");
        }
        if self.must_be_done.offset() != UtcOffset::UTC {
            return fail("deadline must be in UTC");
        }
        if self.must_be_done.nanosecond() != 0 {
            return fail("deadline must have whole seconds");
        }
        Ok(())
    }
}

/// The only input to signing and verification of a contract body.
pub fn canonicalize(body: &ContractBody) -> Vec<u8> {
    let mut out = String::from(VERSION_TAG);
    field(&mut out, "title", &body.title);
    field(&mut out, "description", &body.description);
    field(&mut out, "amount", &body.amount.to_string());
    field(&mut out, "mustBeDone", &instant(body.must_be_done));
    out.into_bytes()
}

fn field(out: &mut String, name: &str, value: &str) {
    // writing into a String cannot fail
    let _ = write!(out, "{}={}:{};", name, value.len(), value);
}

fn instant(value: OffsetDateTime) -> String {
    let value = value.to_offset(UtcOffset::UTC);
    let mut out = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        value.year(),
        u8::from(value.month()),
        value.day(),
        value.hour(),
        value.minute(),
        value.second(),
    );
    if value.nanosecond() != 0 {
        let _ = write!(out, ".{:09}", value.nanosecond());
    }
    out.push('Z');
    out
}
