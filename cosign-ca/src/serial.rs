use std::{
    convert::TryInto,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use sled::Tree;
use super::CounterError;

/// Source of certificate serial numbers. Every call to `advance` returns a
/// number never returned before by the same counter, even when called
/// concurrently. The first number is 1.
pub trait SerialCounter {
    /// Last number handed out, 0 for a fresh counter.
    fn current(&self) -> Result<u64, CounterError>;

    /// The new value is durable before it is returned.
    fn advance(&self) -> Result<u64, CounterError>;
}

impl<C> SerialCounter for Arc<C>
where
    C: SerialCounter,
{
    fn current(&self) -> Result<u64, CounterError> {
        C::current(self)
    }

    fn advance(&self) -> Result<u64, CounterError> {
        C::advance(self)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCounter {
    value: AtomicU64,
}

impl MemoryCounter {
    pub fn starting_after(value: u64) -> Self {
        MemoryCounter {
            value: AtomicU64::new(value),
        }
    }
}

impl SerialCounter for MemoryCounter {
    fn current(&self) -> Result<u64, CounterError> {
        Ok(self.value.load(Ordering::Acquire))
    }

    fn advance(&self) -> Result<u64, CounterError> {
        self.value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| CounterError::Exhausted)
    }
}

/// Counter persisted in a sled tree, advanced by compare-and-swap and flushed
/// to disk before the serial number is used.
#[derive(Clone)]
pub struct SledCounter {
    tree: Tree,
}

impl SledCounter {
    const KEY: &'static [u8] = b"serial_number";

    pub fn new(tree: Tree) -> Self {
        SledCounter { tree }
    }

    fn decode(bytes: &[u8]) -> Result<u64, CounterError> {
        bytes
            .try_into()
            .map(u64::from_be_bytes)
            .map_err(|_| CounterError::Corrupted)
    }
}

impl SerialCounter for SledCounter {
    fn current(&self) -> Result<u64, CounterError> {
        match self.tree.get(Self::KEY)? {
            Some(bytes) => Self::decode(bytes.as_ref()),
            None => Ok(0),
        }
    }

    fn advance(&self) -> Result<u64, CounterError> {
        loop {
            let old = self.tree.get(Self::KEY)?;
            let value = match &old {
                Some(bytes) => Self::decode(bytes.as_ref())?,
                None => 0,
            };
            let next = value.checked_add(1).ok_or(CounterError::Exhausted)?;
            let new = next.to_be_bytes().to_vec();
            match self.tree.compare_and_swap(Self::KEY, old, Some(new))? {
                Ok(()) => {
                    self.tree.flush()?;
                    tracing::debug!(serial = next, "serial counter advanced");
                    return Ok(next);
                },
                // somebody else advanced it in between, read again
                Err(_) => continue,
            }
        }
    }
}
