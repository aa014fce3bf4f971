use super::engine::Engine;
use crate::error::{MlError, MlResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Marker every live engine carries. Cleared before teardown starts.
pub(crate) const SINGLE_MAGIC: u32 = 0xfeed_feed;

/// Opaque, process-unique identifier of an opened engine.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display, derive_more::From,
)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether this handle belongs to an engine that is open and not closing.
    pub fn is_live(self) -> bool {
        handles()
            .get(&self)
            .and_then(Weak::upgrade)
            .is_some_and(|engine| engine.is_valid())
    }
}

static HANDLES: Lazy<Mutex<HashMap<HandleId, Weak<Engine>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

// The table only holds weak references, so a poisoned guard is still consistent.
fn handles() -> std::sync::MutexGuard<'static, HashMap<HandleId, Weak<Engine>>> {
    HANDLES.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register(engine: &Arc<Engine>) {
    handles().insert(engine.id, Arc::downgrade(engine));
}

/// Clears the marker of `engine` and removes it from the table, atomically
/// with respect to other lookups. Only the first caller succeeds.
pub(crate) fn invalidate(engine: &Engine) -> MlResult<()> {
    let mut handles = handles();
    if !engine.clear_magic() {
        return Err(MlError::InvalidHandle);
    }
    handles.remove(&engine.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_unique_and_unknown_ones_are_dead() {
        let a = HandleId::next();
        let b = HandleId::next();
        assert_ne!(a, b);
        assert!(a.get() < b.get());
        assert!(!a.is_live());
        assert!(!HandleId::from(u64::MAX).is_live());
    }
}
