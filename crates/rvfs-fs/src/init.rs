//! Process-wide shared initialization gate.
//!
//! Some backends keep state that must be shared by every handle opened on
//! the same storage in this process (a commit lock, a revision cache). They
//! build that state in [`FsBackend::serialized_init`], which the gate runs
//! under one process-wide mutex so that no two such bodies ever overlap,
//! whatever backend type they belong to.
//!
//! Callers may set the gate up explicitly with [`initialize`] at process
//! start. If they do not, the first [`serialized_init`] call initializes it
//! on the fly. Two threads racing through that first call may each build a
//! gate; the loser's gate is dropped before it is used, so both still
//! serialize on the same mutex.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::backend::FsBackend;
use crate::error::{FsError, FsResult};

static GATE: RwLock<Option<Arc<Gate>>> = RwLock::new(None);

struct Gate {
    scope: Arc<SharedScope>,
    lock: Mutex<()>,
}

/// Keyed store of state shared across backend instances in one process.
///
/// Keys are chosen by backends and should be prefixed with the backend
/// type to stay clear of each other.
#[derive(Default)]
pub struct SharedScope {
    values: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl SharedScope {
    /// Look up `key`, returning `None` if absent or of another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()?.downcast::<T>().ok()
    }

    /// Return the value under `key`, building it with `make` if absent.
    ///
    /// Fails with [`FsError::Internal`] if the key already holds a value of
    /// another type.
    pub fn get_or_insert_with<T, F>(&self, key: &str, make: F) -> FsResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> FsResult<T>,
    {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = values.get(key) {
            return Arc::clone(existing)
                .downcast::<T>()
                .map_err(|_| FsError::Internal(format!("shared scope key '{key}' has another type")));
        }
        let value = Arc::new(make()?);
        values.insert(key.to_string(), Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
        Ok(value)
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Set up the gate. Does nothing if it already exists.
pub fn initialize() {
    let mut gate = GATE.write().unwrap_or_else(PoisonError::into_inner);
    if gate.is_none() {
        *gate = Some(Arc::new(Gate {
            scope: Arc::new(SharedScope::default()),
            lock: Mutex::new(()),
        }));
        debug!("shared initialization gate created");
    }
}

/// Drop the gate and everything in its scope. Handles that are still open
/// keep the state they already obtained.
pub fn teardown() {
    let mut gate = GATE.write().unwrap_or_else(PoisonError::into_inner);
    if gate.take().is_some() {
        debug!("shared initialization gate torn down");
    }
}

pub fn is_initialized() -> bool {
    GATE.read().unwrap_or_else(PoisonError::into_inner).is_some()
}

fn current() -> Arc<Gate> {
    if let Some(gate) = GATE.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Arc::clone(gate);
    }
    debug!("shared initialization gate used before initialize(); creating it now");
    initialize();
    let gate = GATE.read().unwrap_or_else(PoisonError::into_inner);
    match gate.as_ref() {
        Some(gate) => Arc::clone(gate),
        // A concurrent teardown won; hand out a private gate for this call.
        None => Arc::new(Gate {
            scope: Arc::new(SharedScope::default()),
            lock: Mutex::new(()),
        }),
    }
}

/// The shared scope, initializing the gate if needed.
pub fn shared_scope() -> Arc<SharedScope> {
    Arc::clone(&current().scope)
}

/// Run `backend`'s once-per-process setup while holding the gate's lock.
pub fn serialized_init(backend: &dyn FsBackend) -> FsResult<()> {
    let gate = current();
    let _guard = gate
        .lock
        .lock()
        .map_err(|_| FsError::Internal("shared initialization lock poisoned".into()))?;
    backend.serialized_init(&gate.scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn scope_builds_once_per_key() {
        let scope = SharedScope::default();
        let builds = AtomicUsize::new(0);
        let make = || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(42u32)
        };
        let a = scope.get_or_insert_with("k", make).unwrap();
        let b = scope
            .get_or_insert_with("k", || -> FsResult<u32> { unreachable!() })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(scope.get::<u32>("k").as_deref(), Some(&42));
    }

    #[test]
    fn scope_rejects_type_confusion() {
        let scope = SharedScope::default();
        scope.get_or_insert_with("k", || Ok(1u8)).unwrap();
        assert!(scope.get::<String>("k").is_none());
        assert!(matches!(
            scope.get_or_insert_with("k", || Ok(String::new())),
            Err(FsError::Internal(_))
        ));
        assert!(scope.remove("k"));
        assert!(scope.is_empty());
    }

    #[test]
    fn scope_build_failure_leaves_key_free() {
        let scope = SharedScope::default();
        let err = scope.get_or_insert_with::<u8, _>("k", || Err(FsError::Cancelled));
        assert!(matches!(err, Err(FsError::Cancelled)));
        assert!(scope.get::<u8>("k").is_none());
    }

    #[test]
    fn initialize_is_idempotent() {
        initialize();
        let first = shared_scope();
        initialize();
        assert!(is_initialized());
        assert!(Arc::ptr_eq(&first, &shared_scope()));
    }

    #[test]
    fn serialized_bodies_never_overlap() {
        struct Probe {
            inside: Arc<AtomicUsize>,
            max: Arc<AtomicUsize>,
        }

        impl Probe {
            fn enter(&self) {
                let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
                self.max.fetch_max(now, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(2));
                self.inside.fetch_sub(1, Ordering::SeqCst);
            }
        }

        let inside = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let probe = Probe {
                    inside: Arc::clone(&inside),
                    max: Arc::clone(&max),
                };
                thread::spawn(move || {
                    let gate = current();
                    let _guard = gate.lock.lock().unwrap();
                    probe.enter();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max.load(Ordering::SeqCst), 1);
    }
}
