//! Producer identity → ack config store.
//!
//! The registry is the only coupling point between a producer task and the
//! (possibly many, possibly concurrent) contexts that later ack its
//! messages. Writes happen at producer startup and shutdown; every ack call
//! reads. Lookups clone the config out, so no lock is held while the
//! acknowledger talks to the buffer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use spool_buffer::BufferHandle;
use spool_core::{FailurePolicy, ProducerId};

use crate::ack::AckError;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<AckRegistry> = Arc::new(AckRegistry::new());
}

/// What the acknowledger needs to requeue on a producer's behalf.
#[derive(Clone)]
pub struct AckConfig {
    pub buffer: BufferHandle,
    pub on_failure: FailurePolicy,
}

impl fmt::Debug for AckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckConfig")
            .field("on_failure", &self.on_failure)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct AckRegistry {
    entries: RwLock<HashMap<ProducerId, AckConfig>>,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry for hosts that cannot hand a registry handle to
    /// their ack call sites.
    pub fn global() -> Arc<AckRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Stores `config` for `producer`, returning any config it replaced.
    pub fn register(&self, producer: ProducerId, config: AckConfig) -> Option<AckConfig> {
        self.entries.write().insert(producer, config)
    }

    /// Fetches the config registered for `producer`.
    ///
    /// A miss means an ack arrived before registration or after shutdown.
    pub fn lookup(&self, producer: &ProducerId) -> Result<AckConfig, AckError> {
        self.entries
            .read()
            .get(producer)
            .cloned()
            .ok_or_else(|| AckError::UnregisteredProducer(producer.clone()))
    }

    pub fn unregister(&self, producer: &ProducerId) -> Option<AckConfig> {
        self.entries.write().remove(producer)
    }

    pub fn contains(&self, producer: &ProducerId) -> bool {
        self.entries.read().contains_key(producer)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for AckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckRegistry")
            .field("producers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use spool_buffer::{Buffer, InMemoryBuffer, Item};
    use spool_core::{FailurePolicy, ProducerId};

    use super::{AckConfig, AckRegistry};
    use crate::ack::AckError;

    fn config(buffer: Arc<InMemoryBuffer>, on_failure: FailurePolicy) -> AckConfig {
        AckConfig { buffer, on_failure }
    }

    fn id(name: &str) -> ProducerId {
        ProducerId::new(name).expect("valid id")
    }

    #[test]
    fn lookup_before_register_is_a_lifecycle_error() {
        let registry = AckRegistry::new();
        let err = registry.lookup(&id("ghost")).expect_err("nothing registered");
        assert!(matches!(err, AckError::UnregisteredProducer(ref p) if p.as_str() == "ghost"));
    }

    #[test]
    fn second_registration_overwrites_first() {
        let registry = AckRegistry::new();
        let buffer = Arc::new(InMemoryBuffer::new());

        assert!(registry
            .register(id("ingest"), config(buffer.clone(), FailurePolicy::Discard))
            .is_none());
        let replaced = registry
            .register(id("ingest"), config(buffer, FailurePolicy::Requeue))
            .expect("prior config should be returned");

        assert_eq!(replaced.on_failure, FailurePolicy::Discard);
        assert_eq!(
            registry.lookup(&id("ingest")).expect("registered").on_failure,
            FailurePolicy::Requeue
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_entry() {
        let registry = AckRegistry::new();
        registry.register(
            id("ingest"),
            config(Arc::new(InMemoryBuffer::new()), FailurePolicy::Discard),
        );
        assert!(registry.contains(&id("ingest")));

        assert!(registry.unregister(&id("ingest")).is_some());
        assert!(registry.is_empty());
        assert!(registry.lookup(&id("ingest")).is_err());
    }

    #[test]
    fn lookup_shares_the_registered_buffer() {
        let registry = AckRegistry::new();
        let buffer = Arc::new(InMemoryBuffer::new());
        registry.register(id("ingest"), config(buffer.clone(), FailurePolicy::Requeue));

        let found = registry.lookup(&id("ingest")).expect("registered");
        found
            .buffer
            .push(vec![Item::from_static(b"x")])
            .expect("push should succeed");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn concurrent_readers_see_registered_config() {
        let registry = Arc::new(AckRegistry::new());
        registry.register(
            id("ingest"),
            config(Arc::new(InMemoryBuffer::new()), FailurePolicy::Requeue),
        );

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..500)
                        .filter(|_| registry.lookup(&id("ingest")).is_ok())
                        .count()
                })
            })
            .collect();

        for reader in readers {
            assert_eq!(reader.join().expect("reader should finish"), 500);
        }
    }

    #[test]
    fn global_registry_is_shared() {
        let name = id("global-registry-test");
        AckRegistry::global().register(
            name.clone(),
            config(Arc::new(InMemoryBuffer::new()), FailurePolicy::Discard),
        );
        assert!(AckRegistry::global().contains(&name));
        AckRegistry::global().unregister(&name);
        assert!(!AckRegistry::global().contains(&name));
    }
}
