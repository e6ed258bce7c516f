//! The recipient service and its keyed instance registry, plus the
//! closed set of primary-only service variants.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::document::{MigrationKey, StateDocument};
use crate::service::context::RecipientContext;
use crate::service::instance::RecipientInstance;
use crate::store::StoreError;

/// Registered name of the recipient service.
pub const RECIPIENT_SERVICE_NAME: &str = "stream-migration-recipient";

/// A primary-only service hosting recipient migration instances.
///
/// The instance map is the only shared mutable structure across
/// instances; insert and remove each happen under a short-held critical
/// section and the workflow body runs outside it.
pub struct RecipientService {
    name: String,
    context: Arc<RecipientContext>,
    instances: Mutex<HashMap<MigrationKey, Arc<RecipientInstance>>>,
    current_term: AtomicI64,
}

impl RecipientService {
    pub fn new(context: Arc<RecipientContext>) -> Arc<Self> {
        Arc::new(Self {
            name: RECIPIENT_SERVICE_NAME.to_string(),
            context,
            instances: Mutex::new(HashMap::new()),
            current_term: AtomicI64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<RecipientContext> {
        &self.context
    }

    pub fn current_term(&self) -> i64 {
        self.current_term.load(AtomicOrdering::SeqCst)
    }

    pub(crate) fn set_term(&self, term: i64) {
        self.current_term.store(term, AtomicOrdering::SeqCst);
    }

    /// Return the live instance for `initial`'s key, or create one and
    /// schedule its workflow, bound to the service's current term.
    ///
    /// Atomic with respect to concurrent callers: two calls with the same
    /// key never yield two live instances.
    pub fn get_or_create(self: &Arc<Self>, initial: StateDocument) -> Arc<RecipientInstance> {
        self.get_or_create_for_term(initial, self.current_term())
    }

    pub(crate) fn get_or_create_for_term(
        self: &Arc<Self>,
        initial: StateDocument,
        term: i64,
    ) -> Arc<RecipientInstance> {
        let key = initial.key;
        let instance = {
            let mut instances = self.instances.lock().expect("instance registry poisoned");
            if let Some(existing) = instances.get(&key) {
                // Existing live instance wins; the rest of `initial` is
                // ignored.
                return existing.clone();
            }
            let instance = RecipientInstance::new(self.context.clone(), initial, term);
            instances.insert(key, instance.clone());
            instance
        };

        let service = self.clone();
        let running = instance.clone();
        tokio::spawn(async move {
            running.run().await;
            service.remove_terminated(key, &running);
        });
        instance
    }

    /// Drop the registration of a terminated instance. Identity-checked
    /// so a late removal never evicts a successor under the same key.
    /// The state document is never deleted on this path.
    fn remove_terminated(&self, key: MigrationKey, instance: &Arc<RecipientInstance>) {
        let mut instances = self.instances.lock().expect("instance registry poisoned");
        if let Some(current) = instances.get(&key) {
            if Arc::ptr_eq(current, instance) {
                instances.remove(&key);
                debug!(key = %key, "instance removed from registry");
            }
        }
    }

    pub fn lookup_instance(&self, key: MigrationKey) -> Option<Arc<RecipientInstance>> {
        self.instances
            .lock()
            .expect("instance registry poisoned")
            .get(&key)
            .cloned()
    }

    pub fn live_instances(&self) -> Vec<Arc<RecipientInstance>> {
        self.instances
            .lock()
            .expect("instance registry poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Signal every live instance to cancel and drop their registrations.
    /// Documents are untouched; the workflows wind down on their own.
    pub(crate) fn cancel_all(&self) {
        let drained: Vec<_> = {
            let mut instances = self.instances.lock().expect("instance registry poisoned");
            instances.drain().collect()
        };
        for (key, instance) in drained {
            debug!(key = %key, "cancelling instance on step-down");
            instance.cancel();
        }
    }

    /// Rebuild instances for every non-terminal durable document, bound
    /// to the new term.
    pub(crate) async fn resume_active(self: &Arc<Self>, term: i64) -> Result<(), StoreError> {
        let documents = self.context.store.load_active().await?;
        for doc in documents {
            info!(key = %doc.key, term, "resuming migration from durable document");
            self.get_or_create_for_term(doc, term);
        }
        Ok(())
    }
}

/// The closed set of primary-only service variants. Role transitions
/// dispatch over this tag instead of a virtual-dispatch hierarchy.
#[derive(Clone)]
pub enum Service {
    Recipient(Arc<RecipientService>),
}

impl Service {
    pub fn name(&self) -> &str {
        match self {
            Service::Recipient(service) => service.name(),
        }
    }

    pub fn as_recipient(&self) -> Option<&Arc<RecipientService>> {
        match self {
            Service::Recipient(service) => Some(service),
        }
    }

    pub(crate) async fn ensure_ready(&self) -> Result<(), StoreError> {
        match self {
            Service::Recipient(service) => service.context().store.ensure_ready().await,
        }
    }

    pub(crate) async fn step_up(&self, term: i64) -> Result<(), StoreError> {
        match self {
            Service::Recipient(service) => {
                service.set_term(term);
                service.resume_active(term).await
            }
        }
    }

    pub(crate) fn step_down(&self) {
        match self {
            Service::Recipient(service) => service.cancel_all(),
        }
    }
}
