//! Process-wide check registry.
//!
//! Registration is append-only: each check type is mapped both ways to the
//! next free byte id, in registration order. That id is what crosses the
//! wire, so the order must be identical on every node of a cluster; the
//! built-ins always come first and extensions must be registered before the
//! node joins.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::{CheckEmpty, CheckType, Checker, FileContains, FileExists, ProcessRunning};

struct Registry {
    by_type: HashMap<CheckType, Arc<dyn Checker>>,
    type_to_id: HashMap<CheckType, u8>,
    id_to_type: HashMap<u8, CheckType>,
    next_id: u8,
}

impl Registry {
    fn with_builtins() -> Self {
        let mut registry = Registry {
            by_type: HashMap::new(),
            type_to_id: HashMap::new(),
            id_to_type: HashMap::new(),
            next_id: 0,
        };

        // Registration order defines the wire ids, never reorder these.
        registry.add(Arc::new(FileExists));
        registry.add(Arc::new(FileContains::default()));
        registry.add(Arc::new(ProcessRunning));
        registry.add(Arc::new(CheckEmpty));
        registry
    }

    fn add(&mut self, checker: Arc<dyn Checker>) {
        let check_type = checker.check_type();

        // Re-registering a tag replaces the handler but keeps its id, so the
        // wire mapping stays append-only.
        if !self.type_to_id.contains_key(&check_type) {
            let id = self.next_id;
            self.next_id = self
                .next_id
                .checked_add(1)
                .expect("more than 255 registered check types");
            self.type_to_id.insert(check_type.clone(), id);
            self.id_to_type.insert(id, check_type.clone());
        }

        self.by_type.insert(check_type, checker);
    }
}

fn global() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::with_builtins()))
}

/// Register a checker. Must not be called after the local node has joined a
/// cluster: peers decode check types by registration order.
pub fn register(checker: Arc<dyn Checker>) {
    global().write().unwrap().add(checker);
}

/// Look up the checker handling the given check type.
pub fn lookup(check_type: &CheckType) -> Option<Arc<dyn Checker>> {
    global().read().unwrap().by_type.get(check_type).cloned()
}

pub(crate) fn type_id(check_type: &CheckType) -> Option<u8> {
    global().read().unwrap().type_to_id.get(check_type).copied()
}

pub(crate) fn type_for_id(id: u8) -> Option<CheckType> {
    global().read().unwrap().id_to_type.get(&id).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CheckError, Params, CHECK_FILE_CONTAINS, CHECK_FILE_EXISTS};

    struct NoopCheck(&'static str);

    #[async_trait::async_trait]
    impl Checker for NoopCheck {
        fn check_type(&self) -> CheckType {
            self.0.into()
        }

        async fn run(&self, _params: &Params) -> Result<(), CheckError> {
            Ok(())
        }
    }

    #[test]
    fn builtins_keep_registration_order() {
        assert_eq!(type_id(&CHECK_FILE_EXISTS.into()), Some(0));
        assert_eq!(type_id(&CHECK_FILE_CONTAINS.into()), Some(1));
        assert_eq!(type_for_id(0), Some(CHECK_FILE_EXISTS.into()));
    }

    #[test]
    fn extensions_get_the_next_id() {
        register(Arc::new(NoopCheck("noop_extension")));

        let id = type_id(&"noop_extension".into()).unwrap();
        assert!(id > 3, "extensions are assigned ids after the built-ins");
        assert_eq!(type_for_id(id), Some("noop_extension".into()));
        assert!(lookup(&"noop_extension".into()).is_some());
    }

    #[test]
    fn reregistration_keeps_the_id() {
        register(Arc::new(NoopCheck("noop_stable")));
        let first = type_id(&"noop_stable".into()).unwrap();

        register(Arc::new(NoopCheck("noop_stable")));
        assert_eq!(type_id(&"noop_stable".into()), Some(first));
    }
}
