//! Name → module instance map.
//!
//! Entries are stored as `Arc<dyn Any>` and downcast on lookup, so any
//! module type can be registered and `get` hands back the very same `Arc`
//! that was stored. Registering an existing name replaces the old entry.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::ApiError;

type Entry = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.list())
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `module` under `name`, replacing any previous entry.
    pub fn insert<T: Any + Send + Sync>(&self, name: impl Into<String>, module: T) -> Arc<T> {
        let module = Arc::new(module);
        self.insert_arc(name, module.clone());
        module
    }

    pub fn insert_arc<T: Any + Send + Sync>(&self, name: impl Into<String>, module: Arc<T>) {
        let name = name.into();
        let replaced = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), module)
            .is_some();
        debug!(module = %name, replaced, "registered API module");
    }

    /// Look up a module by name.
    ///
    /// # Errors
    /// `ModuleNotFound` if nothing is registered under `name`, `ModuleType`
    /// if the entry is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ApiError> {
        let entry = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::ModuleNotFound(name.to_string()))?;
        entry.downcast::<T>().map_err(|_| ApiError::ModuleType {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Remove a module; returns whether anything was registered.
    pub fn remove(&self, name: &str) -> bool {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Billing(u32);

    #[test]
    fn get_returns_the_registered_instance() {
        let registry = ModuleRegistry::new();
        let stored = registry.insert("billing", Billing(1));
        let found = registry.get::<Billing>("billing").unwrap();
        assert!(Arc::ptr_eq(&stored, &found));
    }

    #[test]
    fn registering_twice_replaces_silently() {
        let registry = ModuleRegistry::new();
        registry.insert("billing", Billing(1));
        let second = registry.insert("billing", Billing(2));
        let found = registry.get::<Billing>("billing").unwrap();
        assert!(Arc::ptr_eq(&second, &found));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removed_module_is_not_found() {
        let registry = ModuleRegistry::new();
        registry.insert("billing", Billing(1));
        assert!(registry.has("billing"));
        assert!(registry.remove("billing"));
        assert!(!registry.remove("billing"));
        let err = registry.get::<Billing>("billing").unwrap_err();
        assert!(matches!(err, ApiError::ModuleNotFound(ref n) if n == "billing"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let registry = ModuleRegistry::new();
        registry.insert("billing", Billing(1));
        let err = registry.get::<String>("billing").unwrap_err();
        assert!(matches!(err, ApiError::ModuleType { .. }));
    }

    #[test]
    fn list_is_sorted_and_clear_empties() {
        let registry = ModuleRegistry::new();
        registry.insert("user", Billing(1));
        registry.insert("file", Billing(2));
        assert_eq!(registry.list(), vec!["file", "user"]);
        registry.clear();
        assert!(registry.is_empty());
    }
}
