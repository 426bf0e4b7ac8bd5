//! Request-scoped context shared between handlers.
//!
//! Values live in namespaces (`"webpack"`, ...) under string keys. Writes
//! merge into a namespace; nothing replaces a namespace wholesale.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Type-erased context value.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Keyed values of one namespace.
#[derive(Clone, Default)]
pub struct ContextNamespace {
    values: HashMap<String, ContextValue>,
}

impl ContextNamespace {
    /// Untyped value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ContextNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_set().entries(keys).finish()
    }
}

/// Context of one request, shared by every handler that sees it.
///
/// Created empty by the dispatcher; handlers publish values for handlers
/// running after them.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Namespace name -> keyed values
    namespaces: HashMap<String, ContextNamespace>,
}

impl RequestContext {
    /// Merge entries into a namespace, creating it if needed.
    ///
    /// Keys already present in the namespace and not named in `entries` are
    /// kept.
    pub fn merge<I>(&mut self, namespace: &str, entries: I)
    where
        I: IntoIterator<Item = (String, ContextValue)>,
    {
        let ns = self.namespaces.entry(namespace.to_string()).or_default();
        ns.values.extend(entries);
    }

    /// Merge a single value into a namespace.
    pub fn insert<T: Any + Send + Sync>(&mut self, namespace: &str, key: &str, value: Arc<T>) {
        let value: ContextValue = value;
        self.merge(namespace, [(key.to_string(), value)]);
    }

    /// Typed lookup; `None` if the key is missing or holds another type.
    pub fn get<T: Any + Send + Sync>(&self, namespace: &str, key: &str) -> Option<Arc<T>> {
        let value = self.namespaces.get(namespace)?.get(key)?;
        Arc::clone(value).downcast::<T>().ok()
    }

    pub fn namespace(&self, namespace: &str) -> Option<&ContextNamespace> {
        self.namespaces.get(namespace)
    }

    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|ns| ns.contains_key(key))
    }
}
