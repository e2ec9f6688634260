//! Service-name → method dispatch table (spec §4.3).

use std::collections::HashMap;

use crate::descriptor::MethodDescriptor;

/// Split a Thrift message name into `(service, method)`.
///
/// Only the first `:` is significant; service name is `""` if none is
/// present. `"a:b:c"` splits to `("a", "b:c")`.
#[must_use]
pub fn split_envelope_name(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((service, method)) => (service, method),
        None => ("", name),
    }
}

/// Construction-time failure: two implementations registered under the
/// same service name both define a method with the same name.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("service {service:?} has two implementations defining method {method:?}")]
pub struct DuplicateMethod {
    /// Service name the collision occurred under (`""` for non-multiplexed).
    pub service: String,
    /// The colliding method name.
    pub method: String,
}

/// Service name → method name → (descriptor, handler), flattened from
/// possibly multiple implementations per service name at construction time.
pub struct DispatchTable<H> {
    resolved: HashMap<(String, String), (MethodDescriptor, H)>,
}

impl<H> DispatchTable<H> {
    /// Resolve `(service, method)` to its descriptor and handler.
    #[must_use]
    pub fn resolve(&self, service: &str, method: &str) -> Option<&(MethodDescriptor, H)> {
        self.resolved.get(&(service.to_string(), method.to_string()))
    }

    /// Resolve directly from a raw envelope name (spec §4.3 name parsing).
    #[must_use]
    pub fn resolve_envelope(&self, envelope_name: &str) -> Option<&(MethodDescriptor, H)> {
        let (service, method) = split_envelope_name(envelope_name);
        self.resolve(service, method)
    }

    /// Number of distinct (service, method) pairs registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Is the table empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Builds a [`DispatchTable`] from one or more implementations per service
/// name, rejecting method-name collisions within a service name.
pub struct DispatchTableBuilder<H> {
    entries: Vec<(String, Vec<(MethodDescriptor, H)>)>,
}

impl<H> Default for DispatchTableBuilder<H> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<H> DispatchTableBuilder<H> {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one implementation's methods under `service_name`.
    ///
    /// `service_name` is `""` for the non-multiplexed case. Calling this
    /// more than once with the same `service_name` merges the method lists
    /// — that's the "multiple implementations share one service name" case
    /// spec §3 describes.
    #[must_use]
    pub fn add_service(
        mut self,
        service_name: impl Into<String>,
        methods: Vec<(MethodDescriptor, H)>,
    ) -> Self {
        self.entries.push((service_name.into(), methods));
        self
    }

    /// Finish building, flattening all implementations into one
    /// (service, method) → (descriptor, handler) map.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateMethod`] if any two implementations sharing a
    /// service name both define the same method name.
    pub fn build(self) -> Result<DispatchTable<H>, DuplicateMethod> {
        let mut resolved = HashMap::new();
        for (service, methods) in self.entries {
            for (descriptor, handler) in methods {
                let key = (service.clone(), descriptor.name.to_string());
                if resolved.contains_key(&key) {
                    return Err(DuplicateMethod { service, method: descriptor.name.to_string() });
                }
                resolved.insert(key, (descriptor, handler));
            }
        }
        Ok(DispatchTable { resolved })
    }
}
