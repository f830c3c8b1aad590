//! Subject-to-handler table, built once at startup.

use std::collections::HashMap;

use super::operation::Handler;

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// A command subject together with the handler that serves it.
#[derive(Clone)]
pub struct OperationDescriptor {
    pub subject: &'static str,
    pub handler: Handler,
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Errors raised while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate handler registered for subject {subject}")]
    DuplicateSubject { subject: String },
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Maps each command subject to exactly one handler.
///
/// Registration order is preserved so subjects are bound deterministically.
/// The registry is immutable once shared with the router.
#[derive(Default)]
pub struct OperationRegistry {
    handlers: HashMap<&'static str, Handler>,
    order: Vec<&'static str>,
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateSubject`] if the subject already has
    /// a handler; the existing handler is kept.
    pub fn register(&mut self, descriptor: OperationDescriptor) -> Result<(), RegistryError> {
        if self.handlers.contains_key(descriptor.subject) {
            return Err(RegistryError::DuplicateSubject {
                subject: descriptor.subject.to_string(),
            });
        }
        self.order.push(descriptor.subject);
        self.handlers.insert(descriptor.subject, descriptor.handler);
        Ok(())
    }

    /// Registers every descriptor, stopping at the first duplicate.
    ///
    /// # Errors
    ///
    /// See [`OperationRegistry::register`].
    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = OperationDescriptor>,
    ) -> Result<(), RegistryError> {
        descriptors.into_iter().try_for_each(|d| self.register(d))
    }

    #[must_use]
    pub fn lookup(&self, subject: &str) -> Option<Handler> {
        self.handlers.get(subject).cloned()
    }

    /// Registered subjects in registration order.
    #[must_use]
    pub fn subjects(&self) -> &[&'static str] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("subjects", &self.order)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::service::operation::{HandlerFuture, OperationResponse};

    fn descriptor(subject: &'static str, tag: &'static [u8]) -> OperationDescriptor {
        OperationDescriptor {
            subject,
            handler: Arc::new(move |_payload: Bytes| -> HandlerFuture {
                Box::pin(async move { Ok(OperationResponse::with_data(tag.to_vec())) })
            }),
        }
    }

    #[tokio::test]
    async fn lookup_returns_registered_handler() {
        let mut registry = OperationRegistry::new();
        registry.register(descriptor("cent.a", b"a")).unwrap();
        registry.register(descriptor("cent.b", b"b")).unwrap();

        let handler = registry.lookup("cent.b").unwrap();
        let resp = handler(Bytes::new()).await.unwrap();
        assert_eq!(resp.data.as_deref(), Some(&b"b"[..]));
        assert!(registry.lookup("cent.c").is_none());
    }

    #[test]
    fn duplicate_subject_is_rejected() {
        let mut registry = OperationRegistry::new();
        registry.register(descriptor("cent.a", b"first")).unwrap();

        let err = registry.register(descriptor("cent.a", b"second")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateSubject {
                subject: "cent.a".to_string()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn subjects_keep_registration_order() {
        let mut registry = OperationRegistry::new();
        registry
            .register_all([
                descriptor("cent.z", b""),
                descriptor("cent.a", b""),
                descriptor("cent.m", b""),
            ])
            .unwrap();
        assert_eq!(registry.subjects(), &["cent.z", "cent.a", "cent.m"]);
        assert!(!registry.is_empty());
    }
}
