use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::admission_review::{decode_resource, AdmissionRequest, GroupVersionResource};
use crate::errors::{self, AdmissionError, PolicyError};
use crate::patch::Patch;

/// A kind-specific decision function.
///
/// `mutate` must be a pure function of its inputs: no I/O, no shared
/// mutable state. Returning an empty [`Patch`] approves the object as-is,
/// returning a [`PolicyError`] rejects it.
pub trait Mutator: Send + Sync {
    /// Typed representation of the reviewed object.
    type Object: DeserializeOwned;

    /// The resource this mutator is registered for.
    fn resource(&self) -> &GroupVersionResource;

    fn mutate(
        &self,
        object: &Self::Object,
        resource: &GroupVersionResource,
    ) -> std::result::Result<Patch, PolicyError>;
}

/// Object safe view over a [`Mutator`], this is what the HTTP layer
/// dispatches to.
pub trait AdmissionPolicy: Send + Sync {
    fn admit(&self, request: &AdmissionRequest) -> errors::Result<Patch>;
}

impl<M: Mutator> AdmissionPolicy for M {
    fn admit(&self, request: &AdmissionRequest) -> errors::Result<Patch> {
        let expected = self.resource();

        // Filtering is up to the webhook registration on the API server side,
        // an unexpected resource is let through untouched.
        if &request.resource != expected {
            warn!(
                expected = %expected,
                actual = %request.resource,
                "unexpected resource, allowing the request without changes"
            );
            return Ok(Patch::default());
        }

        let object: M::Object =
            decode_resource(request, expected).map_err(|source| AdmissionError::ObjectDecode {
                resource: expected.clone(),
                source,
            })?;

        Ok(self.mutate(&object, &request.resource)?)
    }
}

/// The URL paths served by the webhook and the policy bound to each of
/// them. Built once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<dyn AdmissionPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P>(&mut self, path: &str, policy: P) -> Result<()>
    where
        P: AdmissionPolicy + 'static,
    {
        if !path.starts_with('/') {
            return Err(anyhow!("webhook path {path:?} must start with '/'"));
        }
        if self.policies.contains_key(path) {
            return Err(anyhow!("webhook path {path:?} is already registered"));
        }

        self.policies.insert(path.to_owned(), Arc::new(policy));
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Arc<dyn AdmissionPolicy>> {
        self.policies.get(path).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn AdmissionPolicy>)> {
        self.policies
            .iter()
            .map(|(path, policy)| (path.as_str(), policy))
    }
}
