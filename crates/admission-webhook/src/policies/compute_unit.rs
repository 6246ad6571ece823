//! Assigns compute units to the containers of application pods.
//!
//! A pod opts in with the `<prefix>/app: "true"` annotation and names the
//! compute unit of each container with `<prefix>/computeunit/<container>`.
//! Containers without such an annotation are left alone, while an
//! annotation naming a container the pod does not have is rejected.
//!
//! When a [`ComputeUnitCatalog`] is configured, the resources of each unit
//! are written into the matching container. Without a catalog the policy
//! only validates the annotations.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Result};
use itertools::Itertools;
use json_patch::jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::admission_review::GroupVersionResource;
use crate::errors::PolicyError;
use crate::patch::Patch;
use crate::policy::Mutator;

pub const DEFAULT_ANNOTATION_PREFIX: &str = "aic.4paradigm.com";

const APP_ANNOTATION: &str = "app";
const APP_ANNOTATION_ENABLED: &str = "true";
const COMPUTE_UNIT_ANNOTATION: &str = "computeunit";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputeUnitError {
    #[error("unexpected compute-unit reference to unknown container(s): {}", .0.iter().join(", "))]
    UnexpectedReference(Vec<String>),

    #[error("container {container:?} requests unknown compute unit {compute_unit:?}")]
    UnknownComputeUnit {
        container: String,
        compute_unit: String,
    },
}

impl From<ComputeUnitError> for PolicyError {
    fn from(error: ComputeUnitError) -> Self {
        PolicyError::new(error.to_string())
    }
}

/// Resources granted by a compute unit. Quantities use the usual
/// Kubernetes notation (`"500m"`, `"1Gi"`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeUnit {
    #[serde(default)]
    pub limits: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub requests: BTreeMap<String, Quantity>,
}

/// Compute units known to the webhook, keyed by name.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ComputeUnitCatalog {
    units: BTreeMap<String, ComputeUnit>,
}

impl ComputeUnitCatalog {
    /// Reads a YAML document mapping compute unit names to their resources:
    ///
    /// ```yaml
    /// single-core:
    ///   limits: {cpu: "1", memory: 1Gi}
    ///   requests: {cpu: "1", memory: 1Gi}
    /// ```
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| anyhow!("cannot open compute units file {:?}: {}", path, e))?;
        let catalog: ComputeUnitCatalog = serde_yaml::from_reader(file)
            .map_err(|e| anyhow!("cannot parse compute units file {:?}: {}", path, e))?;

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&ComputeUnit> {
        self.units.get(name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

pub struct ComputeUnitPolicy {
    resource: GroupVersionResource,
    app_annotation: String,
    compute_unit_prefix: String,
    catalog: Option<ComputeUnitCatalog>,
}

impl ComputeUnitPolicy {
    pub fn new(annotation_prefix: &str, catalog: Option<ComputeUnitCatalog>) -> Self {
        let annotation_prefix = annotation_prefix.trim_end_matches('/');

        ComputeUnitPolicy {
            resource: GroupVersionResource::new("", "v1", "pods"),
            app_annotation: format!("{annotation_prefix}/{APP_ANNOTATION}"),
            compute_unit_prefix: format!("{annotation_prefix}/{COMPUTE_UNIT_ANNOTATION}/"),
            catalog,
        }
    }

    fn apply_compute_unit(
        &self,
        patch: &mut Patch,
        index: usize,
        container: &Container,
        compute_unit: &str,
    ) -> Result<(), ComputeUnitError> {
        // TODO: resolve compute units against the billing service once it
        // exposes an API, the static catalog stands in for it.
        let Some(catalog) = &self.catalog else {
            return Ok(());
        };
        let unit = catalog
            .get(compute_unit)
            .ok_or_else(|| ComputeUnitError::UnknownComputeUnit {
                container: container.name.clone(),
                compute_unit: compute_unit.to_owned(),
            })?;

        let resources = container.resources.as_ref();
        if resources.is_none() {
            patch.add(resources_pointer(index, &[]), json!({}));
        }

        let sections = [
            ("limits", &unit.limits, resources.and_then(|r| r.limits.as_ref())),
            ("requests", &unit.requests, resources.and_then(|r| r.requests.as_ref())),
        ];
        for (section, quantities, current) in sections {
            if quantities.is_empty() {
                continue;
            }
            if current.is_none() {
                patch.add(resources_pointer(index, &[section]), json!({}));
            }
            for (name, quantity) in quantities {
                patch.add(
                    resources_pointer(index, &[section, name.as_str()]),
                    Value::String(quantity.0.clone()),
                );
            }
        }

        Ok(())
    }
}

impl Mutator for ComputeUnitPolicy {
    type Object = Pod;

    fn resource(&self) -> &GroupVersionResource {
        &self.resource
    }

    fn mutate(&self, pod: &Pod, _resource: &GroupVersionResource) -> Result<Patch, PolicyError> {
        let Some(annotations) = pod.metadata.annotations.as_ref() else {
            return Ok(Patch::default());
        };
        if annotations.get(&self.app_annotation).map(String::as_str) != Some(APP_ANNOTATION_ENABLED)
        {
            return Ok(Patch::default());
        }

        // container name -> compute unit, entries are removed once claimed
        let mut claimed: BTreeMap<&str, &str> = annotations
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&self.compute_unit_prefix)
                    .map(|container| (container, value.as_str()))
            })
            .collect();

        let containers = pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default();

        let mut patch = Patch::new();
        for (index, container) in containers.iter().enumerate() {
            let Some(compute_unit) = claimed.remove(container.name.as_str()) else {
                continue;
            };
            debug!(
                container = container.name.as_str(),
                compute_unit, "container claims compute unit"
            );
            self.apply_compute_unit(&mut patch, index, container, compute_unit)?;
        }

        if !claimed.is_empty() {
            let unmatched = claimed.keys().map(|name| name.to_string()).collect();
            return Err(ComputeUnitError::UnexpectedReference(unmatched).into());
        }

        Ok(patch)
    }
}

fn resources_pointer(index: usize, tail: &[&str]) -> PointerBuf {
    let index = index.to_string();
    PointerBuf::from_tokens(
        ["spec", "containers", index.as_str(), "resources"]
            .into_iter()
            .chain(tail.iter().copied()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PREFIX: &str = "aic.4paradigm.com";

    fn pod(annotations: serde_json::Value, containers: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "notebook",
                "annotations": annotations,
            },
            "spec": {"containers": containers},
        }))
        .expect("valid pod")
    }

    fn catalog() -> ComputeUnitCatalog {
        serde_yaml::from_str(
            r#"
single-core:
  limits:
    cpu: "1"
    memory: 1Gi
  requests:
    cpu: "1"
    memory: 1Gi
gpu:
  limits:
    nvidia.com/gpu: "1"
"#,
        )
        .expect("valid catalog")
    }

    fn pods() -> GroupVersionResource {
        GroupVersionResource::new("", "v1", "pods")
    }

    #[rstest]
    #[case::no_annotations(json!({}))]
    #[case::app_disabled(json!({"aic.4paradigm.com/app": "false"}))]
    #[case::app_not_exactly_true(json!({"aic.4paradigm.com/app": "True"}))]
    #[case::other_prefix(json!({
        "example.com/app": "true",
        "aic.4paradigm.com/computeunit/ghost": "single-core",
    }))]
    fn pods_without_activation_are_ignored(#[case] annotations: serde_json::Value) {
        let policy = ComputeUnitPolicy::new(PREFIX, Some(catalog()));
        let pod = pod(annotations, json!([{"name": "a"}]));

        let patch = policy.mutate(&pod, &pods()).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn pod_without_annotation_map_is_ignored() {
        let policy = ComputeUnitPolicy::new(PREFIX, None);
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "bare"},
        }))
        .unwrap();

        assert!(policy.mutate(&pod, &pods()).unwrap().is_empty());
    }

    #[test]
    fn matching_container_is_accepted() {
        let policy = ComputeUnitPolicy::new(PREFIX, None);
        let pod = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/a": "single-core",
            }),
            json!([{"name": "a"}, {"name": "sidecar"}]),
        );

        let patch = policy.mutate(&pod, &pods()).unwrap();
        assert!(patch.is_empty(), "no catalog, nothing to patch");
    }

    #[test]
    fn reference_to_missing_container_is_rejected() {
        let policy = ComputeUnitPolicy::new(PREFIX, None);
        let pod = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/a": "single-core",
                "aic.4paradigm.com/computeunit/ghost": "single-core",
            }),
            json!([{"name": "a"}]),
        );

        let error = policy.mutate(&pod, &pods()).unwrap_err();
        assert_eq!(
            error.message(),
            "unexpected compute-unit reference to unknown container(s): ghost"
        );
    }

    #[test]
    fn unmatched_references_are_listed_in_order() {
        let policy = ComputeUnitPolicy::new(PREFIX, None);
        let pod = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/zeta": "single-core",
                "aic.4paradigm.com/computeunit/alpha": "single-core",
            }),
            json!([]),
        );

        let error = policy.mutate(&pod, &pods()).unwrap_err();
        assert!(error.message().ends_with("alpha, zeta"));
    }

    #[test]
    fn catalog_resources_are_patched_parent_first() {
        let policy = ComputeUnitPolicy::new(PREFIX, Some(catalog()));
        let pod = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/worker": "single-core",
            }),
            json!([{"name": "init"}, {"name": "worker"}]),
        );

        let patch = policy.mutate(&pod, &pods()).unwrap();
        let operations = serde_json::to_value(patch.operations()).unwrap();

        assert_eq!(
            operations,
            json!([
                {"op": "add", "path": "/spec/containers/1/resources", "value": {}},
                {"op": "add", "path": "/spec/containers/1/resources/limits", "value": {}},
                {"op": "add", "path": "/spec/containers/1/resources/limits/cpu", "value": "1"},
                {"op": "add", "path": "/spec/containers/1/resources/limits/memory", "value": "1Gi"},
                {"op": "add", "path": "/spec/containers/1/resources/requests", "value": {}},
                {"op": "add", "path": "/spec/containers/1/resources/requests/cpu", "value": "1"},
                {"op": "add", "path": "/spec/containers/1/resources/requests/memory", "value": "1Gi"},
            ])
        );
    }

    #[test]
    fn existing_resource_sections_are_reused() {
        let policy = ComputeUnitPolicy::new(PREFIX, Some(catalog()));
        let pod = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/trainer": "gpu",
            }),
            json!([{
                "name": "trainer",
                "resources": {"limits": {"cpu": "4"}}
            }]),
        );

        let mut document = serde_json::to_value(&pod).unwrap();
        let patch = policy.mutate(&pod, &pods()).unwrap();
        json_patch::patch(&mut document, &patch.into_json_patch()).unwrap();

        assert_eq!(
            document["spec"]["containers"][0]["resources"],
            json!({"limits": {"cpu": "4", "nvidia.com/gpu": "1"}})
        );
    }

    #[test]
    fn unknown_compute_unit_is_rejected_when_catalog_is_set() {
        let policy = ComputeUnitPolicy::new(PREFIX, Some(catalog()));
        let pod = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/a": "quantum",
            }),
            json!([{"name": "a"}]),
        );

        let error = policy.mutate(&pod, &pods()).unwrap_err();
        assert_eq!(
            error.message(),
            r#"container "a" requests unknown compute unit "quantum""#
        );
    }

    #[test]
    fn custom_prefix_with_trailing_slash() {
        let policy = ComputeUnitPolicy::new("example.com/", None);
        let pod = pod(
            json!({
                "example.com/app": "true",
                "example.com/computeunit/ghost": "single-core",
            }),
            json!([{"name": "a"}]),
        );

        assert!(policy.mutate(&pod, &pods()).is_err());
    }

    #[test]
    fn decisions_are_idempotent() {
        let policy = ComputeUnitPolicy::new(PREFIX, Some(catalog()));
        let accepted = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/a": "single-core",
            }),
            json!([{"name": "a"}]),
        );
        let rejected = pod(
            json!({
                "aic.4paradigm.com/app": "true",
                "aic.4paradigm.com/computeunit/ghost": "single-core",
            }),
            json!([{"name": "a"}]),
        );

        assert_eq!(
            policy.mutate(&accepted, &pods()).unwrap(),
            policy.mutate(&accepted, &pods()).unwrap()
        );
        assert_eq!(
            policy.mutate(&rejected, &pods()).unwrap_err(),
            policy.mutate(&rejected, &pods()).unwrap_err()
        );
    }

    #[test]
    fn read_catalog_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
half-core:
  requests:
    cpu: 500m
"#,
        )
        .unwrap();

        let catalog = ComputeUnitCatalog::read_from_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);

        let unit = catalog.get("half-core").unwrap();
        assert!(unit.limits.is_empty());
        assert_eq!(unit.requests["cpu"], Quantity("500m".to_owned()));
    }

    #[test]
    fn catalog_with_unknown_sections_is_refused() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"tiny:\n  storage: {disk: 1Gi}\n").unwrap();

        assert!(ComputeUnitCatalog::read_from_file(file.path()).is_err());
    }
}
