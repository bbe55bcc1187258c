//! Resource declarations loaded from a JSON file.
//!
//! ```json
//! {
//!   "resources": [
//!     { "name": "users", "unique": ["email"], "required": ["email"] },
//!     { "name": "posts", "auth": { "GET": ["^/$"] }, "disabled": ["remove"] },
//!     { "name": "tags", "skip_bumpup": true }
//!   ]
//! }
//! ```
//!
//! Every declared resource is backed by a [`MemoryModel`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use restkit_core::{AuthRules, MemoryModel};
use serde::Deserialize;

use crate::service::{Operation, RawServiceDefinition, ResourceRegistry, ServiceFactory};

/// Top-level manifest document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

/// One declared resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceSpec {
    pub name: String,
    /// Fields whose values must be unique across entities.
    pub unique: Vec<String>,
    /// Fields every write must carry.
    pub required: Vec<String>,
    /// Anonymous allow-list: HTTP method name to path patterns.
    pub auth: Option<BTreeMap<String, Vec<String>>>,
    pub workflow: Option<String>,
    pub skip_bumpup: bool,
    /// CRUD operations switched off for this resource.
    pub disabled: Vec<Operation>,
}

impl Manifest {
    /// Parses a manifest document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, an empty or repeated resource
    /// name, or a name that cannot appear as a path segment.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let manifest: Self = serde_json::from_str(raw).context("malformed resource manifest")?;
        let mut seen = HashSet::new();
        for spec in &manifest.resources {
            anyhow::ensure!(
                is_resource_name(&spec.name),
                "invalid resource name `{}`",
                spec.name
            );
            anyhow::ensure!(
                seen.insert(spec.name.as_str()),
                "resource `{}` declared twice",
                spec.name
            );
        }
        Ok(manifest)
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading resource manifest {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Registers every declared resource, in declaration order.
    #[must_use]
    pub fn into_registry(self) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        for spec in self.resources {
            let model = MemoryModel::new(spec.name.clone())
                .with_unique(spec.unique.iter().cloned())
                .with_required(spec.required.iter().cloned());
            registry.register(spec.name.clone(), Arc::new(model), ManifestFactory(spec));
        }
        registry
    }
}

fn is_resource_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Builds a resource's raw definition from its manifest entry.
///
/// Auth patterns are compiled here, so a bad pattern surfaces as a bootstrap
/// failure naming the resource.
#[derive(Debug, Clone)]
pub struct ManifestFactory(pub ResourceSpec);

#[async_trait]
impl ServiceFactory for ManifestFactory {
    async fn definition(&self) -> anyhow::Result<RawServiceDefinition> {
        let spec = &self.0;
        let mut raw = RawServiceDefinition::new();
        if let Some(auth) = &spec.auth {
            let rules = AuthRules::from_named(
                auth.iter().map(|(method, patterns)| (method.as_str(), patterns.as_slice())),
            )?;
            raw = raw.auth(rules);
        }
        if let Some(workflow) = &spec.workflow {
            raw = raw.workflow(workflow.clone());
        }
        if spec.skip_bumpup {
            raw = raw.skip_bumpup();
        }
        for op in &spec.disabled {
            raw = raw.disable(*op);
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use axum::http::Method;
    use restkit_core::StateMachines;

    use super::*;
    use crate::service::{bootstrap, BaseTemplate, BootstrapError, SlotKind, BUMPUP};

    const SAMPLE: &str = r#"{
        "resources": [
            { "name": "users", "unique": ["email"], "required": ["email"] },
            { "name": "posts", "auth": { "get": ["^/$"] }, "workflow": "model", "disabled": ["remove"] },
            { "name": "tags", "skip_bumpup": true }
        ]
    }"#;

    #[test]
    fn parses_sample() {
        let manifest = Manifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.resources.len(), 3);
        assert_eq!(manifest.resources[0].unique, vec!["email"]);
        assert_eq!(manifest.resources[1].disabled, vec![Operation::Remove]);
        assert!(manifest.resources[2].skip_bumpup);
    }

    #[test]
    fn rejects_bad_names_and_duplicates() {
        assert!(Manifest::from_json(r#"{"resources":[{"name":""}]}"#).is_err());
        assert!(Manifest::from_json(r#"{"resources":[{"name":"a/b"}]}"#).is_err());
        assert!(Manifest::from_json(r#"{"resources":[{"name":"a"},{"name":"a"}]}"#).is_err());
        assert!(Manifest::from_json(r#"{"resources":[{"name":"a","colour":1}]}"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.resources[0].name, "users");

        assert!(Manifest::load(Path::new("/definitely/not/here.json")).is_err());
    }

    #[tokio::test]
    async fn manifest_resources_bootstrap() {
        let registry = Manifest::from_json(SAMPLE).unwrap().into_registry();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["users", "posts", "tags"]);

        let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
        let services = bootstrap(&registry, &base).await.unwrap();

        let posts = services.descriptor("posts").unwrap();
        assert!(posts.auth().permits(&Method::GET, "/"));
        assert!(!posts.auth().permits(&Method::GET, "/1"));
        assert_eq!(posts.slot(Operation::Remove).kind(), SlotKind::Disabled);

        let tags = services.descriptor("tags").unwrap();
        assert!(!tags.transitions().contains(&Method::POST, BUMPUP));
        assert!(services.transition(&Method::POST, "users", BUMPUP).is_some());
    }

    #[tokio::test]
    async fn empty_workflow_and_auth_inherit_base() {
        let manifest =
            Manifest::from_json(r#"{"resources":[{"name":"posts","workflow":"","auth":{}}]}"#)
                .unwrap();
        let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
        let services = bootstrap(&manifest.into_registry(), &base).await.unwrap();

        let posts = services.descriptor("posts").unwrap();
        assert_eq!(posts.workflow(), base.workflow());
        assert!(!posts.auth().is_empty());
        assert!(posts.auth().permits(&Method::GET, "/p1"));
    }

    #[tokio::test]
    async fn bad_pattern_fails_bootstrap_naming_resource() {
        let manifest =
            Manifest::from_json(r#"{"resources":[{"name":"ok"},{"name":"bad","auth":{"GET":["("]}}]}"#)
                .unwrap();
        let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
        let err = bootstrap(&manifest.into_registry(), &base).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Factory { ref resource, .. } if resource == "bad"));
    }
}
