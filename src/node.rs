//! Immutable, content-addressed query nodes.
//!
//! A [`QueryNode`] is one SQL fragment with all of its inputs resolved:
//! placeholder values and references to other, already frozen nodes. Nodes
//! are always handled through `Arc<QueryNode>` and never mutate after
//! construction; every `copy_*` method returns a new node (or the same one
//! when nothing changes), so a graph can be shared freely between owners
//! and threads.
//!
//! # Identity
//!
//! The node hash is a digest over the spec's generic name and template, the
//! *formatted* placeholder values, the materialization, the optional
//! materialization name and the hashes of all referenced nodes. Two nodes
//! with the same hash render to the same SQL and are interchangeable.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

use crate::error::{QueryModelError, Result};
use crate::materialization::Materialization;
use crate::spec::ModelSpec;
use crate::value::{PlaceholderFormat, PlaceholderValue};

/// Ordered record that the node hash is computed over.
#[derive(Serialize)]
struct HashRecord<'a> {
    generic_name: &'a str,
    template: &'a str,
    placeholders: BTreeMap<&'a str, String>,
    materialization: &'static str,
    references: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    materialization_name: Option<&'a str>,
}

/// What decides node equality: the hash and the placeholder format.
/// Whole-graph traversals de-duplicate on this key.
pub type NodeKey = (String, PlaceholderFormat);

/// An immutable IR node.
#[derive(Debug)]
pub struct QueryNode {
    spec: Arc<ModelSpec>,
    placeholders: BTreeMap<String, PlaceholderValue>,
    references: BTreeMap<String, Arc<QueryNode>>,
    materialization: Materialization,
    materialization_name: Option<String>,
    hash: String,
}

/// Field overrides for [`QueryNode::copy_override`]. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct NodeOverride {
    pub spec: Option<Arc<ModelSpec>>,
    pub placeholders: Option<BTreeMap<String, PlaceholderValue>>,
    pub references: Option<BTreeMap<String, Arc<QueryNode>>>,
    pub materialization: Option<Materialization>,
    /// `Some(None)` explicitly clears the name.
    pub materialization_name: Option<Option<String>>,
}

impl QueryNode {
    /// Freeze a node, validating that every declared reference is present
    /// and that the placeholder keys match the spec exactly.
    pub fn new(
        spec: Arc<ModelSpec>,
        placeholders: BTreeMap<String, PlaceholderValue>,
        references: BTreeMap<String, Arc<QueryNode>>,
        materialization: Materialization,
        materialization_name: Option<String>,
    ) -> Result<Arc<QueryNode>> {
        spec.assert_complete(references.keys(), placeholders.keys())?;
        let hash = compute_hash(
            &spec,
            &placeholders,
            &references,
            materialization,
            materialization_name.as_deref(),
        );
        Ok(Arc::new(QueryNode {
            spec,
            placeholders,
            references,
            materialization,
            materialization_name,
            hash,
        }))
    }

    pub fn spec(&self) -> &Arc<ModelSpec> {
        &self.spec
    }

    pub fn generic_name(&self) -> &str {
        self.spec.generic_name()
    }

    /// The unresolved template.
    pub fn sql(&self) -> &str {
        self.spec.template()
    }

    /// Copy of the reference map; the referenced nodes themselves are shared.
    pub fn references(&self) -> BTreeMap<String, Arc<QueryNode>> {
        self.references.clone()
    }

    /// Borrowed view of the references, for traversal.
    pub fn reference_map(&self) -> &BTreeMap<String, Arc<QueryNode>> {
        &self.references
    }

    pub fn reference(&self, name: &str) -> Option<&Arc<QueryNode>> {
        self.references.get(name)
    }

    /// Deep copy of the placeholder values.
    pub fn placeholders(&self) -> BTreeMap<String, PlaceholderValue> {
        self.placeholders.clone()
    }

    pub fn placeholder(&self, name: &str) -> Option<&PlaceholderValue> {
        self.placeholders.get(name)
    }

    /// Placeholder values as pass-1 substitution text.
    pub fn placeholders_formatted(&self) -> BTreeMap<String, String> {
        let format = self.spec.placeholder_format();
        self.placeholders
            .iter()
            .map(|(name, value)| (name.clone(), format.format(value)))
            .collect()
    }

    pub fn materialization(&self) -> Materialization {
        self.materialization
    }

    pub fn materialization_name(&self) -> Option<&str> {
        self.materialization_name.as_deref()
    }

    /// 32 lower-case hex characters.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn placeholder_format(&self) -> PlaceholderFormat {
        self.spec.placeholder_format()
    }

    /// Borrowed [`NodeKey`].
    pub fn identity(&self) -> (&str, PlaceholderFormat) {
        (&self.hash, self.placeholder_format())
    }

    pub fn key(&self) -> NodeKey {
        (self.hash.clone(), self.placeholder_format())
    }

    // ── Copy operations ─────────────────────────────────────────────────

    /// New node with the given fields replaced.
    pub fn copy_override(&self, overrides: NodeOverride) -> Result<Arc<QueryNode>> {
        QueryNode::new(
            overrides.spec.unwrap_or_else(|| Arc::clone(&self.spec)),
            overrides
                .placeholders
                .unwrap_or_else(|| self.placeholders.clone()),
            overrides
                .references
                .unwrap_or_else(|| self.references.clone()),
            overrides.materialization.unwrap_or(self.materialization),
            overrides
                .materialization_name
                .unwrap_or_else(|| self.materialization_name.clone()),
        )
    }

    /// New node with updated placeholder values. Every key must already be a
    /// placeholder of this node.
    pub fn copy_set<I, K, V>(&self, new_placeholders: I) -> Result<Arc<QueryNode>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PlaceholderValue>,
    {
        let mut placeholders = self.placeholders.clone();
        for (name, value) in new_placeholders {
            let name = name.into();
            match placeholders.get_mut(&name) {
                Some(slot) => *slot = value.into(),
                None => {
                    return Err(QueryModelError::UnknownPlaceholder {
                        spec: self.generic_name().to_string(),
                        name,
                    });
                }
            }
        }
        self.copy_override(NodeOverride {
            placeholders: Some(placeholders),
            ..NodeOverride::default()
        })
    }

    /// New node with updated references. Every key must already be a
    /// reference of this node.
    pub fn copy_link<I, K>(&self, new_references: I) -> Result<Arc<QueryNode>>
    where
        I: IntoIterator<Item = (K, Arc<QueryNode>)>,
        K: Into<String>,
    {
        let mut references = self.references.clone();
        for (name, node) in new_references {
            let name = name.into();
            match references.get_mut(&name) {
                Some(slot) => *slot = node,
                None => {
                    return Err(QueryModelError::UnknownReference {
                        spec: self.generic_name().to_string(),
                        name,
                    });
                }
            }
        }
        self.copy_override(NodeOverride {
            references: Some(references),
            ..NodeOverride::default()
        })
    }

    /// Same node with another materialization; returns `self` if unchanged.
    pub fn copy_set_materialization(
        self: &Arc<Self>,
        materialization: Materialization,
    ) -> Result<Arc<QueryNode>> {
        if materialization == self.materialization {
            return Ok(Arc::clone(self));
        }
        self.copy_override(NodeOverride {
            materialization: Some(materialization),
            ..NodeOverride::default()
        })
    }

    /// Same node with another materialization name; returns `self` if
    /// unchanged.
    pub fn copy_set_materialization_name(
        self: &Arc<Self>,
        name: Option<String>,
    ) -> Result<Arc<QueryNode>> {
        if name == self.materialization_name {
            return Ok(Arc::clone(self));
        }
        self.copy_override(NodeOverride {
            materialization_name: Some(name),
            ..NodeOverride::default()
        })
    }
}

impl PartialEq for QueryNode {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.spec.placeholder_format() == other.spec.placeholder_format()
    }
}

impl Eq for QueryNode {}

impl std::hash::Hash for QueryNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.hash, state);
    }
}

fn compute_hash(
    spec: &ModelSpec,
    placeholders: &BTreeMap<String, PlaceholderValue>,
    references: &BTreeMap<String, Arc<QueryNode>>,
    materialization: Materialization,
    materialization_name: Option<&str>,
) -> String {
    let format = spec.placeholder_format();
    let record = HashRecord {
        generic_name: spec.generic_name(),
        template: spec.template(),
        placeholders: placeholders
            .iter()
            .map(|(name, value)| (name.as_str(), format.format(value)))
            .collect(),
        materialization: materialization.as_str(),
        references: references
            .iter()
            .map(|(name, node)| (name.as_str(), node.hash()))
            .collect(),
        materialization_name,
    };
    // Serializing plain strings and string maps cannot fail.
    let canonical = serde_json::to_string(&record).unwrap_or_default();
    format!("{:032x}", xxh3_128(canonical.as_bytes()))
}
