//! Mutable staging for query nodes.
//!
//! A [`NodeBuilder`] collects reference and placeholder values for one
//! [`ModelSpec`] and freezes them into an immutable [`QueryNode`]. Builders
//! remember every node they have produced, keyed by hash, so freezing the
//! same configuration twice hands back the identical `Arc`.
//!
//! Builders may reference other builders through a [`SharedBuilder`]; such
//! references are frozen by [`NodeBuilder::instantiate_recursively`]. Cycles
//! are possible between builders (never between frozen nodes) and are
//! reported as [`QueryModelError::CyclicBuilderReference`].
//!
//! Builders are single-threaded staging objects: confine one to the call
//! stack that builds it.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use crate::error::{QueryModelError, Result};
use crate::materialization::{IntoMaterialization, Materialization};
use crate::node::QueryNode;
use crate::spec::ModelSpec;
use crate::value::PlaceholderValue;

/// A builder that can be referenced by several other builders.
pub type SharedBuilder = Rc<RefCell<NodeBuilder>>;

/// Anything that can be handed to [`NodeBuilder::set_value`].
#[derive(Clone)]
pub enum BuilderValue {
    Placeholder(PlaceholderValue),
    Node(Arc<QueryNode>),
    Builder(SharedBuilder),
}

/// A reference slot: either already frozen or still a builder.
#[derive(Clone)]
pub enum ReferenceValue {
    Node(Arc<QueryNode>),
    Builder(SharedBuilder),
}

/// Builder-held references are printed by spec name only; following them
/// could loop through a builder cycle.
impl fmt::Debug for ReferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceValue::Node(node) => {
                write!(f, "Node({}:{})", node.generic_name(), node.hash())
            }
            ReferenceValue::Builder(builder) => match builder.try_borrow() {
                Ok(b) => write!(f, "Builder({})", b.spec.generic_name()),
                Err(_) => f.write_str("Builder(<in use>)"),
            },
        }
    }
}

impl fmt::Debug for BuilderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderValue::Placeholder(v) => write!(f, "Placeholder({v:?})"),
            BuilderValue::Node(n) => fmt::Debug::fmt(&ReferenceValue::Node(Arc::clone(n)), f),
            BuilderValue::Builder(b) => {
                fmt::Debug::fmt(&ReferenceValue::Builder(Rc::clone(b)), f)
            }
        }
    }
}

pub struct NodeBuilder {
    spec: Arc<ModelSpec>,
    references: BTreeMap<String, ReferenceValue>,
    placeholders: BTreeMap<String, PlaceholderValue>,
    materialization: Materialization,
    materialization_name: Option<String>,
    /// Every node this builder has frozen, by hash.
    instances: HashMap<String, Arc<QueryNode>>,
}

impl fmt::Debug for NodeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBuilder")
            .field("spec", &self.spec.generic_name())
            .field("references", &self.references)
            .field("placeholders", &self.placeholders)
            .field("materialization", &self.materialization)
            .field("materialization_name", &self.materialization_name)
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl NodeBuilder {
    pub fn new(spec: Arc<ModelSpec>) -> Self {
        NodeBuilder {
            spec,
            references: BTreeMap::new(),
            placeholders: BTreeMap::new(),
            materialization: Materialization::default(),
            materialization_name: None,
            instances: HashMap::new(),
        }
    }

    /// Wrap the builder so other builders can reference it.
    pub fn into_shared(self) -> SharedBuilder {
        Rc::new(RefCell::new(self))
    }

    pub fn spec(&self) -> &Arc<ModelSpec> {
        &self.spec
    }

    pub fn materialization(&self) -> Materialization {
        self.materialization
    }

    pub fn materialization_name(&self) -> Option<&str> {
        self.materialization_name.as_deref()
    }

    pub fn placeholder(&self, name: &str) -> Option<&PlaceholderValue> {
        self.placeholders.get(name)
    }

    pub fn reference(&self, name: &str) -> Option<&ReferenceValue> {
        self.references.get(name)
    }

    /// Assign one reference or placeholder.
    ///
    /// The name decides the slot: a declared reference takes a node or a
    /// builder, a declared placeholder takes a scalar value. Anything else is
    /// an error and leaves the builder unchanged.
    pub fn set_value(
        &mut self,
        name: impl Into<String>,
        value: impl Into<BuilderValue>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let value = value.into();

        if self.spec.reference_names().contains(&name) {
            let reference = match value {
                BuilderValue::Node(node) => ReferenceValue::Node(node),
                BuilderValue::Builder(builder) => ReferenceValue::Builder(builder),
                BuilderValue::Placeholder(v) => {
                    return Err(QueryModelError::TypeMismatch {
                        name,
                        reason: format!("reference expects a node or builder, got value `{v}`"),
                    });
                }
            };
            self.references.insert(name, reference);
        } else if self.spec.placeholder_names().contains(&name) {
            let BuilderValue::Placeholder(v) = value else {
                return Err(QueryModelError::TypeMismatch {
                    name,
                    reason: "placeholder expects a scalar value, got a node".to_string(),
                });
            };
            self.placeholders.insert(name, v);
        } else {
            return Err(QueryModelError::UnknownParameter {
                spec: self.spec.generic_name().to_string(),
                name,
            });
        }
        Ok(self)
    }

    /// Assign several references and placeholders; stops at the first error.
    pub fn set_values<I, K, V>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<BuilderValue>,
    {
        for (name, value) in values {
            self.set_value(name, value)?;
        }
        Ok(self)
    }

    pub fn set_materialization(
        &mut self,
        materialization: impl IntoMaterialization,
    ) -> Result<&mut Self> {
        self.materialization = materialization.into_materialization()?;
        Ok(self)
    }

    pub fn set_materialization_name(&mut self, name: Option<String>) -> &mut Self {
        self.materialization_name = name;
        self
    }

    /// Freeze the current state.
    ///
    /// Every reference must already be a frozen node. Returns the node this
    /// builder produced earlier if one with the same hash exists.
    pub fn instantiate(&mut self) -> Result<Arc<QueryNode>> {
        self.spec
            .assert_complete(self.references.keys(), self.placeholders.keys())?;

        let mut references = BTreeMap::new();
        for (name, value) in &self.references {
            match value {
                ReferenceValue::Node(node) => {
                    references.insert(name.clone(), Arc::clone(node));
                }
                ReferenceValue::Builder(_) => {
                    return Err(QueryModelError::TypeMismatch {
                        name: name.clone(),
                        reason: "reference is an unfrozen builder; use instantiate_recursively"
                            .to_string(),
                    });
                }
            }
        }

        let candidate = QueryNode::new(
            Arc::clone(&self.spec),
            self.placeholders.clone(),
            references,
            self.materialization,
            self.materialization_name.clone(),
        )?;

        if let Some(existing) = self.instances.get(candidate.hash()) {
            trace!(
                spec = self.spec.generic_name(),
                hash = candidate.hash(),
                "reusing frozen node"
            );
            return Ok(Arc::clone(existing));
        }
        trace!(
            spec = self.spec.generic_name(),
            hash = candidate.hash(),
            "froze new node"
        );
        self.instances
            .insert(candidate.hash().to_string(), Arc::clone(&candidate));
        Ok(candidate)
    }

    /// Freeze every referenced builder depth-first, then this one.
    ///
    /// Referenced builders are replaced by their frozen node in this builder,
    /// and they keep their own frozen state: a builder shared by several
    /// parents is frozen once and reused afterwards.
    pub fn instantiate_recursively(&mut self) -> Result<Arc<QueryNode>> {
        let mut stack = Vec::new();
        self.instantiate_on_stack(&mut stack)
    }

    fn instantiate_on_stack(
        &mut self,
        stack: &mut Vec<(*const NodeBuilder, String)>,
    ) -> Result<Arc<QueryNode>> {
        stack.push((self as *const NodeBuilder, self.spec.generic_name().to_string()));

        let pending: Vec<(String, SharedBuilder)> = self
            .references
            .iter()
            .filter_map(|(name, value)| match value {
                ReferenceValue::Builder(b) => Some((name.clone(), Rc::clone(b))),
                ReferenceValue::Node(_) => None,
            })
            .collect();

        for (name, child) in pending {
            let child_ptr = child.as_ptr() as *const NodeBuilder;
            if let Some(pos) = stack.iter().position(|(ptr, _)| *ptr == child_ptr) {
                let mut chain: Vec<String> = stack[pos..].iter().map(|(_, n)| n.clone()).collect();
                chain.push(stack[pos].1.clone());
                return Err(QueryModelError::CyclicBuilderReference(chain));
            }
            let Ok(mut child_builder) = child.try_borrow_mut() else {
                let mut chain: Vec<String> = stack.iter().map(|(_, n)| n.clone()).collect();
                chain.push(name);
                return Err(QueryModelError::CyclicBuilderReference(chain));
            };
            let node = child_builder.instantiate_on_stack(stack)?;
            drop(child_builder);
            self.references.insert(name, ReferenceValue::Node(node));
        }

        stack.pop();
        self.instantiate()
    }
}

impl From<PlaceholderValue> for BuilderValue {
    fn from(v: PlaceholderValue) -> Self {
        BuilderValue::Placeholder(v)
    }
}

impl From<Arc<QueryNode>> for BuilderValue {
    fn from(node: Arc<QueryNode>) -> Self {
        BuilderValue::Node(node)
    }
}

impl From<&Arc<QueryNode>> for BuilderValue {
    fn from(node: &Arc<QueryNode>) -> Self {
        BuilderValue::Node(Arc::clone(node))
    }
}

impl From<SharedBuilder> for BuilderValue {
    fn from(builder: SharedBuilder) -> Self {
        BuilderValue::Builder(builder)
    }
}

impl From<&SharedBuilder> for BuilderValue {
    fn from(builder: &SharedBuilder) -> Self {
        BuilderValue::Builder(Rc::clone(builder))
    }
}

macro_rules! scalar_builder_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for BuilderValue {
                fn from(v: $ty) -> Self {
                    BuilderValue::Placeholder(PlaceholderValue::from(v))
                }
            }
        )*
    };
}

scalar_builder_value!(&str, String, i64, i32, f64, bool);
