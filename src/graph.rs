//! Graph operations over frozen query nodes.
//!
//! A graph is addressed from its root by a *reference path*: the sequence
//! of reference names to follow, an empty path meaning the root itself.
//! Rewrites never mutate a node. They rebuild the nodes on the path from the
//! root down to the edited node and share every other subtree, unchanged, by
//! `Arc`. Holders of the old root keep seeing the old graph.
//!
//! References form a DAG (a node can only reference nodes that already
//! exist), and shared upstream nodes are common, so whole-graph traversals
//! visit each distinct node once, keyed by hash and placeholder format.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{QueryModelError, Result};
use crate::materialization::{IntoMaterialization, Materialization};
use crate::node::{NodeKey, NodeOverride, QueryNode};
use crate::value::{PlaceholderFormat, PlaceholderValue};

/// Owned reference path, as used in traversal results.
pub type RefPath = Vec<String>;

fn owned_path<S: AsRef<str>>(path: &[S]) -> RefPath {
    path.iter().map(|s| s.as_ref().to_string()).collect()
}

/// Follow `path` from `root`.
pub fn get_node<S: AsRef<str>>(root: &Arc<QueryNode>, path: &[S]) -> Result<Arc<QueryNode>> {
    let mut current = root;
    for step in path {
        let step = step.as_ref();
        current = current
            .reference(step)
            .ok_or_else(|| QueryModelError::PathNotFound {
                path: owned_path(path),
                missing: step.to_string(),
                at: current.generic_name().to_string(),
            })?;
    }
    Ok(Arc::clone(current))
}

/// New root in which the node at `path` is `replacement`.
///
/// Only the ancestors on `path` are rebuilt, each through `copy_link` on a
/// reference it already has; all other nodes are shared with `root`. An
/// empty path replaces the root itself.
pub fn replace_non_start_node_in_graph<S: AsRef<str>>(
    root: &Arc<QueryNode>,
    path: &[S],
    replacement: Arc<QueryNode>,
) -> Result<Arc<QueryNode>> {
    let Some((last, parent_path)) = path.split_last() else {
        return Ok(replacement);
    };

    // Resolve the whole path first so a bad path fails before any rebuild.
    let mut ancestors: Vec<&Arc<QueryNode>> = Vec::with_capacity(path.len());
    let mut current = root;
    for step in parent_path {
        ancestors.push(current);
        current = current
            .reference(step.as_ref())
            .ok_or_else(|| QueryModelError::PathNotFound {
                path: owned_path(path),
                missing: step.as_ref().to_string(),
                at: current.generic_name().to_string(),
            })?;
    }
    ancestors.push(current);
    let Some(target) = current.reference(last.as_ref()) else {
        return Err(QueryModelError::PathNotFound {
            path: owned_path(path),
            missing: last.as_ref().to_string(),
            at: current.generic_name().to_string(),
        });
    };
    if Arc::ptr_eq(target, &replacement) {
        return Ok(Arc::clone(root));
    }

    let mut rebuilt = replacement;
    for (ancestor, step) in ancestors.iter().zip(path).rev() {
        rebuilt = ancestor.copy_link([(step.as_ref(), rebuilt)])?;
    }
    debug!(
        path = ?owned_path(path),
        old_root = root.hash(),
        new_root = rebuilt.hash(),
        "replaced node in graph"
    );
    Ok(rebuilt)
}

/// Apply `edit` to the node at `path` and relink the graph around the result.
fn edit_node<S, F>(root: &Arc<QueryNode>, path: &[S], edit: F) -> Result<Arc<QueryNode>>
where
    S: AsRef<str>,
    F: FnOnce(&Arc<QueryNode>) -> Result<Arc<QueryNode>>,
{
    if path.is_empty() {
        return edit(root);
    }
    let target = get_node(root, path)?;
    let edited = edit(&target)?;
    replace_non_start_node_in_graph(root, path, edited)
}

/// Update placeholder values of the node at `path`.
pub fn set<S, I, K, V>(root: &Arc<QueryNode>, path: &[S], placeholders: I) -> Result<Arc<QueryNode>>
where
    S: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PlaceholderValue>,
{
    edit_node(root, path, |node| node.copy_set(placeholders))
}

/// Update references of the node at `path`.
pub fn link<S, I, K>(root: &Arc<QueryNode>, path: &[S], references: I) -> Result<Arc<QueryNode>>
where
    S: AsRef<str>,
    I: IntoIterator<Item = (K, Arc<QueryNode>)>,
    K: Into<String>,
{
    edit_node(root, path, |node| node.copy_link(references))
}

/// Change the materialization of the node at `path`.
pub fn set_materialization<S: AsRef<str>>(
    root: &Arc<QueryNode>,
    path: &[S],
    materialization: impl IntoMaterialization,
) -> Result<Arc<QueryNode>> {
    let materialization: Materialization = materialization.into_materialization()?;
    edit_node(root, path, |node| node.copy_set_materialization(materialization))
}

/// Change the materialization name of the node at `path`.
pub fn set_materialization_name<S: AsRef<str>>(
    root: &Arc<QueryNode>,
    path: &[S],
    name: Option<String>,
) -> Result<Arc<QueryNode>> {
    edit_node(root, path, |node| node.copy_set_materialization_name(name))
}

// ── Whole-graph traversal ──────────────────────────────────────────────────

/// Every distinct node reachable from `root` (by [`NodeKey`]), references
/// before the nodes that use them. The root is last.
pub fn walk(root: &Arc<QueryNode>) -> Vec<Arc<QueryNode>> {
    fn visit(
        node: &Arc<QueryNode>,
        seen: &mut HashSet<NodeKey>,
        out: &mut Vec<Arc<QueryNode>>,
    ) {
        if !seen.insert(node.key()) {
            return;
        }
        for child in node.reference_map().values() {
            visit(child, seen, out);
        }
        out.push(Arc::clone(node));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(root, &mut seen, &mut out);
    out
}

/// Breadth-first walk yielding each distinct node once with its shortest
/// reference path; siblings are visited in reference-name order.
fn shortest_paths(root: &Arc<QueryNode>) -> Vec<(RefPath, Arc<QueryNode>)> {
    let mut seen: HashSet<(&str, PlaceholderFormat)> = HashSet::new();
    let mut queue: VecDeque<(RefPath, &Arc<QueryNode>)> = VecDeque::new();
    let mut out = Vec::new();

    seen.insert(root.identity());
    queue.push_back((Vec::new(), root));
    while let Some((path, node)) = queue.pop_front() {
        for (name, child) in node.reference_map() {
            if seen.insert(child.identity()) {
                let mut child_path = path.clone();
                child_path.push(name.clone());
                queue.push_back((child_path, child));
            }
        }
        out.push((path, Arc::clone(node)));
    }
    out
}

/// Shortest reference path from `root` to a node with the given hash.
pub fn find_node(root: &Arc<QueryNode>, hash: &str) -> Option<RefPath> {
    shortest_paths(root)
        .into_iter()
        .find(|(_, node)| node.hash() == hash)
        .map(|(path, _)| path)
}

/// All placeholder values in the graph:
/// `placeholder name -> reference path -> value`.
///
/// Each distinct node is reported once, under its shortest path.
pub fn get_all_placeholders(
    root: &Arc<QueryNode>,
) -> BTreeMap<String, BTreeMap<RefPath, PlaceholderValue>> {
    let mut result: BTreeMap<String, BTreeMap<RefPath, PlaceholderValue>> = BTreeMap::new();
    for (path, node) in shortest_paths(root) {
        for (name, value) in node.placeholders() {
            result.entry(name).or_default().insert(path.clone(), value);
        }
    }
    result
}

/// Set `values` on every node in the graph that declares a placeholder of
/// the same name.
///
/// The graph is rebuilt bottom-up; a shared node is rebuilt once and stays
/// shared. Nodes with nothing to change, directly or below, are returned as
/// the same `Arc`, even when an equal node elsewhere in the graph is a
/// different `Arc`. Nodes that hash alike but format placeholders
/// differently are rewritten separately.
pub fn update_placeholders_in_graph(
    root: &Arc<QueryNode>,
    values: &BTreeMap<String, PlaceholderValue>,
) -> Result<Arc<QueryNode>> {
    fn rewrite(
        node: &Arc<QueryNode>,
        values: &BTreeMap<String, PlaceholderValue>,
        memo: &mut HashMap<NodeKey, Option<Arc<QueryNode>>>,
    ) -> Result<Arc<QueryNode>> {
        // `None` records an unchanged node.
        if let Some(done) = memo.get(&node.key()) {
            return Ok(done.as_ref().map_or_else(|| Arc::clone(node), Arc::clone));
        }

        let mut references = node.references();
        let mut changed = false;
        for child in references.values_mut() {
            let rewritten = rewrite(child, values, memo)?;
            if !Arc::ptr_eq(&rewritten, child) {
                *child = rewritten;
                changed = true;
            }
        }

        let mut placeholders = node.placeholders();
        for (name, slot) in placeholders.iter_mut() {
            if let Some(value) = values.get(name)
                && *slot != *value
            {
                *slot = value.clone();
                changed = true;
            }
        }

        if !changed {
            memo.insert(node.key(), None);
            return Ok(Arc::clone(node));
        }
        let result = node.copy_override(NodeOverride {
            placeholders: Some(placeholders),
            references: Some(references),
            ..NodeOverride::default()
        })?;
        memo.insert(node.key(), Some(Arc::clone(&result)));
        Ok(result)
    }

    let mut memo = HashMap::new();
    let new_root = rewrite(root, values, &mut memo)?;
    debug!(
        names = ?values.keys().collect::<Vec<_>>(),
        old_root = root.hash(),
        new_root = new_root.hash(),
        "updated placeholders in graph"
    );
    Ok(new_root)
}

// ── Debug dump ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct NodeSummary<'a> {
    hash: &'a str,
    generic_name: &'a str,
    placeholder_format: PlaceholderFormat,
    materialization: Materialization,
    #[serde(skip_serializing_if = "Option::is_none")]
    materialization_name: Option<&'a str>,
    placeholders: BTreeMap<String, PlaceholderValue>,
    references: BTreeMap<&'a str, &'a str>,
}

/// JSON description of every distinct node, references first.
pub fn dump_graph(root: &Arc<QueryNode>) -> serde_json::Value {
    let nodes = walk(root);
    let summaries: Vec<serde_json::Value> = nodes
        .iter()
        .map(|node| {
            let summary = NodeSummary {
                hash: node.hash(),
                generic_name: node.generic_name(),
                placeholder_format: node.placeholder_format(),
                materialization: node.materialization(),
                materialization_name: node.materialization_name(),
                placeholders: node.placeholders(),
                references: node
                    .reference_map()
                    .iter()
                    .map(|(name, child)| (name.as_str(), child.hash()))
                    .collect(),
            };
            serde_json::to_value(summary).unwrap_or(serde_json::Value::Null)
        })
        .collect();
    serde_json::json!({
        "root": root.hash(),
        "nodes": summaries,
    })
}
