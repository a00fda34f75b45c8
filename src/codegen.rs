//! SQL text generation from a finished query graph.
//!
//! Every node renders in two passes over its template: pass 1 inserts the
//! formatted placeholders, pass 2 inserts the SQL names of its references
//! and `id`, the node's own alias. How a reference is named depends on the
//! referenced node's materialization:
//!
//! - `source`: its rendered text, inlined.
//! - `cte` / `query`: its alias, defined in the statement's `WITH` clause.
//! - `view` / `table` / `temp_table`: its alias, created by an earlier
//!   statement of the script.
//! - `virtual_node`: not referenceable.
//!
//! Within one script every SQL name belongs to a single node. Two different
//! nodes given the same materialization name are rejected with
//! [`QueryModelError::DuplicateAlias`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::GeneratorConfig;
use crate::error::{QueryModelError, Result};
use crate::materialization::Materialization;
use crate::node::{NodeKey, QueryNode};
use crate::spec::RESERVED_ID;
use crate::template;
use crate::value::PlaceholderFormat;

/// Turns a root node into an ordered list of SQL statements.
#[derive(Debug, Clone, Default)]
pub struct SqlGenerator {
    config: GeneratorConfig,
}

/// Statements produced so far, the lasting nodes they create and the owner
/// of every SQL name handed out.
#[derive(Default)]
struct Script {
    statements: Vec<String>,
    emitted: HashSet<NodeKey>,
    aliases: HashMap<String, NodeKey>,
}

impl Script {
    fn claim_alias(&mut self, alias: &str, node: &QueryNode) -> Result<()> {
        match self.aliases.get(alias) {
            Some(owner) if (owner.0.as_str(), owner.1) != node.identity() => {
                Err(QueryModelError::DuplicateAlias {
                    alias: alias.to_string(),
                })
            }
            Some(_) => Ok(()),
            None => {
                self.aliases.insert(alias.to_string(), node.key());
                Ok(())
            }
        }
    }
}

impl SqlGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// SQL name of `node`: its materialization name, or the configured prefix
    /// followed by the start of its hash.
    ///
    /// Generated names of nodes with a non-default [`PlaceholderFormat`] end
    /// in the format's name, so nodes that differ only in formatting get
    /// different names.
    pub fn alias(&self, node: &QueryNode) -> String {
        if let Some(name) = node.materialization_name() {
            return name.to_string();
        }
        let hash = node.hash();
        let len = self.config.alias_hash_len.min(hash.len());
        match node.placeholder_format() {
            PlaceholderFormat::Escaped => format!("{}{}", self.config.alias_prefix, &hash[..len]),
            format => format!(
                "{}{}_{}",
                self.config.alias_prefix,
                &hash[..len],
                format.as_str()
            ),
        }
    }

    /// Text of `node` with all holes filled.
    pub fn render(&self, node: &QueryNode) -> Result<String> {
        let formatted = node.placeholders_formatted();
        let pass_one =
            template::substitute(node.sql(), |name| formatted.get(name).map(String::as_str))?;

        let mut names: BTreeMap<&str, String> = BTreeMap::new();
        for (name, child) in used_references(node) {
            names.insert(name, self.reference_text(node, name, child)?);
        }
        names.insert(RESERVED_ID, self.alias(node));

        template::substitute(&pass_one, |name| names.get(name).map(String::as_str))
    }

    fn reference_text(&self, referrer: &QueryNode, name: &str, child: &QueryNode) -> Result<String> {
        match child.materialization() {
            Materialization::Source => self.render(child),
            Materialization::VirtualNode => Err(QueryModelError::NotReferenceable {
                referrer: referrer.generic_name().to_string(),
                name: name.to_string(),
            }),
            _ => Ok(self.alias(child)),
        }
    }

    /// Statements that realize `root`, dependencies first.
    ///
    /// Each lasting node (view, table, temp table) becomes its own statement,
    /// emitted once even when referenced from several places.
    pub fn generate(&self, root: &Arc<QueryNode>) -> Result<Vec<String>> {
        let mut script = Script::default();
        self.emit(root, &mut script)?;
        debug!(
            root = root.hash(),
            statements = script.statements.len(),
            "generated SQL"
        );
        Ok(script.statements)
    }

    /// [`generate`](Self::generate) joined with the configured separator.
    pub fn generate_script(&self, root: &Arc<QueryNode>) -> Result<String> {
        Ok(self
            .generate(root)?
            .join(&self.config.statement_separator))
    }

    fn emit(&self, node: &Arc<QueryNode>, script: &mut Script) -> Result<()> {
        script.emitted.insert(node.key());
        let materialization = node.materialization();
        let alias = self.alias(node);
        if materialization.has_lasting_effect() {
            script.claim_alias(&alias, node)?;
        }

        let mut ctes: Vec<(String, String)> = Vec::new();
        let mut seen: HashSet<NodeKey> = HashSet::new();
        self.collect_ctes(node, &mut ctes, &mut seen, script)?;

        let body = match materialization {
            Materialization::VirtualNode => return Ok(()),
            Materialization::Source => format!("SELECT * FROM {}", self.render(node)?),
            _ => self.render(node)?,
        };
        let query = with_query(&ctes, &body);
        let statement = match materialization {
            Materialization::View => format!("CREATE VIEW {alias} AS\n{query}"),
            Materialization::Table => format!("CREATE TABLE {alias} AS\n{query}"),
            Materialization::TempTable => format!("CREATE TEMPORARY TABLE {alias} AS\n{query}"),
            _ => query,
        };
        trace!(node = node.generic_name(), %materialization, "emitting statement");
        script.statements.push(statement);
        Ok(())
    }

    /// Depth-first over the references of `node`, pushing each CTE after
    /// everything it references.
    fn collect_ctes(
        &self,
        node: &QueryNode,
        ctes: &mut Vec<(String, String)>,
        seen: &mut HashSet<NodeKey>,
        script: &mut Script,
    ) -> Result<()> {
        for (name, child) in used_references(node) {
            match child.materialization() {
                Materialization::VirtualNode => {
                    return Err(QueryModelError::NotReferenceable {
                        referrer: node.generic_name().to_string(),
                        name: name.to_string(),
                    });
                }
                m if m.has_lasting_effect() => {
                    if !script.emitted.contains(&child.key()) {
                        self.emit(child, script)?;
                    }
                }
                // Inlined, but whatever it references still has to exist.
                Materialization::Source => self.collect_ctes(child, ctes, seen, script)?,
                _ => {
                    if seen.insert(child.key()) {
                        self.collect_ctes(child, ctes, seen, script)?;
                        let alias = self.alias(child);
                        script.claim_alias(&alias, child)?;
                        ctes.push((alias, self.render(child)?));
                    }
                }
            }
        }
        Ok(())
    }
}

/// References the template of `node` actually uses.
fn used_references(node: &QueryNode) -> impl Iterator<Item = (&str, &Arc<QueryNode>)> {
    node.spec()
        .reference_names()
        .iter()
        .filter_map(move |name| node.reference(name).map(|child| (name.as_str(), child)))
}

fn with_query(ctes: &[(String, String)], body: &str) -> String {
    if ctes.is_empty() {
        return body.to_string();
    }
    let cte_defs: Vec<String> = ctes
        .iter()
        .map(|(name, sql)| format!("{name} AS (\n{sql}\n)"))
        .collect();
    format!("WITH {}\n{body}", cte_defs.join(",\n"))
}
