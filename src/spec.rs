//! Node specifications: the stateless template and declared hole names for
//! one kind of query node.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::builder::NodeBuilder;
use crate::error::{QueryModelError, Result};
use crate::template;
use crate::value::PlaceholderFormat;

/// Reference name filled in by the SQL generator with the node's own alias.
pub const RESERVED_ID: &str = "id";

/// Immutable description of one kind of query fragment.
///
/// Reference and placeholder names are derived once from the template at
/// construction time.
#[derive(Debug, PartialEq, Eq)]
pub struct ModelSpec {
    generic_name: String,
    template: String,
    reference_names: BTreeSet<String>,
    placeholder_names: BTreeSet<String>,
    placeholder_format: PlaceholderFormat,
}

impl ModelSpec {
    /// Build a spec whose placeholders are formatted with
    /// [`PlaceholderFormat::Escaped`].
    pub fn new(generic_name: &str, template: &str) -> Result<Arc<Self>> {
        Self::with_format(generic_name, template, PlaceholderFormat::default())
    }

    pub fn with_format(
        generic_name: &str,
        template: &str,
        placeholder_format: PlaceholderFormat,
    ) -> Result<Arc<Self>> {
        let definition_error = |err: QueryModelError| QueryModelError::SpecDefinition {
            spec: generic_name.to_string(),
            reason: err.to_string(),
        };

        let placeholder_names: BTreeSet<String> = template::field_names(template)
            .map_err(definition_error)?
            .into_iter()
            .collect();

        // Blank out placeholders so the pass-2 fields are exactly the references.
        let pass_one = template::substitute(template, |_| Some("")).map_err(definition_error)?;
        let reference_names: BTreeSet<String> = template::field_names(&pass_one)
            .map_err(definition_error)?
            .into_iter()
            .filter(|name| name != RESERVED_ID)
            .collect();

        let overlap: Vec<&str> = reference_names
            .intersection(&placeholder_names)
            .map(String::as_str)
            .collect();
        if !overlap.is_empty() {
            return Err(QueryModelError::SpecDefinition {
                spec: generic_name.to_string(),
                reason: format!(
                    "names used both as reference and placeholder: {}",
                    overlap.join(", ")
                ),
            });
        }

        Ok(Arc::new(ModelSpec {
            generic_name: generic_name.to_string(),
            template: template.to_string(),
            reference_names,
            placeholder_names,
            placeholder_format,
        }))
    }

    /// Start a builder for this spec.
    pub fn builder(self: &Arc<Self>) -> NodeBuilder {
        NodeBuilder::new(Arc::clone(self))
    }

    pub fn generic_name(&self) -> &str {
        &self.generic_name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn reference_names(&self) -> &BTreeSet<String> {
        &self.reference_names
    }

    pub fn placeholder_names(&self) -> &BTreeSet<String> {
        &self.placeholder_names
    }

    pub fn placeholder_format(&self) -> PlaceholderFormat {
        self.placeholder_format
    }

    /// Check that a set of reference and placeholder keys can freeze into a
    /// node of this spec.
    ///
    /// References may be a superset of the declared names, placeholders must
    /// match exactly. On failure the error lists the missing and unexpected
    /// keys.
    pub fn assert_complete<'a, R, P>(&self, references: R, placeholders: P) -> Result<()>
    where
        R: IntoIterator<Item = &'a String>,
        P: IntoIterator<Item = &'a String>,
    {
        let references: BTreeSet<&String> = references.into_iter().collect();
        let placeholders: BTreeSet<&String> = placeholders.into_iter().collect();

        let mut missing: Vec<String> = self
            .reference_names
            .iter()
            .filter(|name| !references.contains(name))
            .cloned()
            .collect();
        missing.extend(
            self.placeholder_names
                .iter()
                .filter(|name| !placeholders.contains(name))
                .cloned(),
        );
        let unexpected: Vec<String> = placeholders
            .iter()
            .filter(|name| !self.placeholder_names.contains(name.as_str()))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(QueryModelError::IncompleteBuilder {
            spec: self.generic_name.clone(),
            missing,
            unexpected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_names_derived_from_template() {
        let spec = ModelSpec::new("Select", "select {col} from {{src}} where {cond}").unwrap();
        assert_eq!(spec.placeholder_names(), &names(&["col", "cond"]));
        assert_eq!(spec.reference_names(), &names(&["src"]));
        assert_eq!(spec.generic_name(), "Select");
        assert_eq!(spec.template(), "select {col} from {{src}} where {cond}");
    }

    #[test]
    fn test_reserved_id_is_not_a_reference() {
        let spec = ModelSpec::new("Create", "create table {{id}} as select * from {{src}}").unwrap();
        assert_eq!(spec.reference_names(), &names(&["src"]));
    }

    #[test]
    fn test_raw_braces_are_not_holes() {
        let spec = ModelSpec::new("Json", "select '{{{{\"a\": 1}}}}'::json from {{src}}").unwrap();
        assert!(spec.placeholder_names().is_empty());
        assert_eq!(spec.reference_names(), &names(&["src"]));
    }

    #[test]
    fn test_template_without_holes() {
        let spec = ModelSpec::new("Source", "public.events").unwrap();
        assert!(spec.placeholder_names().is_empty());
        assert!(spec.reference_names().is_empty());
    }

    #[test]
    fn test_overlapping_names_rejected() {
        let err = ModelSpec::new("Bad", "select {x} from {{x}}").unwrap_err();
        match err {
            QueryModelError::SpecDefinition { spec, reason } => {
                assert_eq!(spec, "Bad");
                assert!(reason.contains('x'), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_template_rejected() {
        let err = ModelSpec::new("Broken", "select {x").unwrap_err();
        assert!(matches!(err, QueryModelError::SpecDefinition { .. }));
        assert!(ModelSpec::new("Broken", "select }{{src}}").is_err());
    }

    #[test]
    fn test_default_format_is_escaped() {
        let spec = ModelSpec::new("S", "select 1").unwrap();
        assert_eq!(spec.placeholder_format(), PlaceholderFormat::Escaped);
        let spec = ModelSpec::with_format("S", "select 1", PlaceholderFormat::SqlLiteral).unwrap();
        assert_eq!(spec.placeholder_format(), PlaceholderFormat::SqlLiteral);
    }

    // ── assert_complete ─────────────────────────────────────────────

    #[test]
    fn test_assert_complete_exact() {
        let spec = ModelSpec::new("S", "select {col} from {{src}}").unwrap();
        spec.assert_complete(&names(&["src"]), &names(&["col"])).unwrap();
    }

    #[test]
    fn test_assert_complete_allows_extra_references() {
        let spec = ModelSpec::new("S", "select {col} from {{src}}").unwrap();
        spec.assert_complete(&names(&["src", "other"]), &names(&["col"]))
            .unwrap();
    }

    #[test]
    fn test_assert_complete_missing_reference() {
        let spec = ModelSpec::new("S", "select {col} from {{src}}").unwrap();
        let err = spec
            .assert_complete(&names(&[]), &names(&["col"]))
            .unwrap_err();
        assert_eq!(
            err,
            QueryModelError::IncompleteBuilder {
                spec: "S".into(),
                missing: vec!["src".into()],
                unexpected: vec![],
            }
        );
    }

    #[test]
    fn test_assert_complete_placeholder_subset_and_superset() {
        let spec = ModelSpec::new("S", "select {a}, {b} from {{src}}").unwrap();
        let subset = spec.assert_complete(&names(&["src"]), &names(&["a"]));
        assert!(matches!(
            subset,
            Err(QueryModelError::IncompleteBuilder { ref missing, .. }) if missing == &vec!["b".to_string()]
        ));
        let superset = spec.assert_complete(&names(&["src"]), &names(&["a", "b", "c"]));
        assert!(matches!(
            superset,
            Err(QueryModelError::IncompleteBuilder { ref unexpected, .. }) if unexpected == &vec!["c".to_string()]
        ));
    }
}
