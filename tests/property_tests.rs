//! Property-based tests using proptest.
//!
//! Tests the key invariants of the query model:
//! - Escaped placeholder values survive both substitution passes
//! - Escaped raw template text survives both passes
//! - Node hashes are deterministic across builders
//! - Equal-hash substitution leaves the root hash unchanged
//! - Path rewrites share every node off the edited path

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{join, select, source};
use proptest::prelude::*;
use query_model::template::{self, escape_placeholder_value, escape_raw_template_text};
use query_model::{ModelSpec, PlaceholderValue, SqlGenerator, graph};

/// Strategy: arbitrary printable text, braces included.
fn arb_text() -> impl Strategy<Value = String> {
    "[ -~]{0,40}"
}

/// Strategy: an identifier usable as a hole name.
fn arb_ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,10}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // ── Escaping ───────────────────────────────────────────────────

    #[test]
    fn prop_escape_is_identity_without_braces(s in "[^{}]{0,40}") {
        prop_assert_eq!(escape_placeholder_value(&s), s.clone());
        prop_assert_eq!(escape_raw_template_text(&s), s);
    }

    #[test]
    fn prop_placeholder_value_round_trip(value in arb_text(), name in arb_ident()) {
        let tmpl = format!("select {{{name}}} from {{{{src}}}}");
        let escaped = escape_placeholder_value(&value);
        let pass_one = template::substitute(&tmpl, |_| Some(escaped.as_str())).unwrap();
        let pass_two = template::substitute(&pass_one, |_| Some("t")).unwrap();
        prop_assert_eq!(pass_two, format!("select {value} from t"));
    }

    #[test]
    fn prop_raw_text_round_trip(raw in arb_text()) {
        let tmpl = format!("{} {{{{src}}}}", escape_raw_template_text(&raw));
        let pass_one = template::substitute(&tmpl, |_| None).unwrap();
        let pass_two = template::substitute(&pass_one, |_| Some("t")).unwrap();
        prop_assert_eq!(pass_two, format!("{raw} t"));
    }

    #[test]
    fn prop_generated_sql_contains_value_literally(value in arb_text()) {
        let n = select(&value, &source("t"));
        let sql = SqlGenerator::default().generate(&n).unwrap();
        prop_assert_eq!(&sql[0], &format!("select {value} from t"));
    }

    // ── Hashing ────────────────────────────────────────────────────

    #[test]
    fn prop_hash_deterministic(col in arb_text(), table in "[a-z]{1,12}") {
        let a = select(&col, &source(&table));
        let b = select(&col, &source(&table));
        prop_assert_eq!(a.hash(), b.hash());
        prop_assert_eq!(a.hash().len(), 32);
        prop_assert!(a.hash().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn prop_distinct_values_distinct_hashes(a in arb_text(), b in arb_text()) {
        prop_assume!(a != b);
        let src = source("t");
        let left = select(&a, &src);
        let right = select(&b, &src);
        prop_assert_ne!(left.hash(), right.hash());
    }

    #[test]
    fn prop_equal_hash_substitution(col in arb_text(), key in arb_ident()) {
        let root = join(&select(&col, &source("l")), &select("*", &source("r")), &key);
        let twin = select(&col, &source("l"));
        let new_root = graph::replace_non_start_node_in_graph(&root, &["left"], twin).unwrap();
        prop_assert_eq!(new_root.hash(), root.hash());
    }

    #[test]
    fn prop_int_and_text_placeholders_hash_alike(i in any::<i64>()) {
        // Hashing sees formatted placeholders, so `1` and `"1"` are the same node.
        let spec = ModelSpec::new("Lit", "select {v}").unwrap();
        let a = spec.builder().set_value("v", i).unwrap().instantiate().unwrap();
        let b = spec.builder().set_value("v", i.to_string()).unwrap().instantiate().unwrap();
        prop_assert_eq!(a.hash(), b.hash());
    }

    // ── Structural sharing ─────────────────────────────────────────

    #[test]
    fn prop_rewrite_shares_off_path_nodes(cols in prop::collection::vec(arb_text(), 1..6), depth in 0usize..5) {
        // A chain of selects over a source, joined with an untouched branch.
        let mut chain = source("base");
        for col in &cols {
            chain = select(col, &chain);
        }
        let other = select("*", &source("other"));
        let root = join(&chain, &other, "id");

        let depth = depth.min(cols.len() - 1);
        let mut path = vec!["left".to_string()];
        path.extend(std::iter::repeat_n("src".to_string(), depth));

        let new_root = graph::set(&root, &path[..], [("col", "changed")]).unwrap();
        prop_assert!(Arc::ptr_eq(new_root.reference("right").unwrap(), &other));

        // Below the edited node nothing was rebuilt.
        let mut below = path.clone();
        below.push("src".to_string());
        prop_assert!(Arc::ptr_eq(
            &graph::get_node(&new_root, &below[..]).unwrap(),
            &graph::get_node(&root, &below[..]).unwrap()
        ));

        // The old graph still reads the old value.
        let old = graph::get_node(&root, &path[..]).unwrap();
        prop_assert_eq!(old.placeholder("col"), Some(&PlaceholderValue::from(cols[cols.len() - 1 - depth].as_str())));
    }

    #[test]
    fn prop_update_all_is_idempotent(value in arb_text()) {
        let shared = source("t");
        let root = join(&select("a", &shared), &select("b", &shared), "k");
        let values = BTreeMap::from([("col".to_string(), PlaceholderValue::from(value.as_str()))]);
        let once = graph::update_placeholders_in_graph(&root, &values).unwrap();
        let twice = graph::update_placeholders_in_graph(&once, &values).unwrap();
        prop_assert!(Arc::ptr_eq(&once, &twice));
    }
}
