//! Shared graph fixtures for integration tests.

use std::sync::{Arc, Once};

use query_model::{BuilderValue, Materialization, ModelSpec, QueryNode};

/// Route library logs to the test output; filter with `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A source table node.
#[allow(dead_code)]
pub fn source(table: &str) -> Arc<QueryNode> {
    let mut b = ModelSpec::new("Source", table).unwrap().builder();
    b.set_materialization(Materialization::Source).unwrap();
    b.instantiate().unwrap()
}

/// Freeze a node of a fresh spec with the given values.
#[allow(dead_code)]
pub fn node<I, K, V>(name: &str, template: &str, values: I) -> Arc<QueryNode>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<BuilderValue>,
{
    ModelSpec::new(name, template)
        .unwrap()
        .builder()
        .set_values(values)
        .unwrap()
        .instantiate()
        .unwrap()
}

/// `select {col} from {{src}}` over `src`.
#[allow(dead_code)]
pub fn select(col: &str, src: &Arc<QueryNode>) -> Arc<QueryNode> {
    ModelSpec::new("Select", "select {col} from {{src}}")
        .unwrap()
        .builder()
        .set_value("col", col)
        .unwrap()
        .set_value("src", src)
        .unwrap()
        .instantiate()
        .unwrap()
}

/// `select * from {{left}} join {{right}} using ({key})`.
#[allow(dead_code)]
pub fn join(left: &Arc<QueryNode>, right: &Arc<QueryNode>, key: &str) -> Arc<QueryNode> {
    ModelSpec::new("Join", "select * from {{left}} join {{right}} using ({key})")
        .unwrap()
        .builder()
        .set_value("left", left)
        .unwrap()
        .set_value("right", right)
        .unwrap()
        .set_value("key", key)
        .unwrap()
        .instantiate()
        .unwrap()
}
