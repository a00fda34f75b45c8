//! query_model: an immutable, content-addressed graph of SQL fragments.
//!
//! A [`ModelSpec`] names one kind of query step by its template, e.g.
//! `select {col} from {{src}}`. Single-brace holes are *placeholders*
//! (scalar values); double-brace holes are *references* to other nodes. A
//! [`NodeBuilder`] collects values for a spec and freezes them into a
//! [`QueryNode`], whose identity is the hash of its spec, values,
//! materialization and the hashes of the nodes it references.
//!
//! Nodes never change after freezing. The [`graph`] module rewrites a graph
//! by rebuilding only the path from the root to the edited node and sharing
//! everything else. [`SqlGenerator`] turns a finished graph into SQL
//! statements with CTEs in dependency order.
//!
//! # Example
//!
//! ```
//! use query_model::{Materialization, ModelSpec, SqlGenerator};
//!
//! let mut events = ModelSpec::new("Source", "public.events")?.builder();
//! events.set_materialization(Materialization::Source)?;
//! let events = events.instantiate()?;
//!
//! let count = ModelSpec::new("Count", "select count(*) from {{src}} where {cond}")?
//!     .builder()
//!     .set_value("src", &events)?
//!     .set_value("cond", "ts > now() - interval '1 day'")?
//!     .instantiate()?;
//!
//! let statements = SqlGenerator::default().generate(&count)?;
//! assert_eq!(
//!     statements,
//!     ["select count(*) from public.events where ts > now() - interval '1 day'"]
//! );
//! # Ok::<(), query_model::QueryModelError>(())
//! ```

pub mod builder;
pub mod codegen;
pub mod config;
pub mod error;
pub mod graph;
pub mod materialization;
pub mod node;
pub mod spec;
pub mod template;
pub mod value;

pub use builder::{BuilderValue, NodeBuilder, ReferenceValue, SharedBuilder};
pub use codegen::SqlGenerator;
pub use config::GeneratorConfig;
pub use error::{QueryModelError, QueryModelErrorKind, Result};
pub use graph::RefPath;
pub use materialization::{IntoMaterialization, Materialization};
pub use node::{NodeKey, NodeOverride, QueryNode};
pub use spec::{ModelSpec, RESERVED_ID};
pub use template::{escape_placeholder_value, escape_raw_template_text};
pub use value::{PlaceholderFormat, PlaceholderValue};
