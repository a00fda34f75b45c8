//! How a query node is ultimately realized in SQL.

use serde::{Deserialize, Serialize};

use crate::error::{QueryModelError, Result};

/// Materialization of a query node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// Fragment usable as a common table expression by other nodes.
    #[default]
    Cte,
    /// Standalone query; may also be used as a CTE.
    Query,
    View,
    Table,
    /// Session-scoped temporary table.
    TempTable,
    /// Pre-existing source table; the template is the table expression.
    Source,
    /// Placeholder node that emits nothing itself.
    VirtualNode,
}

impl Materialization {
    pub const ALL: [Materialization; 7] = [
        Materialization::Cte,
        Materialization::Query,
        Materialization::View,
        Materialization::Table,
        Materialization::TempTable,
        Materialization::Source,
        Materialization::VirtualNode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Materialization::Cte => "cte",
            Materialization::Query => "query",
            Materialization::View => "view",
            Materialization::Table => "table",
            Materialization::TempTable => "temp_table",
            Materialization::Source => "source",
            Materialization::VirtualNode => "virtual_node",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        Materialization::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| QueryModelError::UnknownMaterialization(s.to_string()))
    }

    /// Accept either a materialization or its name.
    pub fn normalize(value: impl IntoMaterialization) -> Result<Self> {
        value.into_materialization()
    }

    /// Whether the node forms a statement on its own.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Materialization::Query
                | Materialization::View
                | Materialization::Table
                | Materialization::TempTable
        )
    }

    /// Whether the node can be referenced as a sub-query.
    pub fn is_cte(&self) -> bool {
        matches!(self, Materialization::Cte | Materialization::Query)
    }

    /// Whether realizing the node leaves something behind in the database.
    pub fn has_lasting_effect(&self) -> bool {
        matches!(
            self,
            Materialization::View | Materialization::Table | Materialization::TempTable
        )
    }
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loose materialization input: the enum itself or a name.
pub trait IntoMaterialization {
    fn into_materialization(self) -> Result<Materialization>;
}

impl IntoMaterialization for Materialization {
    fn into_materialization(self) -> Result<Materialization> {
        Ok(self)
    }
}

impl IntoMaterialization for &str {
    fn into_materialization(self) -> Result<Materialization> {
        Materialization::from_str(self)
    }
}

impl IntoMaterialization for String {
    fn into_materialization(self) -> Result<Materialization> {
        Materialization::from_str(&self)
    }
}

impl IntoMaterialization for &String {
    fn into_materialization(self) -> Result<Materialization> {
        Materialization::from_str(self)
    }
}
