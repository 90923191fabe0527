//! SQL dialects and the capability contract every dialect implements.
//!
//! | Dialect  | Quote  | Unlimited limit        | Paginated joins       |
//! |----------|--------|------------------------|-----------------------|
//! | pg       | `"x"`  | `ALL`                  | `LATERAL`             |
//! | oracle   | `"x"`  | `18446744073709551615` | `APPLY`               |
//! | mariadb  | `` `x` `` | `18446744073709551615` | `UNION` of subselects |
//! | mysql8   | `` `x` `` | `18446744073709551615` | `UNION` of subselects |
//! | mysql    | `` `x` `` | n/a                  | unsupported           |
//! | sqlite3  | `"x"`  | n/a                    | unsupported           |
//!
//! Handlers return their own ordered list of SQL fragments; the assembler splices
//! them into the statement at the node's position in the tree.

pub mod lateral;
pub mod mariadb;
pub mod mysql;
pub mod mysql8;
pub mod oracle;
pub mod pg;
pub mod sqlite3;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::pagination::interpret::{Limit, Paging, PagingSettings};
use crate::pagination::ordering::Order;
use crate::plan::{BatchScope, Context, PlanNode, Scalar};

pub use mariadb::MariaDb;
pub use mysql::MySql;
pub use mysql8::MySql8;
pub use oracle::Oracle;
pub use pg::Postgres;
pub use sqlite3::Sqlite3;

/// Largest unsigned 64-bit integer, the "no limit" value of dialects without `LIMIT ALL`.
pub const MAX_UINT64: &str = "18446744073709551615";

/// Column carrying the window count of a paginated subselect.
pub const TOTAL_COLUMN: &str = "$total";

/// The five pagination techniques a dialect may render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Technique {
    Root,
    JoinedOneToMany,
    JoinedManyToMany,
    BatchedOneToMany,
    BatchedManyToMany,
}

impl Technique {
    pub const ALL: [Technique; 5] = [
        Technique::Root,
        Technique::JoinedOneToMany,
        Technique::JoinedManyToMany,
        Technique::BatchedOneToMany,
        Technique::BatchedManyToMany,
    ];
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Technique::Root => "root",
            Technique::JoinedOneToMany => "joined one-to-many",
            Technique::JoinedManyToMany => "joined many-to-many",
            Technique::BatchedOneToMany => "batched one-to-many",
            Technique::BatchedManyToMany => "batched many-to-many",
        };
        f.write_str(name)
    }
}

/// Everything a pagination handler needs about the node being rendered.
pub struct PaginationRequest<'a> {
    pub parent: Option<&'a PlanNode>,
    pub node: &'a PlanNode,
    pub context: &'a Context,
    pub settings: &'a PagingSettings,
}

/// The contract implemented by every SQL dialect.
///
/// Handlers a dialect cannot render keep the default body, which fails with
/// [`PlanError::UnsupportedPagination`] before producing any fragment.
#[async_trait]
pub trait DialectModule: Send + Sync {
    /// Identifier used in diagnostics and configuration.
    fn name(&self) -> &'static str;

    /// Wrap a bare identifier in the dialect's delimiters.
    fn quote(&self, identifier: &str) -> String;

    /// One scalar expression standing for a multi-column key.
    fn composite_key(&self, table: &str, columns: &[String]) -> String;

    /// LIMIT text meaning "no limit".
    fn unlimited_limit(&self) -> String {
        MAX_UINT64.to_string()
    }

    /// Render a scalar as a SQL literal.
    fn literal(&self, value: &Scalar) -> String {
        standard_literal(value)
    }

    /// Whether the handler for `technique` renders SQL on this dialect.
    fn supports(&self, _technique: Technique) -> bool {
        false
    }

    async fn handle_pagination_at_root(
        &self,
        _req: &PaginationRequest<'_>,
    ) -> PlanResult<Vec<String>> {
        Err(PlanError::unsupported(self.name(), Technique::Root))
    }

    async fn handle_joined_one_to_many_paginated(
        &self,
        _req: &PaginationRequest<'_>,
        _join_condition: &str,
    ) -> PlanResult<Vec<String>> {
        Err(PlanError::unsupported(self.name(), Technique::JoinedOneToMany))
    }

    async fn handle_joined_many_to_many_paginated(
        &self,
        _req: &PaginationRequest<'_>,
        _join_to_junction: &str,
        _join_to_child: &str,
    ) -> PlanResult<Vec<String>> {
        Err(PlanError::unsupported(self.name(), Technique::JoinedManyToMany))
    }

    async fn handle_batched_one_to_many_paginated(
        &self,
        _req: &PaginationRequest<'_>,
        _batch_scope: &BatchScope,
    ) -> PlanResult<Vec<String>> {
        Err(PlanError::unsupported(self.name(), Technique::BatchedOneToMany))
    }

    async fn handle_batched_many_to_many_paginated(
        &self,
        _req: &PaginationRequest<'_>,
        _batch_scope: &BatchScope,
        _join_to_child: &str,
    ) -> PlanResult<Vec<String>> {
        Err(PlanError::unsupported(self.name(), Technique::BatchedManyToMany))
    }
}

/// Literal rendering shared by all built-in dialects except for dates on oracle.
pub fn standard_literal(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::Integer(n) => n.to_string(),
        Scalar::String(s) => format!("'{}'", s.replace('\'', "''")),
        Scalar::Date(d) => format!("'{}'", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

/// Built-in dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    #[default]
    Pg,
    Mysql,
    Mysql8,
    Mariadb,
    Oracle,
    Sqlite3,
}

impl DialectName {
    pub const ALL: [DialectName; 6] = [
        DialectName::Pg,
        DialectName::Mysql,
        DialectName::Mysql8,
        DialectName::Mariadb,
        DialectName::Oracle,
        DialectName::Sqlite3,
    ];

    pub fn module(&self) -> Arc<dyn DialectModule> {
        match self {
            DialectName::Pg => Arc::new(Postgres),
            DialectName::Mysql => Arc::new(MySql),
            DialectName::Mysql8 => Arc::new(MySql8::default()),
            DialectName::Mariadb => Arc::new(MariaDb),
            DialectName::Oracle => Arc::new(Oracle::default()),
            DialectName::Sqlite3 => Arc::new(Sqlite3),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialectName::Pg => "pg",
            DialectName::Mysql => "mysql",
            DialectName::Mysql8 => "mysql8",
            DialectName::Mariadb => "mariadb",
            DialectName::Oracle => "oracle",
            DialectName::Sqlite3 => "sqlite3",
        }
    }
}

impl fmt::Display for DialectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectName {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DialectName::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                PlanError::Config(format!(
                    "unknown dialect '{}', expected one of pg, mysql, mysql8, mariadb, oracle, sqlite3",
                    s
                ))
            })
    }
}

/// Dialect selector: a built-in name or a caller-supplied implementation.
#[derive(Clone)]
pub enum Dialect {
    Named(DialectName),
    Custom(Arc<dyn DialectModule>),
}

impl Dialect {
    pub fn module(&self) -> Arc<dyn DialectModule> {
        match self {
            Dialect::Named(name) => name.module(),
            Dialect::Custom(module) => Arc::clone(module),
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::Named(DialectName::default())
    }
}

impl From<DialectName> for Dialect {
    fn from(name: DialectName) -> Self {
        Dialect::Named(name)
    }
}

impl From<Arc<dyn DialectModule>> for Dialect {
    fn from(module: Arc<dyn DialectModule>) -> Self {
        Dialect::Custom(module)
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Named(name) => write!(f, "Dialect::Named({})", name),
            Dialect::Custom(module) => write!(f, "Dialect::Custom({})", module.name()),
        }
    }
}

/// How a correlated subselect attaches to the rows before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Inner,
}

/// A table joined inside a paginated subselect so the child's columns are in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraJoin {
    pub table: String,
    pub alias: String,
    pub condition: String,
}

/// One paginated subselect, independent of the dialect that renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedSelect<'a> {
    pub table: &'a str,
    pub alias: &'a str,
    pub conditions: Vec<String>,
    pub order: &'a Order,
    pub limit: Limit,
    /// Present in offset mode, which also counts the total rows.
    pub offset: Option<u64>,
    /// Correlation with the outer rows; `None` renders a plain derived table.
    pub join: Option<(String, JoinKind)>,
    pub extra_join: Option<ExtraJoin>,
}

impl<'a> PagedSelect<'a> {
    pub fn new(table: &'a str, alias: &'a str, conditions: Vec<String>, paging: &'a Paging) -> Self {
        Self {
            table,
            alias,
            conditions,
            order: paging.order(),
            limit: paging.limit(),
            offset: paging.offset(),
            join: None,
            extra_join: None,
        }
    }

    pub fn joined(mut self, condition: impl Into<String>, kind: JoinKind) -> Self {
        self.join = Some((condition.into(), kind));
        self
    }

    pub fn with_extra_join(mut self, extra_join: Option<ExtraJoin>) -> Self {
        self.extra_join = extra_join;
        self
    }

    /// Whether `$total` is selected.
    pub fn with_total(&self) -> bool {
        self.offset.is_some()
    }

    /// Conditions joined with AND, or `fallback` when there are none.
    pub fn where_clause(&self, fallback: &str) -> String {
        if self.conditions.is_empty() {
            fallback.to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }
}

/// Evaluate the `where` hooks of a paginated node: the junction's first, then the node's.
///
/// Each hook is awaited before the next starts. Hooks that yield nothing add nothing.
pub async fn paging_predicates(
    dialect: &dyn DialectModule,
    req: &PaginationRequest<'_>,
) -> PlanResult<Vec<String>> {
    let node = req.node;
    let mut conditions = Vec::new();
    if let Some(junction) = &node.junction {
        if let Some(hook) = &junction.where_hook {
            let condition = hook
                .evaluate(&dialect.quote(&junction.alias), &node.args, req.context, node)
                .await
                .map_err(|e| PlanError::predicate(&junction.alias, e))?;
            conditions.extend(condition);
        }
    }
    if let Some(hook) = &node.where_hook {
        let condition = hook
            .evaluate(&dialect.quote(&node.alias), &node.args, req.context, node)
            .await
            .map_err(|e| PlanError::predicate(&node.alias, e))?;
        conditions.extend(condition);
    }
    Ok(conditions)
}

/// Extra join of the child table, needed when the child's filter or ordering is evaluated
/// inside a junction subselect.
pub fn child_extra_join(node: &PlanNode, join_to_child: &str) -> Option<ExtraJoin> {
    let needed = node.where_hook.is_some() || node.order_by.is_some() || node.sort_key.is_some();
    needed.then(|| ExtraJoin {
        table: node.sql_table.clone(),
        alias: node.alias.clone(),
        condition: join_to_child.to_string(),
    })
}
