//! # joinplan
//!
//! Turns a tree of relations into paginated, batched SQL for six dialects.
//!
//! Each relation of a [`PlanNode`](plan::PlanNode) tree is either joined into its
//! parent's statement or deferred and fetched for all parent rows at once, so a
//! whole tree costs one statement per batched relation instead of one per row.
//! Relay-style connection arguments (`first`, `after`, `last`, `before`) become
//! keyset or offset pagination in whatever form the dialect supports: `LATERAL`
//! on pg, `APPLY` on oracle, `UNION`ed subselects on mariadb and mysql8.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use joinplan::prelude::*;
//!
//! let users = PlanNode::new("users", "accounts", "users")
//!     .columns(["id", "email"])
//!     .unique_key(["id"])
//!     .sort_key(vec![OrderColumn::asc("id")])
//!     .arg("first", 10)
//!     .paginated();
//!
//! let planner = Planner::new(DialectName::Pg, PagingSettings::default());
//! let plan = planner.build(&users, &()).await?;
//! // SELECT "users"."id" AS "users__id", ... LIMIT 11 ...
//! ```
//!
//! ## Dialects
//!
//! | Dialect  | Root | Joined | Batched |
//! |----------|------|--------|---------|
//! | pg       | ✓    | ✓      | ✓       |
//! | oracle   | ✓    | ✓      | ✓       |
//! | mariadb  | ✓    |        | ✓       |
//! | mysql8   | ✓    |        | ✓       |
//! | mysql    |      |        |         |
//! | sqlite3  |      |        |         |
//!
//! Unpaginated relations work on every dialect.

pub mod assembler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod pagination;
pub mod plan;

pub mod prelude {
    pub use crate::assembler::{Deferred, Planner, QueryPlan};
    pub use crate::config::PlannerConfig;
    pub use crate::dialect::{Dialect, DialectModule, DialectName, Technique};
    pub use crate::error::*;
    pub use crate::executor::{node_columns, Execution, Executor, Row};
    pub use crate::pagination::{
        Cursor, Direction, Order, OrderColumn, Page, PageInfo, Paging, PagingSettings,
    };
    pub use crate::plan::{
        BatchScope, ColumnSelection, Context, JoinHook, Junction, PlanNode, Scalar, SqlBatch,
        WhereHook,
    };
}

/// Read a plan tree from JSON.
///
/// ```
/// let node = joinplan::from_json(r#"{"name": "users", "sqlTable": "accounts", "as": "u"}"#).unwrap();
/// assert_eq!(node.alias, "u");
/// ```
pub fn from_json(input: &str) -> Result<plan::PlanNode, error::PlanError> {
    serde_json::from_str(input).map_err(|e| error::PlanError::plan(e.to_string()))
}
