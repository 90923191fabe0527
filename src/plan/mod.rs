//! The plan tree: one node per relation or field of the incoming selection.
//!
//! Nodes are built by an external mapper (or read from a JSON plan file) and are
//! treated as read-only by everything in this crate.
//!
//! ```json
//! {
//!   "name": "users", "sqlTable": "accounts", "as": "users",
//!   "columns": ["id", "email"], "uniqueKey": ["id"],
//!   "paginate": true, "sortKey": "id", "args": { "first": 10 },
//!   "children": [
//!     { "name": "posts", "sqlTable": "posts", "as": "posts",
//!       "columns": ["id", "title"], "sqlJoin": "{parent}.id = {child}.author_id" }
//!   ]
//! }
//! ```

pub mod hooks;
pub mod value;

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{PlanError, PlanResult};
use crate::pagination::ordering::{deserialize_ordering, OrderColumn};

pub use hooks::{Args, Context, JoinHook, JoinPredicate, WhereHook, WherePredicate};
pub use value::{BatchScope, Scalar};

/// A selected column and the name it is returned under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ColumnRepr")]
pub struct ColumnSelection {
    pub column: String,
    pub alias: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnRepr {
    Bare(String),
    Aliased { column: String, alias: String },
}

impl From<ColumnRepr> for ColumnSelection {
    fn from(repr: ColumnRepr) -> Self {
        match repr {
            ColumnRepr::Bare(column) => ColumnSelection::new(column),
            ColumnRepr::Aliased { column, alias } => ColumnSelection { column, alias },
        }
    }
}

impl ColumnSelection {
    pub fn new(column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            alias: column.clone(),
            column,
        }
    }

    pub fn aliased(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: alias.into(),
        }
    }
}

/// Key pair used to fetch children of many parents in one statement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlBatch {
    /// Column on the child (or junction) side holding the parent's key.
    pub this_key: String,
    /// Column on the parent side.
    pub parent_key: String,
    /// For a batched junction: condition joining junction to child.
    #[serde(default)]
    pub sql_join: Option<JoinHook>,
}

impl SqlBatch {
    pub fn new(this_key: impl Into<String>, parent_key: impl Into<String>) -> Self {
        Self {
            this_key: this_key.into(),
            parent_key: parent_key.into(),
            sql_join: None,
        }
    }

    pub fn with_join(mut self, join: JoinHook) -> Self {
        self.sql_join = Some(join);
        self
    }
}

/// Bridge table of a many-to-many relation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Junction {
    pub sql_table: String,
    #[serde(rename = "as")]
    pub alias: String,
    #[serde(default, rename = "where")]
    pub where_hook: Option<WhereHook>,
    #[serde(default, deserialize_with = "deserialize_ordering")]
    pub order_by: Option<Vec<OrderColumn>>,
    #[serde(default, deserialize_with = "deserialize_ordering")]
    pub sort_key: Option<Vec<OrderColumn>>,
    #[serde(default)]
    pub sql_batch: Option<SqlBatch>,
    /// Parent → junction and junction → child.
    #[serde(default)]
    pub sql_joins: Option<(JoinHook, JoinHook)>,
}

impl Junction {
    pub fn new(sql_table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            sql_table: sql_table.into(),
            alias: alias.into(),
            where_hook: None,
            order_by: None,
            sort_key: None,
            sql_batch: None,
            sql_joins: None,
        }
    }

    pub fn joins(mut self, to_junction: JoinHook, to_child: JoinHook) -> Self {
        self.sql_joins = Some((to_junction, to_child));
        self
    }

    pub fn batch(mut self, batch: SqlBatch) -> Self {
        self.sql_batch = Some(batch);
        self
    }

    pub fn with_where(mut self, hook: WhereHook) -> Self {
        self.where_hook = Some(hook);
        self
    }

    pub fn order_by(mut self, columns: Vec<OrderColumn>) -> Self {
        self.order_by = Some(columns);
        self
    }

    pub fn sort_key(mut self, columns: Vec<OrderColumn>) -> Self {
        self.sort_key = Some(columns);
        self
    }

    /// Condition joining the junction to the child table.
    pub fn child_join(&self) -> Option<&JoinHook> {
        self.sql_joins
            .as_ref()
            .map(|(_, to_child)| to_child)
            .or_else(|| self.sql_batch.as_ref().and_then(|b| b.sql_join.as_ref()))
    }
}

/// How a paginated node pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    Keyset,
    Offset,
}

/// One relation or field in the selection tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    /// Logical field name.
    pub name: String,
    /// SQL table name or parenthesised expression.
    pub sql_table: String,
    /// Alias, unique within one query.
    #[serde(rename = "as")]
    pub alias: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub columns: Vec<ColumnSelection>,
    #[serde(default)]
    pub unique_key: Vec<String>,
    #[serde(default, rename = "where")]
    pub where_hook: Option<WhereHook>,
    /// Condition joining this node to its parent (one-to-many, joined).
    #[serde(default)]
    pub sql_join: Option<JoinHook>,
    /// Offset-mode ordering.
    #[serde(default, deserialize_with = "deserialize_ordering")]
    pub order_by: Option<Vec<OrderColumn>>,
    /// Keyset-mode ordering.
    #[serde(default, deserialize_with = "deserialize_ordering")]
    pub sort_key: Option<Vec<OrderColumn>>,
    /// Upper bound on the page size of this relation.
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub paginate: bool,
    #[serde(default)]
    pub sql_batch: Option<SqlBatch>,
    #[serde(default)]
    pub junction: Option<Junction>,
    #[serde(default)]
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(
        name: impl Into<String>,
        sql_table: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            sql_table: sql_table.into(),
            alias: alias.into(),
            args: Args::new(),
            columns: Vec::new(),
            unique_key: Vec::new(),
            where_hook: None,
            sql_join: None,
            order_by: None,
            sort_key: None,
            limit: None,
            paginate: false,
            sql_batch: None,
            junction: None,
            children: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(ColumnSelection::new));
        self
    }

    pub fn unique_key<I, S>(mut self, key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_key = key.into_iter().map(Into::into).collect();
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_where(mut self, hook: WhereHook) -> Self {
        self.where_hook = Some(hook);
        self
    }

    pub fn join(mut self, hook: JoinHook) -> Self {
        self.sql_join = Some(hook);
        self
    }

    pub fn order_by(mut self, columns: Vec<OrderColumn>) -> Self {
        self.order_by = Some(columns);
        self
    }

    pub fn sort_key(mut self, columns: Vec<OrderColumn>) -> Self {
        self.sort_key = Some(columns);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn paginated(mut self) -> Self {
        self.paginate = true;
        self
    }

    pub fn batch(mut self, batch: SqlBatch) -> Self {
        self.sql_batch = Some(batch);
        self
    }

    pub fn junction(mut self, junction: Junction) -> Self {
        self.junction = Some(junction);
        self
    }

    pub fn child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// The batch key pair, which lives on the junction for many-to-many relations.
    pub fn batch_keys(&self) -> Option<&SqlBatch> {
        match &self.junction {
            Some(junction) => junction.sql_batch.as_ref(),
            None => self.sql_batch.as_ref(),
        }
    }

    pub fn is_batched(&self) -> bool {
        self.batch_keys().is_some()
    }

    /// Paging mode, or `None` when this node is not paginated.
    pub fn paging_mode(&self) -> Option<PagingMode> {
        if !self.paginate {
            return None;
        }
        let junction = self.junction.as_ref();
        if self.sort_key.is_some() || junction.is_some_and(|j| j.sort_key.is_some()) {
            Some(PagingMode::Keyset)
        } else if self.order_by.is_some() || junction.is_some_and(|j| j.order_by.is_some()) {
            Some(PagingMode::Offset)
        } else {
            None
        }
    }

    /// Check the structural rules of the whole tree rooted here.
    pub fn validate(&self) -> PlanResult<()> {
        let mut aliases = HashSet::new();
        self.validate_inner(true, &mut aliases)
    }

    fn validate_inner<'a>(&'a self, is_root: bool, aliases: &mut HashSet<&'a str>) -> PlanResult<()> {
        if !aliases.insert(self.alias.as_str()) {
            return Err(PlanError::plan(format!("alias '{}' is used twice", self.alias)));
        }
        if self.order_by.is_some() && self.sort_key.is_some() {
            return Err(PlanError::plan(format!(
                "'{}' declares both orderBy and sortKey",
                self.name
            )));
        }
        if let Some(junction) = &self.junction {
            if !aliases.insert(junction.alias.as_str()) {
                return Err(PlanError::plan(format!(
                    "alias '{}' is used twice",
                    junction.alias
                )));
            }
            if junction.order_by.is_some() && junction.sort_key.is_some() {
                return Err(PlanError::plan(format!(
                    "junction of '{}' declares both orderBy and sortKey",
                    self.name
                )));
            }
            let keyset = self.sort_key.is_some() || junction.sort_key.is_some();
            let offset = self.order_by.is_some() || junction.order_by.is_some();
            if self.paginate && keyset && offset {
                return Err(PlanError::plan(format!(
                    "'{}' mixes keyset and offset ordering across its junction",
                    self.name
                )));
            }
            if junction.child_join().is_none() {
                return Err(PlanError::plan(format!(
                    "junction of '{}' has no join to the child table",
                    self.name
                )));
            }
            if junction.sql_batch.is_none() && junction.sql_joins.is_none() && !is_root {
                return Err(PlanError::plan(format!(
                    "junction of '{}' needs sqlJoins or sqlBatch",
                    self.name
                )));
            }
        } else if !is_root && self.sql_join.is_none() && self.sql_batch.is_none() {
            return Err(PlanError::plan(format!(
                "'{}' has neither sqlJoin nor sqlBatch",
                self.name
            )));
        }
        if self.paginate && self.paging_mode().is_none() {
            return Err(PlanError::plan(format!(
                "'{}' is paginated but has no orderBy or sortKey",
                self.name
            )));
        }
        for child in &self.children {
            child.validate_inner(false, aliases)?;
        }
        Ok(())
    }

    /// Find a node by alias, depth first, together with its parent.
    pub fn find(&self, alias: &str) -> Option<(&PlanNode, Option<&PlanNode>)> {
        if self.alias == alias {
            return Some((self, None));
        }
        for child in &self.children {
            if child.alias == alias {
                return Some((child, Some(self)));
            }
            if let Some(found) = child.find(alias) {
                return Some(found);
            }
        }
        None
    }
}
