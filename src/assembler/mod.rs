//! Statement assembly: walks the plan tree and dispatches each relation to the
//! active dialect.
//!
//! A relation reached through `sqlJoin`/`sqlJoins` is joined into its parent's
//! statement; one with `sqlBatch` is deferred and built later over the keys of
//! every parent row with [`Planner::build_batch`]. Paginated relations go to the
//! dialect's handler for their technique, everything else takes the plain join
//! path.
//!
//! Sibling subtrees are assembled concurrently, but their fragments are merged in
//! declared order, and the first failing hook abandons the whole build.

mod fragments;

use std::fmt;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde::Serialize;
use tracing::debug;

use crate::config::PlannerConfig;
use crate::dialect::{paging_predicates, Dialect, DialectModule, PaginationRequest, TOTAL_COLUMN};
use crate::error::{PlanError, PlanResult};
use crate::pagination::interpret::{paging_order, PagingSettings};
use crate::pagination::ordering::Order;
use crate::plan::{BatchScope, Context, PagingMode, PlanNode};

use fragments::Fragments;

/// A batched relation whose statement waits for its parent's rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deferred {
    /// Alias of the batched node.
    pub alias: String,
    pub parent_alias: String,
    /// Result column of the parent statement holding the batch key.
    pub parent_key_column: String,
    /// Result column of the batched statement holding the same key.
    pub child_key_column: String,
}

/// A built statement and the batched relations that hang off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub sql: String,
    pub deferred: Vec<Deferred>,
}

#[derive(Clone, Copy)]
enum Position<'a> {
    Root,
    Joined,
    Batch(&'a BatchScope),
}

/// Builds statements for plan trees on one dialect.
///
/// Planners hold no per-query state and can be shared across concurrent builds.
#[derive(Clone)]
pub struct Planner {
    dialect: Arc<dyn DialectModule>,
    settings: PagingSettings,
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("dialect", &self.dialect.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Planner {
    pub fn new(dialect: impl Into<Dialect>, settings: PagingSettings) -> Self {
        let dialect: Dialect = dialect.into();
        Self {
            dialect: dialect.module(),
            settings,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.dialect, config.settings())
    }

    pub fn dialect(&self) -> &dyn DialectModule {
        self.dialect.as_ref()
    }

    pub fn settings(&self) -> &PagingSettings {
        &self.settings
    }

    /// Build the root statement of a plan tree.
    pub async fn build(&self, root: &PlanNode, context: &Context) -> PlanResult<QueryPlan> {
        root.validate()?;
        let fragments = self.walk(None, root, Position::Root, context).await?;
        self.finish(&root.alias, fragments)
    }

    /// Build the batched statement of the relation `alias` over the given parent keys.
    pub async fn build_batch(
        &self,
        root: &PlanNode,
        alias: &str,
        scope: &BatchScope,
        context: &Context,
    ) -> PlanResult<QueryPlan> {
        root.validate()?;
        let (node, parent) = root
            .find(alias)
            .ok_or_else(|| PlanError::plan(format!("no node with alias '{}'", alias)))?;
        if !node.is_batched() {
            return Err(PlanError::plan(format!("'{}' is not a batched relation", node.name)));
        }
        if scope.is_empty() {
            return Err(PlanError::InvalidArguments(format!(
                "batch for '{}' has no parent keys",
                node.name
            )));
        }
        let fragments = self.walk(parent, node, Position::Batch(scope), context).await?;
        self.finish(alias, fragments)
    }

    fn finish(&self, alias: &str, fragments: Fragments) -> PlanResult<QueryPlan> {
        if fragments.selections.is_empty() {
            return Err(PlanError::plan(format!(
                "statement for '{}' selects no columns",
                alias
            )));
        }
        let sql = fragments.to_statement();
        debug!(
            dialect = self.dialect.name(),
            node = %alias,
            length = sql.len(),
            deferred = fragments.deferred.len(),
            "statement built"
        );
        Ok(QueryPlan {
            sql,
            deferred: fragments.deferred,
        })
    }

    fn q(&self, identifier: &str) -> String {
        self.dialect.quote(identifier)
    }

    fn request<'a>(
        &'a self,
        parent: Option<&'a PlanNode>,
        node: &'a PlanNode,
        context: &'a Context,
    ) -> PaginationRequest<'a> {
        PaginationRequest {
            parent,
            node,
            context,
            settings: &self.settings,
        }
    }

    fn walk<'a>(
        &'a self,
        parent: Option<&'a PlanNode>,
        node: &'a PlanNode,
        position: Position<'a>,
        context: &'a Context,
    ) -> BoxFuture<'a, PlanResult<Fragments>> {
        async move {
            let mut out = Fragments {
                selections: self.selections(node, position)?,
                ..Default::default()
            };
            match position {
                Position::Root => self.root_source(node, context, &mut out).await?,
                Position::Joined => {
                    let parent = parent.ok_or_else(|| {
                        PlanError::plan(format!("'{}' is joined but has no parent", node.name))
                    })?;
                    self.joined_source(parent, node, context, &mut out).await?
                }
                Position::Batch(scope) => {
                    self.batch_source(parent, node, scope, context, &mut out).await?
                }
            }
            out.orders.extend(self.outer_order(node)?);

            let mut joined = Vec::new();
            for child in &node.children {
                if child.is_batched() {
                    self.defer(node, child, &mut out)?;
                } else {
                    joined.push(self.walk(Some(node), child, Position::Joined, context));
                }
            }
            for part in try_join_all(joined).await? {
                out.append(part);
            }
            Ok(out)
        }
        .boxed()
    }

    fn selection(&self, table: &str, expr: String, name: &str) -> String {
        format!("{} AS {}", expr, self.q(&format!("{}__{}", table, name)))
    }

    fn column(&self, table: &str, column: &str) -> String {
        self.selection(table, format!("{}.{}", self.q(table), self.q(column)), column)
    }

    fn selections(&self, node: &PlanNode, position: Position<'_>) -> PlanResult<Vec<String>> {
        let alias = node.alias.as_str();
        let mut out: Vec<String> = node
            .columns
            .iter()
            .map(|c| {
                self.selection(
                    alias,
                    format!("{}.{}", self.q(alias), self.q(&c.column)),
                    &c.alias,
                )
            })
            .collect();

        match node.unique_key.as_slice() {
            [] => {}
            [key] => out.push(self.column(alias, key)),
            keys => out.push(self.selection(
                alias,
                self.dialect.composite_key(alias, keys),
                &keys.join("#"),
            )),
        }

        // Sort values feed the cursors of the rows, wherever the sort key lives.
        let paged_table = node.junction.as_ref().map_or(alias, |j| j.alias.as_str());
        match node.paging_mode() {
            Some(PagingMode::Keyset) => {
                let order = paging_order(node)?;
                for column in &order.columns {
                    out.push(self.column(&order.table, &column.column));
                }
            }
            Some(PagingMode::Offset) => out.push(self.column(paged_table, TOTAL_COLUMN)),
            None => {}
        }
        if let (Position::Batch(_), Some(batch)) = (position, node.batch_keys()) {
            out.push(self.column(paged_table, &batch.this_key));
        }
        Ok(out)
    }

    async fn root_source(
        &self,
        node: &PlanNode,
        context: &Context,
        out: &mut Fragments,
    ) -> PlanResult<()> {
        let req = self.request(None, node, context);
        if node.paging_mode().is_some() {
            out.tables
                .extend(self.dialect.handle_pagination_at_root(&req).await?);
        } else {
            out.tables
                .push(format!("FROM {} {}", node.sql_table, self.q(&node.alias)));
            out.wheres
                .extend(paging_predicates(self.dialect(), &req).await?);
        }
        Ok(())
    }

    async fn joined_source(
        &self,
        parent: &PlanNode,
        node: &PlanNode,
        context: &Context,
        out: &mut Fragments,
    ) -> PlanResult<()> {
        let req = self.request(Some(parent), node, context);
        let paginated = node.paging_mode().is_some();

        let Some(junction) = &node.junction else {
            let hook = node
                .sql_join
                .as_ref()
                .ok_or_else(|| PlanError::plan(format!("'{}' has no sqlJoin", node.name)))?;
            let condition = hook
                .evaluate(
                    &self.q(&parent.alias),
                    &self.q(&node.alias),
                    &node.args,
                    context,
                    node,
                )
                .await
                .map_err(|e| PlanError::predicate(&node.alias, e))?;

            if paginated {
                out.tables.extend(
                    self.dialect
                        .handle_joined_one_to_many_paginated(&req, &condition)
                        .await?,
                );
            } else {
                out.tables.push(format!(
                    "LEFT JOIN {} {} ON {}",
                    node.sql_table,
                    self.q(&node.alias),
                    condition
                ));
                out.wheres
                    .extend(paging_predicates(self.dialect(), &req).await?);
            }
            return Ok(());
        };

        let (to_junction, to_child) = junction.sql_joins.as_ref().ok_or_else(|| {
            PlanError::plan(format!("junction of '{}' has no sqlJoins", node.name))
        })?;
        let join_to_junction = to_junction
            .evaluate(
                &self.q(&parent.alias),
                &self.q(&junction.alias),
                &node.args,
                context,
                node,
            )
            .await
            .map_err(|e| PlanError::predicate(&junction.alias, e))?;
        let join_to_child = to_child
            .evaluate(
                &self.q(&junction.alias),
                &self.q(&node.alias),
                &node.args,
                context,
                node,
            )
            .await
            .map_err(|e| PlanError::predicate(&node.alias, e))?;

        if paginated {
            out.tables.extend(
                self.dialect
                    .handle_joined_many_to_many_paginated(&req, &join_to_junction, &join_to_child)
                    .await?,
            );
        } else {
            out.tables.push(format!(
                "LEFT JOIN {} {} ON {}",
                junction.sql_table,
                self.q(&junction.alias),
                join_to_junction
            ));
            out.tables.push(format!(
                "LEFT JOIN {} {} ON {}",
                node.sql_table,
                self.q(&node.alias),
                join_to_child
            ));
            out.wheres
                .extend(paging_predicates(self.dialect(), &req).await?);
        }
        Ok(())
    }

    async fn batch_source(
        &self,
        parent: Option<&PlanNode>,
        node: &PlanNode,
        scope: &BatchScope,
        context: &Context,
        out: &mut Fragments,
    ) -> PlanResult<()> {
        let req = self.request(parent, node, context);
        let paginated = node.paging_mode().is_some();

        let Some(junction) = &node.junction else {
            let batch = node
                .sql_batch
                .as_ref()
                .ok_or_else(|| PlanError::plan(format!("'{}' has no sqlBatch", node.name)))?;
            if paginated {
                out.tables.extend(
                    self.dialect
                        .handle_batched_one_to_many_paginated(&req, scope)
                        .await?,
                );
            } else {
                out.tables
                    .push(format!("FROM {} {}", node.sql_table, self.q(&node.alias)));
                out.wheres.push(self.key_in(&node.alias, &batch.this_key, scope));
                out.wheres
                    .extend(paging_predicates(self.dialect(), &req).await?);
            }
            return Ok(());
        };

        let batch = junction.sql_batch.as_ref().ok_or_else(|| {
            PlanError::plan(format!("junction of '{}' has no sqlBatch", node.name))
        })?;
        let hook = junction.child_join().ok_or_else(|| {
            PlanError::plan(format!("junction of '{}' has no join to the child", node.name))
        })?;
        let join_to_child = hook
            .evaluate(
                &self.q(&junction.alias),
                &self.q(&node.alias),
                &node.args,
                context,
                node,
            )
            .await
            .map_err(|e| PlanError::predicate(&node.alias, e))?;

        if paginated {
            out.tables.extend(
                self.dialect
                    .handle_batched_many_to_many_paginated(&req, scope, &join_to_child)
                    .await?,
            );
        } else {
            out.tables.push(format!(
                "FROM {} {}",
                junction.sql_table,
                self.q(&junction.alias)
            ));
            out.tables.push(format!(
                "LEFT JOIN {} {} ON {}",
                node.sql_table,
                self.q(&node.alias),
                join_to_child
            ));
            out.wheres
                .push(self.key_in(&junction.alias, &batch.this_key, scope));
            out.wheres
                .extend(paging_predicates(self.dialect(), &req).await?);
        }
        Ok(())
    }

    fn key_in(&self, table: &str, column: &str, scope: &BatchScope) -> String {
        let values: Vec<String> = scope
            .values()
            .iter()
            .map(|v| self.dialect.literal(v))
            .collect();
        format!(
            "{}.{} IN ({})",
            self.q(table),
            self.q(column),
            values.join(", ")
        )
    }

    /// Record a batched child and select the parent column its keys come from.
    fn defer(&self, node: &PlanNode, child: &PlanNode, out: &mut Fragments) -> PlanResult<()> {
        let batch = child
            .batch_keys()
            .ok_or_else(|| PlanError::plan(format!("'{}' has no sqlBatch", child.name)))?;
        let key_table = child.junction.as_ref().map_or(&child.alias, |j| &j.alias);
        out.selections.push(self.column(&node.alias, &batch.parent_key));
        out.deferred.push(Deferred {
            alias: child.alias.clone(),
            parent_alias: node.alias.clone(),
            parent_key_column: format!("{}__{}", node.alias, batch.parent_key),
            child_key_column: format!("{}__{}", key_table, batch.this_key),
        });
        Ok(())
    }

    /// Ordering this node contributes to the statement's ORDER BY.
    fn outer_order(&self, node: &PlanNode) -> PlanResult<Option<String>> {
        let order = if node.paging_mode().is_some() {
            Some(paging_order(node)?)
        } else if let Some(columns) = node.order_by.as_ref().or(node.sort_key.as_ref()) {
            Some(Order::new(&node.alias, columns.clone()))
        } else {
            node.junction.as_ref().and_then(|j| {
                j.order_by
                    .as_ref()
                    .or(j.sort_key.as_ref())
                    .map(|columns| Order::new(&j.alias, columns.clone()))
            })
        };
        Ok(order.map(|o| o.to_sql(|s| self.q(s))))
    }
}
