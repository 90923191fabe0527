//! Running planned statements through a caller-supplied executor.
//!
//! The planner never opens a connection. [`Planner::run`] hands each statement to
//! an [`Executor`], then builds and runs the batched statement of every deferred
//! relation over the keys its parent rows returned.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::assembler::{Deferred, Planner};
use crate::error::{BoxError, PlanError, PlanResult};
use crate::plan::{BatchScope, Context, PlanNode, Scalar};

/// One result row, keyed by column alias.
pub type Row = HashMap<String, serde_json::Value>;

/// Runs SQL text and returns its rows.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, BoxError>;
}

#[async_trait]
impl<F, Fut> Executor for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Row>, BoxError>> + Send + 'static,
{
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, BoxError> {
        (self)(sql.to_string()).await
    }
}

/// Rows of one batched relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub deferred: Deferred,
    pub sql: String,
    pub rows: Vec<Row>,
}

/// Everything one [`Planner::run`] fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub sql: String,
    pub rows: Vec<Row>,
    /// In execution order. Relations whose parents returned no keys are absent.
    pub batches: Vec<BatchResult>,
}

impl Execution {
    pub fn batch(&self, alias: &str) -> Option<&BatchResult> {
        self.batches.iter().find(|b| b.deferred.alias == alias)
    }

    /// Number of statements executed.
    pub fn round_trips(&self) -> usize {
        1 + self.batches.len()
    }
}

/// The columns of `alias` in a row, with the `alias__` prefix removed.
pub fn node_columns(row: &Row, alias: &str) -> Row {
    let prefix = format!("{}__", alias);
    row.iter()
        .filter_map(|(name, value)| {
            name.strip_prefix(&prefix)
                .map(|column| (column.to_string(), value.clone()))
        })
        .collect()
}

async fn execute<E: Executor + ?Sized>(executor: &E, sql: &str) -> PlanResult<Vec<Row>> {
    debug!(length = sql.len(), "executing statement");
    executor
        .execute(sql)
        .await
        .map_err(|e| PlanError::Execution(e.to_string()))
}

impl Planner {
    /// Build and execute the root statement, then every batched relation below it.
    ///
    /// Each deferred relation costs one statement regardless of how many parent
    /// rows it fans out over.
    pub async fn run<E: Executor + ?Sized>(
        &self,
        root: &PlanNode,
        context: &Context,
        executor: &E,
    ) -> PlanResult<Execution> {
        let plan = self.build(root, context).await?;
        let rows = execute(executor, &plan.sql).await?;

        let mut batches: Vec<BatchResult> = Vec::new();
        let mut queue: VecDeque<(Deferred, Option<usize>)> =
            plan.deferred.into_iter().map(|d| (d, None)).collect();

        while let Some((deferred, source)) = queue.pop_front() {
            let parents = match source {
                Some(index) => &batches[index].rows,
                None => &rows,
            };
            let scope: BatchScope = parents
                .iter()
                .filter_map(|row| row.get(&deferred.parent_key_column))
                .filter_map(Scalar::from_json)
                .collect();
            if scope.is_empty() {
                debug!(node = %deferred.alias, "no parent keys, batch skipped");
                continue;
            }

            let batch = self
                .build_batch(root, &deferred.alias, &scope, context)
                .await?;
            let batch_rows = execute(executor, &batch.sql).await?;
            let index = batches.len();
            queue.extend(batch.deferred.into_iter().map(|d| (d, Some(index))));
            batches.push(BatchResult {
                deferred,
                sql: batch.sql,
                rows: batch_rows,
            });
        }

        Ok(Execution {
            sql: plan.sql,
            rows,
            batches,
        })
    }
}
