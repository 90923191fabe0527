//! The correlated-subselect decision tree shared by pg and oracle.
//!
//! Both dialects attach each paginated relation as a subselect evaluated once per
//! outer row (`LATERAL` on pg, `APPLY` on oracle) and fan batches out from a
//! derived table of parent keys. Only the syntax differs, which is what
//! [`LateralSyntax`] captures.

use tracing::debug;

use crate::dialect::{
    child_extra_join, paging_predicates, DialectModule, JoinKind, PagedSelect, PaginationRequest,
    Technique,
};
use crate::error::{PlanError, PlanResult};
use crate::pagination::interpret::interpret;
use crate::plan::{BatchScope, Junction, PlanNode, SqlBatch};

/// Syntactic primitives of a dialect with correlated subselects.
pub trait LateralSyntax: DialectModule {
    /// Render a paginated subselect, correlated or as a derived table.
    fn paged_select(&self, select: &PagedSelect<'_>) -> String;

    /// FROM clause producing one row per batch value, and the expression naming that value.
    fn batch_source(&self, scope: &BatchScope, parent_key: &str) -> (String, String);

    /// Left operand comparing a child column with the current batch value.
    fn batch_key_operand(&self, column: String, scope: &BatchScope) -> String;

    /// Join of the child table after a junction subselect.
    fn child_table_join(&self, table: &str, alias: &str, condition: &str) -> String;
}

fn junction_of(node: &PlanNode) -> PlanResult<&Junction> {
    node.junction
        .as_ref()
        .ok_or_else(|| PlanError::plan(format!("'{}' has no junction", node.name)))
}

fn batch_of<'a>(batch: Option<&'a SqlBatch>, node: &PlanNode) -> PlanResult<&'a SqlBatch> {
    batch.ok_or_else(|| PlanError::plan(format!("'{}' has no sqlBatch", node.name)))
}

pub async fn root<D: LateralSyntax>(d: &D, req: &PaginationRequest<'_>) -> PlanResult<Vec<String>> {
    let node = req.node;
    let paging = interpret(node, d, req.settings)?;
    let mut conditions = paging_predicates(d, req).await?;
    conditions.extend(paging.seek_condition().cloned());

    debug!(dialect = d.name(), node = %node.alias, technique = %Technique::Root, "paginating");
    let select = PagedSelect::new(&node.sql_table, &node.alias, conditions, &paging);
    Ok(vec![d.paged_select(&select)])
}

pub async fn joined_one_to_many<D: LateralSyntax>(
    d: &D,
    req: &PaginationRequest<'_>,
    join_condition: &str,
) -> PlanResult<Vec<String>> {
    let node = req.node;
    let paging = interpret(node, d, req.settings)?;
    let mut conditions = vec![join_condition.to_string()];
    conditions.extend(paging_predicates(d, req).await?);
    conditions.extend(paging.seek_condition().cloned());

    debug!(dialect = d.name(), node = %node.alias, technique = %Technique::JoinedOneToMany, "paginating");
    let select = PagedSelect::new(&node.sql_table, &node.alias, conditions, &paging)
        .joined(join_condition, JoinKind::Left);
    Ok(vec![d.paged_select(&select)])
}

pub async fn joined_many_to_many<D: LateralSyntax>(
    d: &D,
    req: &PaginationRequest<'_>,
    join_to_junction: &str,
    join_to_child: &str,
) -> PlanResult<Vec<String>> {
    let node = req.node;
    let junction = junction_of(node)?;
    let paging = interpret(node, d, req.settings)?;
    let mut conditions = vec![join_to_junction.to_string()];
    conditions.extend(paging_predicates(d, req).await?);
    conditions.extend(paging.seek_condition().cloned());

    debug!(dialect = d.name(), node = %node.alias, technique = %Technique::JoinedManyToMany, "paginating");
    let select = PagedSelect::new(&junction.sql_table, &junction.alias, conditions, &paging)
        .joined(join_to_junction, JoinKind::Left)
        .with_extra_join(child_extra_join(node, join_to_child));
    Ok(vec![
        d.paged_select(&select),
        d.child_table_join(&node.sql_table, &node.alias, join_to_child),
    ])
}

pub async fn batched_one_to_many<D: LateralSyntax>(
    d: &D,
    req: &PaginationRequest<'_>,
    scope: &BatchScope,
) -> PlanResult<Vec<String>> {
    let node = req.node;
    let batch = batch_of(node.sql_batch.as_ref(), node)?;
    let paging = interpret(node, d, req.settings)?;

    let (source, current) = d.batch_source(scope, &batch.parent_key);
    let key = d.batch_key_operand(
        format!("{}.{}", d.quote(&node.alias), d.quote(&batch.this_key)),
        scope,
    );
    let correlation = format!("{} = {}", key, current);
    let mut conditions = vec![correlation.clone()];
    conditions.extend(paging_predicates(d, req).await?);
    conditions.extend(paging.seek_condition().cloned());

    debug!(dialect = d.name(), node = %node.alias, parents = scope.len(), technique = %Technique::BatchedOneToMany, "paginating");
    let select = PagedSelect::new(&node.sql_table, &node.alias, conditions, &paging)
        .joined(correlation, JoinKind::Inner);
    Ok(vec![source, d.paged_select(&select)])
}

pub async fn batched_many_to_many<D: LateralSyntax>(
    d: &D,
    req: &PaginationRequest<'_>,
    scope: &BatchScope,
    join_to_child: &str,
) -> PlanResult<Vec<String>> {
    let node = req.node;
    let junction = junction_of(node)?;
    let batch = batch_of(junction.sql_batch.as_ref(), node)?;
    let paging = interpret(node, d, req.settings)?;

    let (source, current) = d.batch_source(scope, &batch.parent_key);
    let key = d.batch_key_operand(
        format!("{}.{}", d.quote(&junction.alias), d.quote(&batch.this_key)),
        scope,
    );
    let correlation = format!("{} = {}", key, current);
    let mut conditions = vec![correlation.clone()];
    conditions.extend(paging_predicates(d, req).await?);
    conditions.extend(paging.seek_condition().cloned());

    debug!(dialect = d.name(), node = %node.alias, parents = scope.len(), technique = %Technique::BatchedManyToMany, "paginating");
    let select = PagedSelect::new(&junction.sql_table, &junction.alias, conditions, &paging)
        .joined(correlation, JoinKind::Left)
        .with_extra_join(child_extra_join(node, join_to_child));
    Ok(vec![
        source,
        d.paged_select(&select),
        d.child_table_join(&node.sql_table, &node.alias, join_to_child),
    ])
}
