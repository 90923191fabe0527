//! PostgreSQL.

use async_trait::async_trait;

use super::lateral::{self, LateralSyntax};
use super::{DialectModule, JoinKind, PagedSelect, PaginationRequest, Technique, TOTAL_COLUMN};
use crate::error::PlanResult;
use crate::plan::{BatchScope, Scalar};

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

#[async_trait]
impl DialectModule for Postgres {
    fn name(&self) -> &'static str {
        "pg"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier)
    }

    fn composite_key(&self, table: &str, columns: &[String]) -> String {
        let keys: Vec<String> = columns
            .iter()
            .map(|c| format!("{}.{}", self.quote(table), self.quote(c)))
            .collect();
        format!("NULLIF(CONCAT({}), '')", keys.join(", "))
    }

    fn unlimited_limit(&self) -> String {
        "ALL".to_string()
    }

    fn supports(&self, _technique: Technique) -> bool {
        true
    }

    async fn handle_pagination_at_root(
        &self,
        req: &PaginationRequest<'_>,
    ) -> PlanResult<Vec<String>> {
        lateral::root(self, req).await
    }

    async fn handle_joined_one_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        join_condition: &str,
    ) -> PlanResult<Vec<String>> {
        lateral::joined_one_to_many(self, req, join_condition).await
    }

    async fn handle_joined_many_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        join_to_junction: &str,
        join_to_child: &str,
    ) -> PlanResult<Vec<String>> {
        lateral::joined_many_to_many(self, req, join_to_junction, join_to_child).await
    }

    async fn handle_batched_one_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        batch_scope: &BatchScope,
    ) -> PlanResult<Vec<String>> {
        lateral::batched_one_to_many(self, req, batch_scope).await
    }

    async fn handle_batched_many_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        batch_scope: &BatchScope,
        join_to_child: &str,
    ) -> PlanResult<Vec<String>> {
        lateral::batched_many_to_many(self, req, batch_scope, join_to_child).await
    }
}

impl LateralSyntax for Postgres {
    fn paged_select(&self, select: &PagedSelect<'_>) -> String {
        let alias = self.quote(select.alias);
        let columns = if select.with_total() {
            format!("{}.*, count(*) OVER () AS {}", alias, self.quote(TOTAL_COLUMN))
        } else {
            format!("{}.*", alias)
        };
        let limit = select.limit.render(self);
        let window = match select.offset {
            Some(offset) => format!("LIMIT {} OFFSET {}", limit, offset),
            None => format!("LIMIT {}", limit),
        };

        let mut body = vec![
            format!("  SELECT {}", columns),
            format!("  FROM {} {}", select.table, alias),
        ];
        if let Some(extra) = &select.extra_join {
            body.push(format!(
                "  LEFT JOIN {} {} ON {}",
                extra.table,
                self.quote(&extra.alias),
                extra.condition
            ));
        }
        body.push(format!("  WHERE {}", select.where_clause("TRUE")));
        body.push(format!("  ORDER BY {}", select.order.to_sql(|s| self.quote(s))));
        body.push(format!("  {}", window));
        let body = body.join("\n");

        match &select.join {
            Some((condition, kind)) => {
                let join = match kind {
                    JoinKind::Left => "LEFT JOIN LATERAL",
                    JoinKind::Inner => "JOIN LATERAL",
                };
                format!("{} (\n{}\n) {} ON {}", join, body, alias, condition)
            }
            None => format!("FROM (\n{}\n) {}", body, alias),
        }
    }

    fn batch_source(&self, scope: &BatchScope, parent_key: &str) -> (String, String) {
        let rows: Vec<String> = scope
            .values()
            .iter()
            .map(|v| format!("({})", self.literal(v)))
            .collect();
        let key = self.quote(parent_key);
        (
            format!("FROM (VALUES {}) temp({})", rows.join(", "), key),
            format!("temp.{}", key),
        )
    }

    fn batch_key_operand(&self, column: String, scope: &BatchScope) -> String {
        if scope.first().is_some_and(Scalar::is_string) {
            format!("CAST({} AS TEXT)", column)
        } else {
            column
        }
    }

    fn child_table_join(&self, table: &str, alias: &str, condition: &str) -> String {
        format!("LEFT JOIN {} AS {} ON {}", table, self.quote(alias), condition)
    }
}
