//! Oracle (12c and later).
//!
//! Uses the pg decision tree with `APPLY` in place of `LATERAL`, `FETCH FIRST`
//! in place of `LIMIT`, and `SELECT ... FROM DUAL` unions in place of `VALUES`.

use async_trait::async_trait;

use super::lateral::{self, LateralSyntax};
use super::{DialectModule, JoinKind, PagedSelect, PaginationRequest, Technique, TOTAL_COLUMN};
use crate::error::PlanResult;
use crate::plan::{BatchScope, Scalar};

#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle {
    base: super::Postgres,
}

impl Oracle {
    /// Fold keys pairwise, since CONCAT takes exactly two arguments here.
    fn binary_concat(keys: Vec<String>) -> String {
        keys.into_iter()
            .reduce(|acc, key| format!("CONCAT({}, {})", acc, key))
            .unwrap_or_default()
    }
}

#[async_trait]
impl DialectModule for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote(&self, identifier: &str) -> String {
        self.base.quote(identifier)
    }

    fn composite_key(&self, table: &str, columns: &[String]) -> String {
        let keys = columns
            .iter()
            .map(|c| format!("{}.{}", self.quote(table), self.quote(c)))
            .collect();
        format!("NULLIF({}, '')", Self::binary_concat(keys))
    }

    fn literal(&self, value: &Scalar) -> String {
        match value {
            Scalar::Date(d) => format!("TIMESTAMP '{}'", d.format("%Y-%m-%d %H:%M:%S%.3f")),
            other => self.base.literal(other),
        }
    }

    fn supports(&self, technique: Technique) -> bool {
        self.base.supports(technique)
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

impl LateralSyntax for Oracle {
    fn paged_select(&self, select: &PagedSelect<'_>) -> String {
        let alias = self.quote(select.alias);
        let columns = if select.with_total() {
            format!("{}.*, count(*) OVER () AS {}", alias, self.quote(TOTAL_COLUMN))
        } else {
            format!("{}.*", alias)
        };
        let limit = select.limit.render(self);
        let window = match select.offset {
            Some(offset) => format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit),
            None => format!("FETCH FIRST {} ROWS ONLY", limit),
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
        body.push(format!("  WHERE {}", select.where_clause("1 = 1")));
        body.push(format!("  ORDER BY {}", select.order.to_sql(|s| self.quote(s))));
        body.push(format!("  {}", window));
        let body = body.join("\n");

        // APPLY has no ON clause; the correlation is already among the conditions.
        match &select.join {
            Some((_, JoinKind::Left)) => format!("OUTER APPLY (\n{}\n) {}", body, alias),
            Some((_, JoinKind::Inner)) => format!("CROSS APPLY (\n{}\n) {}", body, alias),
            None => format!("FROM (\n{}\n) {}", body, alias),
        }
    }

    fn batch_source(&self, scope: &BatchScope, _parent_key: &str) -> (String, String) {
        let value = self.quote("value");
        let rows: Vec<String> = scope
            .values()
            .iter()
            .map(|v| format!("SELECT {} AS {} FROM DUAL", self.literal(v), value))
            .collect();
        let temp = self.quote("temp");
        (
            format!("FROM ({}) {}", rows.join(" UNION "), temp),
            format!("{}.{}", temp, value),
        )
    }

    fn batch_key_operand(&self, column: String, _scope: &BatchScope) -> String {
        column
    }

    fn child_table_join(&self, table: &str, alias: &str, condition: &str) -> String {
        format!("LEFT JOIN {} {} ON {}", table, self.quote(alias), condition)
    }
}
