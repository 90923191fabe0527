//! MariaDB (10.2 and later), also the base of mysql8.
//!
//! Neither server has a lateral join, so a batch becomes one bounded subselect
//! per parent key, combined with `UNION`. Joined pagination is not rendered.

use async_trait::async_trait;
use tracing::debug;

use super::{
    child_extra_join, paging_predicates, DialectModule, PagedSelect, PaginationRequest,
    Technique, TOTAL_COLUMN,
};
use crate::error::{PlanError, PlanResult};
use crate::pagination::interpret::interpret;
use crate::plan::BatchScope;

#[derive(Debug, Clone, Copy, Default)]
pub struct MariaDb;

impl MariaDb {
    fn select_list(&self, select: &PagedSelect<'_>) -> String {
        let alias = self.quote(select.alias);
        if select.with_total() {
            format!("{}.*, count(*) OVER () AS {}", alias, self.quote(TOTAL_COLUMN))
        } else {
            format!("{}.*", alias)
        }
    }

    /// Root pages are a plain derived table.
    fn derived_select(&self, select: &PagedSelect<'_>) -> String {
        let alias = self.quote(select.alias);
        let limit = select.limit.render(self);
        let window = match select.offset {
            Some(offset) => format!("LIMIT {} OFFSET {}", limit, offset),
            None => format!("LIMIT {}", limit),
        };
        [
            "FROM (".to_string(),
            format!("  SELECT {}", self.select_list(select)),
            format!("  FROM {} {}", select.table, alias),
            format!("  WHERE {}", select.where_clause("TRUE")),
            format!("  ORDER BY {}", select.order.to_sql(|s| self.quote(s))),
            format!("  {}", window),
            format!(") {}", alias),
        ]
        .join("\n")
    }

    /// One parenthesised member of a batch union.
    fn union_member(&self, select: &PagedSelect<'_>) -> String {
        let alias = self.quote(select.alias);
        let mut limit = format!("LIMIT {}", select.limit.render(self));
        if let Some(offset) = select.offset.filter(|o| *o > 0) {
            limit.push_str(&format!(" OFFSET {}", offset));
        }

        let mut lines = vec![
            format!("  (SELECT {}", self.select_list(select)),
            format!("  FROM {} {}", select.table, alias),
        ];
        if let Some(extra) = &select.extra_join {
            lines.push(format!(
                "  LEFT JOIN {} {} ON {}",
                extra.table,
                self.quote(&extra.alias),
                extra.condition
            ));
        }
        lines.push(format!("  WHERE {}", select.where_clause("1")));
        lines.push(format!("  ORDER BY {}", select.order.to_sql(|s| self.quote(s))));
        lines.push(format!("  {})", limit));
        lines.join("\n")
    }

    fn join_unions(&self, members: Vec<String>, alias: &str) -> String {
        format!("FROM (\n{}\n) AS {}", members.join("\nUNION\n"), self.quote(alias))
    }

    /// Render one union member per batch value, each filtered to that value.
    async fn batch_union(
        &self,
        req: &PaginationRequest<'_>,
        scope: &BatchScope,
        table: &str,
        alias: &str,
        this_key: &str,
        join_to_child: Option<&str>,
    ) -> PlanResult<String> {
        let node = req.node;
        let paging = interpret(node, self, req.settings)?;
        let mut shared = paging_predicates(self, req).await?;
        shared.extend(paging.seek_condition().cloned());

        let key = format!("{}.{}", self.quote(alias), self.quote(this_key));
        let extra_join = join_to_child.and_then(|join| child_extra_join(node, join));
        let members = scope
            .values()
            .iter()
            .map(|value| {
                let mut conditions = shared.clone();
                conditions.push(format!("{} = {}", key, self.literal(value)));
                let select = PagedSelect::new(table, alias, conditions, &paging)
                    .with_extra_join(extra_join.clone());
                self.union_member(&select)
            })
            .collect();
        Ok(self.join_unions(members, alias))
    }
}

#[async_trait]
impl DialectModule for MariaDb {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier)
    }

    fn composite_key(&self, table: &str, columns: &[String]) -> String {
        let keys: Vec<String> = columns
            .iter()
            .map(|c| format!("{}.{}", self.quote(table), self.quote(c)))
            .collect();
        format!("CONCAT({})", keys.join(", "))
    }

    fn supports(&self, technique: Technique) -> bool {
        matches!(
            technique,
            Technique::Root | Technique::BatchedOneToMany | Technique::BatchedManyToMany
        )
    }

    async fn handle_pagination_at_root(
        &self,
        req: &PaginationRequest<'_>,
    ) -> PlanResult<Vec<String>> {
        let node = req.node;
        let paging = interpret(node, self, req.settings)?;
        let mut conditions = paging_predicates(self, req).await?;
        conditions.extend(paging.seek_condition().cloned());

        debug!(dialect = self.name(), node = %node.alias, technique = %Technique::Root, "paginating");
        let select = PagedSelect::new(&node.sql_table, &node.alias, conditions, &paging);
        Ok(vec![self.derived_select(&select)])
    }

    async fn handle_batched_one_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        batch_scope: &BatchScope,
    ) -> PlanResult<Vec<String>> {
        let node = req.node;
        let batch = node
            .sql_batch
            .as_ref()
            .ok_or_else(|| PlanError::plan(format!("'{}' has no sqlBatch", node.name)))?;

        debug!(dialect = self.name(), node = %node.alias, parents = batch_scope.len(), technique = %Technique::BatchedOneToMany, "paginating");
        let union = self
            .batch_union(req, batch_scope, &node.sql_table, &node.alias, &batch.this_key, None)
            .await?;
        Ok(vec![union])
    }

    async fn handle_batched_many_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        batch_scope: &BatchScope,
        join_to_child: &str,
    ) -> PlanResult<Vec<String>> {
        let node = req.node;
        let junction = node
            .junction
            .as_ref()
            .ok_or_else(|| PlanError::plan(format!("'{}' has no junction", node.name)))?;
        let batch = junction
            .sql_batch
            .as_ref()
            .ok_or_else(|| PlanError::plan(format!("'{}' has no junction sqlBatch", node.name)))?;

        debug!(dialect = self.name(), node = %node.alias, parents = batch_scope.len(), technique = %Technique::BatchedManyToMany, "paginating");
        let union = self
            .batch_union(
                req,
                batch_scope,
                &junction.sql_table,
                &junction.alias,
                &batch.this_key,
                Some(join_to_child),
            )
            .await?;
        Ok(vec![
            union,
            format!(
                "LEFT JOIN {} AS {} ON {}",
                node.sql_table,
                self.quote(&node.alias),
                join_to_child
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::interpret::Limit;
    use crate::pagination::ordering::{Order, OrderColumn};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_composite_key() {
        let key = MariaDb.composite_key("u", &["a".to_string(), "b".to_string()]);
        assert_eq!(key, "CONCAT(`u`.`a`, `u`.`b`)");
    }

    #[test]
    fn test_union_member_omits_zero_offset() {
        let order = Order::new("posts", vec![OrderColumn::desc("id")]);
        let select = PagedSelect {
            table: "posts",
            alias: "posts",
            conditions: vec!["`posts`.`author_id` = 3".to_string()],
            order: &order,
            limit: Limit::Rows(4),
            offset: Some(0),
            join: None,
            extra_join: None,
        };
        assert_eq!(
            MariaDb.union_member(&select),
            "  (SELECT `posts`.*, count(*) OVER () AS `$total`\n  FROM posts `posts`\n  WHERE `posts`.`author_id` = 3\n  ORDER BY `posts`.`id` DESC\n  LIMIT 4)"
        );

        let select = PagedSelect {
            offset: Some(8),
            conditions: vec![],
            ..select
        };
        let member = MariaDb.union_member(&select);
        assert!(member.contains("WHERE 1\n"));
        assert!(member.ends_with("LIMIT 4 OFFSET 8)"));
    }

    #[test]
    fn test_join_unions() {
        let sql = MariaDb.join_unions(vec!["  (A)".into(), "  (B)".into()], "posts");
        assert_eq!(sql, "FROM (\n  (A)\nUNION\n  (B)\n) AS `posts`");
    }
}
