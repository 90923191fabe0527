//! MySQL 8, which renders exactly like MariaDB.

use async_trait::async_trait;

use super::{DialectModule, MariaDb, PaginationRequest, Technique};
use crate::error::PlanResult;
use crate::plan::{BatchScope, Scalar};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql8 {
    base: MariaDb,
}

#[async_trait]
impl DialectModule for MySql8 {
    fn name(&self) -> &'static str {
        "mysql8"
    }

    fn quote(&self, identifier: &str) -> String {
        self.base.quote(identifier)
    }

    fn composite_key(&self, table: &str, columns: &[String]) -> String {
        self.base.composite_key(table, columns)
    }

    fn unlimited_limit(&self) -> String {
        self.base.unlimited_limit()
    }

    fn literal(&self, value: &Scalar) -> String {
        self.base.literal(value)
    }

    fn supports(&self, technique: Technique) -> bool {
        self.base.supports(technique)
    }

    async fn handle_pagination_at_root(
        &self,
        req: &PaginationRequest<'_>,
    ) -> PlanResult<Vec<String>> {
        self.base.handle_pagination_at_root(req).await
    }

    async fn handle_batched_one_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        batch_scope: &BatchScope,
    ) -> PlanResult<Vec<String>> {
        self.base.handle_batched_one_to_many_paginated(req, batch_scope).await
    }

    async fn handle_batched_many_to_many_paginated(
        &self,
        req: &PaginationRequest<'_>,
        batch_scope: &BatchScope,
        join_to_child: &str,
    ) -> PlanResult<Vec<String>> {
        self.base
            .handle_batched_many_to_many_paginated(req, batch_scope, join_to_child)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pagination::interpret::PagingSettings;
    use crate::pagination::ordering::OrderColumn;
    use crate::plan::PlanNode;

    #[tokio::test]
    async fn test_joined_pagination_unsupported() {
        let node = PlanNode::new("posts", "posts", "posts")
            .sort_key(vec![OrderColumn::asc("id")])
            .paginated();
        let req = PaginationRequest {
            parent: None,
            node: &node,
            context: &(),
            settings: &PagingSettings::default(),
        };
        let err = MySql8::default()
            .handle_joined_one_to_many_paginated(&req, "TRUE")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPagination);
        assert!(err.to_string().contains("mysql8"));
    }

    #[tokio::test]
    async fn test_root_matches_mariadb_output() {
        let node = PlanNode::new("posts", "posts", "posts")
            .sort_key(vec![OrderColumn::asc("id")])
            .arg("first", 3)
            .paginated();
        let req = PaginationRequest {
            parent: None,
            node: &node,
            context: &(),
            settings: &PagingSettings::default(),
        };
        assert_eq!(
            MySql8::default().handle_pagination_at_root(&req).await.unwrap(),
            MariaDb.handle_pagination_at_root(&req).await.unwrap()
        );
    }
}
