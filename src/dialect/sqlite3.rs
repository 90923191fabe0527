//! SQLite 3: quoting and keys only, no pagination.

use super::DialectModule;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite3;

impl DialectModule for Sqlite3 {
    fn name(&self) -> &'static str {
        "sqlite3"
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier)
    }

    fn composite_key(&self, table: &str, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| format!("{}.{}", self.quote(table), self.quote(c)))
            .collect::<Vec<_>>()
            .join(" || ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PaginationRequest;
    use crate::error::ErrorKind;
    use crate::pagination::interpret::PagingSettings;
    use crate::plan::PlanNode;

    #[test]
    fn test_composite_key() {
        assert_eq!(
            Sqlite3.composite_key("u", &["a".to_string(), "b".to_string()]),
            "\"u\".\"a\" || \"u\".\"b\""
        );
    }

    #[tokio::test]
    async fn test_root_pagination_unsupported() {
        let node = PlanNode::new("users", "users", "users").paginated();
        let req = PaginationRequest {
            parent: None,
            node: &node,
            context: &(),
            settings: &PagingSettings::default(),
        };
        let err = Sqlite3.handle_pagination_at_root(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedPagination);
        assert_eq!(
            err.to_string(),
            "root pagination is not supported on the sqlite3 dialect"
        );
    }
}
