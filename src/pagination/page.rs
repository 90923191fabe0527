//! Trimming the sentinel row off a fetched page and computing its metadata.

use serde::Serialize;

use crate::dialect::TOTAL_COLUMN;
use crate::error::{PlanError, PlanResult};
use crate::executor::{node_columns, Row};
use crate::pagination::cursor::{offset_to_cursor, Cursor};
use crate::pagination::interpret::Paging;
use crate::pagination::ordering::Order;
use crate::plan::{PlanNode, Scalar};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub cursor: String,
    pub node: Row,
}

/// One page of a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
    /// Row count over all pages, known in offset mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Page {
    /// Build a page of `node` from the rows its statement returned, in query order.
    ///
    /// Rows carry the statement's `alias__column` names; cursors and the total are
    /// read from them, and each edge keeps only the columns of `node`. The sentinel
    /// row beyond the page size is dropped and only recorded as "has more";
    /// backward keyset pages are put back into sort-key order.
    pub fn from_rows(mut rows: Vec<Row>, node: &PlanNode, paging: &Paging) -> PlanResult<Self> {
        let has_more = match paging.limit().page_size() {
            Some(size) if rows.len() as u64 > size => {
                rows.truncate(size as usize);
                true
            }
            _ => false,
        };

        let (edges, has_next_page, has_previous_page, total) = match paging {
            Paging::Keyset(keyset) => {
                if keyset.backward {
                    rows.reverse();
                }
                let edges = rows
                    .into_iter()
                    .map(|row| {
                        let cursor = keyset_cursor(&row, &keyset.order)?;
                        Ok(Edge {
                            cursor,
                            node: node_columns(&row, &node.alias),
                        })
                    })
                    .collect::<PlanResult<Vec<_>>>()?;
                (
                    edges,
                    has_more && !keyset.backward,
                    has_more && keyset.backward,
                    None,
                )
            }
            Paging::Offset(offset) => {
                let paged_table = node.junction.as_ref().map_or(&node.alias, |j| &j.alias);
                let total_column = format!("{}__{}", paged_table, TOTAL_COLUMN);
                let total = rows
                    .first()
                    .and_then(|row| row.get(&total_column))
                    .and_then(total_of);
                let edges = rows
                    .iter()
                    .enumerate()
                    .map(|(i, row)| {
                        let mut columns = node_columns(row, &node.alias);
                        columns.remove(TOTAL_COLUMN);
                        Edge {
                            cursor: offset_to_cursor(offset.offset + i as u64),
                            node: columns,
                        }
                    })
                    .collect();
                (edges, has_more, offset.offset > 0, total)
            }
        };

        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };
        Ok(Page {
            edges,
            page_info,
            total,
        })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Sort values are selected as `table__column`, where `table` is the alias the sort key lives on.
fn keyset_cursor(row: &Row, order: &Order) -> PlanResult<String> {
    let mut cursor = Cursor::new();
    for column in &order.columns {
        let value = row
            .get(&format!("{}__{}", order.table, column.column))
            .and_then(Scalar::from_json)
            .filter(|v| *v != Scalar::Null)
            .ok_or_else(|| {
                PlanError::cursor(format!(
                    "row has no usable value for sort column '{}'",
                    column.column
                ))
            })?;
        cursor = cursor.with(column.column.clone(), value);
    }
    Ok(cursor.encode())
}

fn total_of(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pagination::interpret::{KeysetPaging, Limit, OffsetPaging};
    use crate::pagination::ordering::OrderColumn;
    use crate::plan::Junction;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(id: i64) -> Row {
        Row::from([("users__id".to_string(), json!(id))])
    }

    fn users() -> PlanNode {
        PlanNode::new("users", "accounts", "users").columns(["id"])
    }

    fn keyset(limit: u64, backward: bool) -> Paging {
        let direction = if backward {
            OrderColumn::desc("id")
        } else {
            OrderColumn::asc("id")
        };
        Paging::Keyset(KeysetPaging {
            limit: Limit::Rows(limit),
            order: Order::new("users", vec![direction]),
            where_condition: None,
            backward,
        })
    }

    #[test]
    fn test_keyset_trims_sentinel() {
        let page = Page::from_rows(vec![row(1), row(2), row(3)], &users(), &keyset(3, false)).unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.page_info.has_next_page);
        assert!(!page.page_info.has_previous_page);
        assert_eq!(
            page.page_info.end_cursor,
            Some(Cursor::new().with("id", 2).encode())
        );
    }

    #[test]
    fn test_keyset_last_page() {
        let page = Page::from_rows(vec![row(5)], &users(), &keyset(3, false)).unwrap();
        assert_eq!(page.len(), 1);
        assert!(!page.page_info.has_next_page);
    }

    #[test]
    fn test_backward_page_is_reversed() {
        let page = Page::from_rows(vec![row(4), row(3), row(2)], &users(), &keyset(3, true)).unwrap();
        let ids: Vec<_> = page.edges.iter().map(|e| e.node["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(4)]);
        assert!(page.page_info.has_previous_page);
        assert!(!page.page_info.has_next_page);
    }

    #[test]
    fn test_keyset_requires_sort_values() {
        let rows = vec![Row::from([("users__name".to_string(), json!("x"))])];
        let err = Page::from_rows(rows, &users(), &keyset(3, false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCursor);
    }

    #[test]
    fn test_offset_page_reads_total() {
        let paging = Paging::Offset(OffsetPaging {
            limit: Limit::Rows(3),
            offset: 4,
            order: Order::new("users", vec![OrderColumn::asc("id")]),
        });
        let rows = (5..8)
            .map(|id| {
                let mut r = row(id);
                r.insert("users__$total".to_string(), json!("9"));
                r
            })
            .collect();
        let page = Page::from_rows(rows, &users(), &paging).unwrap();
        assert_eq!(page.total, Some(9));
        assert_eq!(page.len(), 2);
        assert!(page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
        assert_eq!(page.page_info.start_cursor, Some(offset_to_cursor(4)));
        assert!(!page.edges[0].node.contains_key(TOTAL_COLUMN));
        assert_eq!(page.edges[0].node, Row::from([("id".to_string(), json!(5))]));
    }

    #[test]
    fn test_cursor_reads_junction_sort_values() {
        let tags = PlanNode::new("tags", "tags", "tags")
            .columns(["id"])
            .junction(Junction::new("user_tags", "ut"));
        let paging = Paging::Keyset(KeysetPaging {
            limit: Limit::Rows(2),
            order: Order::new("ut", vec![OrderColumn::desc("created_at")]),
            where_condition: None,
            backward: false,
        });
        let rows = vec![Row::from([
            ("tags__id".to_string(), json!(7)),
            ("ut__created_at".to_string(), json!("2024-01-02")),
        ])];
        let page = Page::from_rows(rows, &tags, &paging).unwrap();
        assert_eq!(
            page.page_info.end_cursor,
            Some(Cursor::new().with("created_at", "2024-01-02").encode())
        );
        assert_eq!(page.edges[0].node, Row::from([("id".to_string(), json!(7))]));
    }
}
