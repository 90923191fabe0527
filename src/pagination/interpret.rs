//! Turning a node's pagination arguments into limit, offset, order and seek predicate.

use serde::Deserialize;
use tracing::{trace, warn};

use crate::dialect::DialectModule;
use crate::error::{PlanError, PlanResult};
use crate::pagination::cursor::{cursor_to_offset, Cursor};
use crate::pagination::ordering::{Order, OrderColumn};
use crate::plan::{Args, PagingMode, PlanNode, Scalar};

/// Page size limits applied to every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PagingSettings {
    /// Requests above this size are clamped.
    pub max_page_size: Option<u64>,
    /// Page size used when the request names none.
    pub default_page_size: Option<u64>,
}

/// Relay-style connection arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageArgs {
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl PageArgs {
    /// Read connection arguments from a node's argument bag.
    pub fn from_args(args: &Args) -> PlanResult<Self> {
        let parsed = Self {
            first: count_arg(args, "first")?,
            last: count_arg(args, "last")?,
            after: cursor_arg(args, "after")?,
            before: cursor_arg(args, "before")?,
        };
        if parsed.first.is_some() && parsed.last.is_some() {
            return Err(PlanError::InvalidArguments(
                "\"first\" and \"last\" cannot be combined".to_string(),
            ));
        }
        Ok(parsed)
    }
}

fn count_arg(args: &Args, name: &str) -> PlanResult<Option<u64>> {
    let invalid = || {
        PlanError::InvalidArguments(format!("\"{}\" must be a non-negative integer", name))
    };
    match args.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(serde_json::Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn cursor_arg(args: &Args, name: &str) -> PlanResult<Option<String>> {
    match args.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PlanError::InvalidArguments(format!(
            "\"{}\" must be a cursor string",
            name
        ))),
    }
}

/// A LIMIT value: a row count or the dialect's "no limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Rows(u64),
    Unlimited,
}

impl Limit {
    /// One more row than the page holds, so the caller can see whether another page exists.
    fn for_page(page_size: Option<u64>) -> Self {
        match page_size {
            Some(n) => Limit::Rows(n.saturating_add(1)),
            None => Limit::Unlimited,
        }
    }

    pub fn render(&self, dialect: &dyn DialectModule) -> String {
        match self {
            Limit::Rows(n) => n.to_string(),
            Limit::Unlimited => dialect.unlimited_limit(),
        }
    }

    /// Number of rows that belong to the page, excluding the sentinel.
    pub fn page_size(&self) -> Option<u64> {
        match self {
            Limit::Rows(n) => Some(n.saturating_sub(1)),
            Limit::Unlimited => None,
        }
    }
}

/// Offset interpretation of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPaging {
    pub limit: Limit,
    pub offset: u64,
    pub order: Order,
}

/// Keyset interpretation of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetPaging {
    pub limit: Limit,
    pub order: Order,
    /// Seek predicate; absent on the first page.
    pub where_condition: Option<String>,
    /// Paging with `last`/`before`, so `order` runs against the declared sort key.
    pub backward: bool,
}

/// Interpretation of a paginated node in whichever mode it pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paging {
    Keyset(KeysetPaging),
    Offset(OffsetPaging),
}

impl Paging {
    pub fn order(&self) -> &Order {
        match self {
            Paging::Keyset(k) => &k.order,
            Paging::Offset(o) => &o.order,
        }
    }

    pub fn limit(&self) -> Limit {
        match self {
            Paging::Keyset(k) => k.limit,
            Paging::Offset(o) => o.limit,
        }
    }

    /// Row skip count; only offset paging has one.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Paging::Keyset(_) => None,
            Paging::Offset(o) => Some(o.offset),
        }
    }

    pub fn seek_condition(&self) -> Option<&String> {
        match self {
            Paging::Keyset(k) => k.where_condition.as_ref(),
            Paging::Offset(_) => None,
        }
    }
}

/// Interpret a paginated node according to its paging mode.
pub fn interpret(
    node: &PlanNode,
    dialect: &dyn DialectModule,
    settings: &PagingSettings,
) -> PlanResult<Paging> {
    match node.paging_mode() {
        Some(PagingMode::Keyset) => {
            interpret_for_keyset_paging(node, dialect, settings).map(Paging::Keyset)
        }
        Some(PagingMode::Offset) => interpret_for_offset_paging(node, settings).map(Paging::Offset),
        None => Err(PlanError::plan(format!("'{}' is not paginated", node.name))),
    }
}

fn page_size(requested: Option<u64>, node: &PlanNode, settings: &PagingSettings) -> Option<u64> {
    let cap = match (node.limit, settings.max_page_size) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    let size = requested.or(node.limit).or(settings.default_page_size)?;
    match cap {
        Some(cap) if size > cap => {
            warn!(node = %node.alias, requested = size, cap, "page size clamped");
            Some(cap)
        }
        _ => Some(size),
    }
}

/// Order used by offset paging: the declared `orderBy`, else the node's unique key.
pub fn offset_order(node: &PlanNode) -> PlanResult<Order> {
    if let Some(columns) = &node.order_by {
        return Ok(Order::new(&node.alias, columns.clone()));
    }
    if let Some(junction) = &node.junction {
        if let Some(columns) = &junction.order_by {
            return Ok(Order::new(&junction.alias, columns.clone()));
        }
    }
    if node.unique_key.is_empty() {
        return Err(PlanError::plan(format!(
            "'{}' has no orderBy and no unique key to order by",
            node.name
        )));
    }
    Ok(Order::new(
        &node.alias,
        node.unique_key.iter().map(OrderColumn::asc).collect(),
    ))
}

/// Interpret a node for offset pagination.
pub fn interpret_for_offset_paging(
    node: &PlanNode,
    settings: &PagingSettings,
) -> PlanResult<OffsetPaging> {
    let args = PageArgs::from_args(&node.args)?;
    if args.last.is_some() || args.before.is_some() {
        return Err(PlanError::InvalidArguments(
            "backward pagination is not supported with offsets, use a sort key instead"
                .to_string(),
        ));
    }
    let order = offset_order(node)?;
    let offset = match &args.after {
        Some(cursor) => cursor_to_offset(cursor)?.saturating_add(1),
        None => 0,
    };
    let limit = Limit::for_page(page_size(args.first, node, settings));
    Ok(OffsetPaging {
        limit,
        offset,
        order,
    })
}

fn sort_key_of(node: &PlanNode) -> PlanResult<(&str, &[OrderColumn])> {
    if let Some(columns) = &node.sort_key {
        return Ok((node.alias.as_str(), columns.as_slice()));
    }
    match &node.junction {
        Some(junction) => match &junction.sort_key {
            Some(columns) => Ok((junction.alias.as_str(), columns.as_slice())),
            None => Err(PlanError::plan(format!("'{}' has no sort key", node.name))),
        },
        None => Err(PlanError::plan(format!("'{}' has no sort key", node.name))),
    }
}

fn directed(sort_key: &[OrderColumn], backward: bool) -> Vec<OrderColumn> {
    sort_key
        .iter()
        .map(|c| OrderColumn {
            column: c.column.clone(),
            direction: if backward {
                c.direction.reversed()
            } else {
                c.direction
            },
        })
        .collect()
}

/// Order the rows of a paginated node come back in, without decoding its cursor.
pub fn paging_order(node: &PlanNode) -> PlanResult<Order> {
    match node.paging_mode() {
        Some(PagingMode::Offset) => offset_order(node),
        Some(PagingMode::Keyset) => {
            let (table, sort_key) = sort_key_of(node)?;
            let backward = PageArgs::from_args(&node.args)?.last.is_some();
            Ok(Order::new(table, directed(sort_key, backward)))
        }
        None => Err(PlanError::plan(format!("'{}' is not paginated", node.name))),
    }
}

/// Interpret a node for keyset pagination.
///
/// The cursor is decoded and checked against the sort key before anything is
/// rendered, so a bad cursor never reaches SQL.
pub fn interpret_for_keyset_paging(
    node: &PlanNode,
    dialect: &dyn DialectModule,
    settings: &PagingSettings,
) -> PlanResult<KeysetPaging> {
    let args = PageArgs::from_args(&node.args)?;
    let (table, sort_key) = sort_key_of(node)?;
    if sort_key.is_empty() {
        return Err(PlanError::plan(format!("'{}' has an empty sort key", node.name)));
    }

    let backward = args.last.is_some();
    let (requested, cursor) = if backward {
        if args.after.is_some() {
            return Err(PlanError::InvalidArguments(
                "using \"after\" with \"last\" is nonsensical".to_string(),
            ));
        }
        (args.last, args.before.as_deref())
    } else {
        if args.before.is_some() {
            return Err(PlanError::InvalidArguments(
                "using \"before\" with \"first\" is nonsensical".to_string(),
            ));
        }
        (args.first, args.after.as_deref())
    };

    let columns = directed(sort_key, backward);

    let where_condition = match cursor {
        Some(cursor) => {
            let values = Cursor::decode(cursor)?.values_for(&columns)?;
            let condition = seek_predicate(&dialect.quote(table), &columns, &values, dialect)?;
            trace!(node = %node.alias, %condition, "keyset seek predicate");
            Some(condition)
        }
        None => None,
    };

    Ok(KeysetPaging {
        limit: Limit::for_page(page_size(requested, node, settings)),
        order: Order::new(table, columns),
        where_condition,
        backward,
    })
}

/// Expand "strictly after the cursor tuple" into plain comparisons.
///
/// For columns `c1..cn` and values `v1..vn` this is the disjunction over `i` of
/// `c1 = v1 AND ... AND c(i-1) = v(i-1) AND ci > vi`, with `<` for descending columns.
pub fn seek_predicate(
    table: &str,
    columns: &[OrderColumn],
    values: &[Scalar],
    dialect: &dyn DialectModule,
) -> PlanResult<String> {
    if columns.len() != values.len() || columns.is_empty() {
        return Err(PlanError::cursor(
            "cursor values do not line up with the sort key",
        ));
    }
    if let Some(i) = values.iter().position(|v| *v == Scalar::Null) {
        return Err(PlanError::cursor(format!(
            "cursor value for '{}' is null",
            columns[i].column
        )));
    }

    let operands: Vec<(String, String)> = columns
        .iter()
        .zip(values)
        .map(|(c, v)| (format!("{}.{}", table, dialect.quote(&c.column)), dialect.literal(v)))
        .collect();

    let disjuncts: Vec<String> = (0..columns.len())
        .map(|i| {
            let mut terms: Vec<String> = operands[..i]
                .iter()
                .map(|(col, val)| format!("{} = {}", col, val))
                .collect();
            let (col, val) = &operands[i];
            terms.push(format!("{} {} {}", col, columns[i].direction.seek_operator(), val));
            if terms.len() > 1 {
                format!("({})", terms.join(" AND "))
            } else {
                terms.remove(0)
            }
        })
        .collect();

    if disjuncts.len() == 1 {
        Ok(disjuncts.into_iter().next().unwrap_or_default())
    } else {
        Ok(format!("({})", disjuncts.join(" OR ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectName;
    use crate::error::ErrorKind;
    use crate::pagination::cursor::offset_to_cursor;
    use pretty_assertions::assert_eq;

    fn users() -> PlanNode {
        PlanNode::new("users", "accounts", "users")
            .unique_key(["id"])
            .paginated()
    }

    #[test]
    fn test_offset_limit_is_page_plus_one() {
        let node = users().order_by(vec![OrderColumn::asc("id")]).arg("first", 10);
        let paging = interpret_for_offset_paging(&node, &PagingSettings::default()).unwrap();
        assert_eq!(paging.limit, Limit::Rows(11));
        assert_eq!(paging.offset, 0);
        assert_eq!(paging.order, Order::new("users", vec![OrderColumn::asc("id")]));
    }

    #[test]
    fn test_offset_after_cursor() {
        let node = users()
            .order_by(vec![OrderColumn::desc("created_at")])
            .arg("first", "5")
            .arg("after", offset_to_cursor(4));
        let paging = interpret_for_offset_paging(&node, &PagingSettings::default()).unwrap();
        assert_eq!(paging.offset, 5);
        assert_eq!(paging.limit, Limit::Rows(6));
    }

    #[test]
    fn test_offset_rejects_last() {
        let node = users().order_by(vec![OrderColumn::asc("id")]).arg("last", 3);
        let err = interpret_for_offset_paging(&node, &PagingSettings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_offset_defaults_to_unique_key() {
        let mut node = users().arg("first", 2);
        node.unique_key = vec!["org_id".into(), "id".into()];
        let order = offset_order(&node).unwrap();
        assert_eq!(
            order.columns,
            vec![OrderColumn::asc("org_id"), OrderColumn::asc("id")]
        );
    }

    #[test]
    fn test_page_size_clamped() {
        let settings = PagingSettings {
            max_page_size: Some(50),
            default_page_size: Some(20),
        };
        let node = users().order_by(vec![OrderColumn::asc("id")]).arg("first", 500);
        let paging = interpret_for_offset_paging(&node, &settings).unwrap();
        assert_eq!(paging.limit, Limit::Rows(51));

        let node = users().order_by(vec![OrderColumn::asc("id")]);
        let paging = interpret_for_offset_paging(&node, &settings).unwrap();
        assert_eq!(paging.limit, Limit::Rows(21));

        let node = users().order_by(vec![OrderColumn::asc("id")]).limit(5).arg("first", 8);
        let paging = interpret_for_offset_paging(&node, &settings).unwrap();
        assert_eq!(paging.limit, Limit::Rows(6));
    }

    #[test]
    fn test_unlimited_without_page_size() {
        let node = users().order_by(vec![OrderColumn::asc("id")]);
        let paging = interpret_for_offset_paging(&node, &PagingSettings::default()).unwrap();
        assert_eq!(paging.limit, Limit::Unlimited);
        assert_eq!(paging.limit.render(DialectName::Pg.module().as_ref()), "ALL");
        assert_eq!(
            paging.limit.render(DialectName::Oracle.module().as_ref()),
            "18446744073709551615"
        );
    }

    #[test]
    fn test_keyset_first_page_has_no_seek() {
        let pg = DialectName::Pg.module();
        let node = users().sort_key(vec![OrderColumn::asc("id")]).arg("first", 2);
        let paging =
            interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default()).unwrap();
        assert_eq!(paging.limit, Limit::Rows(3));
        assert_eq!(paging.where_condition, None);
        assert!(!paging.backward);
    }

    #[test]
    fn test_keyset_after_cursor() {
        let pg = DialectName::Pg.module();
        let node = users()
            .sort_key(vec![OrderColumn::asc("id")])
            .arg("first", 2)
            .arg("after", Cursor::new().with("id", 2).encode());
        let paging =
            interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default()).unwrap();
        assert_eq!(paging.where_condition.as_deref(), Some("\"users\".\"id\" > 2"));
    }

    #[test]
    fn test_keyset_multi_column_expansion() {
        let pg = DialectName::Pg.module();
        let node = users()
            .sort_key(vec![OrderColumn::desc("created_at"), OrderColumn::asc("id")])
            .arg("first", 10)
            .arg(
                "after",
                Cursor::new().with("created_at", "2020-01-01").with("id", 7).encode(),
            );
        let paging =
            interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default()).unwrap();
        assert_eq!(
            paging.where_condition.unwrap(),
            "(\"users\".\"created_at\" < '2020-01-01' OR (\"users\".\"created_at\" = '2020-01-01' AND \"users\".\"id\" > 7))"
        );
    }

    #[test]
    fn test_keyset_backward_inverts() {
        let pg = DialectName::Pg.module();
        let node = users()
            .sort_key(vec![OrderColumn::asc("id")])
            .arg("last", 2)
            .arg("before", Cursor::new().with("id", 5).encode());
        let paging =
            interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default()).unwrap();
        assert!(paging.backward);
        assert_eq!(paging.order.columns, vec![OrderColumn::desc("id")]);
        assert_eq!(paging.where_condition.as_deref(), Some("\"users\".\"id\" < 5"));
    }

    #[test]
    fn test_keyset_rejects_bad_cursor_before_sql() {
        let pg = DialectName::Pg.module();
        let node = users()
            .sort_key(vec![OrderColumn::asc("id")])
            .arg("first", 2)
            .arg("after", "definitely not a cursor");
        let err = interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCursor);

        let node = users()
            .sort_key(vec![OrderColumn::asc("id")])
            .arg("first", 2)
            .arg("after", Cursor::new().with("email", "a@b.c").encode());
        let err = interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCursor);
    }

    #[test]
    fn test_keyset_rejects_mismatched_directions() {
        let pg = DialectName::Pg.module();
        let node = users()
            .sort_key(vec![OrderColumn::asc("id")])
            .arg("first", 2)
            .arg("before", Cursor::new().with("id", 1).encode());
        let err = interpret_for_keyset_paging(&node, pg.as_ref(), &PagingSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_paging_order_follows_direction() {
        let node = users().sort_key(vec![OrderColumn::asc("id")]).arg("last", 2);
        assert_eq!(
            paging_order(&node).unwrap(),
            Order::new("users", vec![OrderColumn::desc("id")])
        );
        let node = users().order_by(vec![OrderColumn::desc("name")]);
        assert_eq!(
            paging_order(&node).unwrap(),
            Order::new("users", vec![OrderColumn::desc("name")])
        );
    }

    #[test]
    fn test_seek_predicate_escapes_strings() {
        let pg = DialectName::Pg.module();
        let condition = seek_predicate(
            "\"t\"",
            &[OrderColumn::asc("name")],
            &[Scalar::from("O'Brien")],
            pg.as_ref(),
        )
        .unwrap();
        assert_eq!(condition, "\"t\".\"name\" > 'O''Brien'");
    }

    #[test]
    fn test_page_args_rejects_negative() {
        let mut args = Args::new();
        args.insert("first".into(), (-1).into());
        assert!(PageArgs::from_args(&args).is_err());
    }
}
