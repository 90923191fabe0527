//! Sort columns, directions and their textual form.
//!
//! Sort specs can be written as JSON lists or as compact text:
//!
//! ```text
//! created_at DESC, id
//! ─────┬──── ──┬─  ─┬
//!      │       │    └── direction defaults to ASC
//!      │       └── ASC | DESC, any case
//!      └── column name
//! ```

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    multi::separated_list1,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PlanError;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    #[serde(alias = "asc")]
    Asc,
    #[serde(alias = "desc")]
    Desc,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    /// Comparison operator selecting rows that come after a value in this direction.
    pub fn seek_operator(self) -> &'static str {
        match self {
            Direction::Asc => ">",
            Direction::Desc => "<",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => f.write_str("ASC"),
            Direction::Desc => f.write_str("DESC"),
        }
    }
}

/// One column of an ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderColumn {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderColumn {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// An ordering bound to the table alias its columns live on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub table: String,
    pub columns: Vec<OrderColumn>,
}

impl Order {
    pub fn new(table: impl Into<String>, columns: Vec<OrderColumn>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Render as an ORDER BY list, e.g. `"posts"."id" ASC, "posts"."title" DESC`.
    pub fn to_sql(&self, quote: impl Fn(&str) -> String) -> String {
        let table = quote(&self.table);
        self.columns
            .iter()
            .map(|c| format!("{}.{} {}", table, quote(&c.column), c.direction))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Parse a textual sort spec such as `created_at DESC, id`.
pub fn parse_sort_spec(input: &str) -> Result<Vec<OrderColumn>, PlanError> {
    match all_consuming(sort_spec)(input.trim()) {
        Ok((_, columns)) => Ok(columns),
        Err(e) => Err(PlanError::plan(format!(
            "cannot parse sort spec '{}': {:?}",
            input, e
        ))),
    }
}

fn sort_spec(input: &str) -> IResult<&str, Vec<OrderColumn>> {
    separated_list1(
        delimited(multispace0, char(','), multispace0),
        order_column,
    )(input)
}

fn order_column(input: &str) -> IResult<&str, OrderColumn> {
    map(
        pair(identifier, opt(preceded(multispace1, direction))),
        |(column, direction)| OrderColumn {
            column: column.to_string(),
            direction: direction.unwrap_or_default(),
        },
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '$')(input)
}

fn direction(input: &str) -> IResult<&str, Direction> {
    alt((
        value(Direction::Desc, tag_no_case("desc")),
        value(Direction::Asc, tag_no_case("asc")),
    ))(input)
}

/// Newtype so a sort spec can be parsed with `str::parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec(pub Vec<OrderColumn>);

impl FromStr for SortSpec {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_sort_spec(s).map(SortSpec)
    }
}

/// Deserialize an optional ordering given either as text or as a list of columns.
pub fn deserialize_ordering<'de, D>(deserializer: D) -> Result<Option<Vec<OrderColumn>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Columns(Vec<OrderColumn>),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Columns(columns)) => Ok(Some(columns)),
        Some(Repr::Text(text)) => parse_sort_spec(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
