//! Per-subtree SQL fragments and their layout as one statement.

use std::collections::HashSet;

use super::Deferred;

/// Fragments produced by one subtree, merged into the parent's in child order.
#[derive(Debug, Default)]
pub(crate) struct Fragments {
    pub selections: Vec<String>,
    pub tables: Vec<String>,
    pub wheres: Vec<String>,
    pub orders: Vec<String>,
    pub deferred: Vec<Deferred>,
}

impl Fragments {
    pub fn append(&mut self, other: Fragments) {
        self.selections.extend(other.selections);
        self.tables.extend(other.tables);
        self.wheres.extend(other.wheres);
        self.orders.extend(other.orders);
        self.deferred.extend(other.deferred);
    }

    /// Lay the fragments out as a statement. Repeated selections are kept once.
    pub fn to_statement(&self) -> String {
        let mut seen = HashSet::new();
        let selections: Vec<&str> = self
            .selections
            .iter()
            .map(String::as_str)
            .filter(|s| seen.insert(*s))
            .collect();

        let mut sql = format!("SELECT\n  {}", selections.join(",\n  "));
        for table in &self.tables {
            sql.push('\n');
            sql.push_str(table);
        }
        if !self.wheres.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        if !self.orders.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        sql
    }
}
