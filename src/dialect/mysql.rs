//! MySQL before 8.0: quoting and keys only, no pagination.

use super::DialectModule;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl DialectModule for MySql {
    fn name(&self) -> &'static str {
        "mysql"
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
}
