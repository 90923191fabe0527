//! Predicate hooks attached to plan nodes.
//!
//! A `where` hook yields an optional condition for one table alias; a join hook
//! yields the condition linking two aliases. Both are async so they can consult
//! external services (authorization, feature flags) before answering.
//!
//! Plan files give hooks as templates:
//!
//! | Hook  | Template                              | Placeholders          |
//! |-------|---------------------------------------|-----------------------|
//! | where | `{table}.deleted_at IS NULL`          | `{table}`             |
//! | join  | `{parent}.id = {child}.author_id`     | `{parent}`, `{child}` |

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::BoxError;
use crate::plan::PlanNode;

/// Field arguments of a node, as received from the query.
pub type Args = serde_json::Map<String, serde_json::Value>;

/// Opaque per-request value handed through to every hook.
pub type Context = dyn Any + Send + Sync;

/// Produces a filter condition for a table alias.
#[async_trait]
pub trait WherePredicate: Send + Sync {
    /// `table` is already quoted for the active dialect. `None` adds nothing.
    async fn predicate(
        &self,
        table: &str,
        args: &Args,
        context: &Context,
        node: &PlanNode,
    ) -> Result<Option<String>, BoxError>;
}

/// Produces the condition joining a parent alias to a child alias.
#[async_trait]
pub trait JoinPredicate: Send + Sync {
    async fn condition(
        &self,
        parent: &str,
        child: &str,
        args: &Args,
        context: &Context,
        node: &PlanNode,
    ) -> Result<String, BoxError>;
}

/// Shared handle to a [`WherePredicate`].
#[derive(Clone)]
pub struct WhereHook(Arc<dyn WherePredicate>);

impl WhereHook {
    pub fn new(predicate: impl WherePredicate + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// A fixed condition; `{table}` is replaced by the quoted alias.
    pub fn sql(template: impl Into<String>) -> Self {
        Self::new(WhereTemplate(template.into()))
    }

    /// Wrap a synchronous closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str, &Args, &Context) -> Result<Option<String>, BoxError> + Send + Sync + 'static,
    {
        Self::new(WhereFn(f))
    }

    pub async fn evaluate(
        &self,
        table: &str,
        args: &Args,
        context: &Context,
        node: &PlanNode,
    ) -> Result<Option<String>, BoxError> {
        let condition = self.0.predicate(table, args, context, node).await?;
        Ok(condition.filter(|c| !c.trim().is_empty()))
    }
}

impl fmt::Debug for WhereHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WhereHook")
    }
}

impl<'de> Deserialize<'de> for WhereHook {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(WhereHook::sql)
    }
}

/// Shared handle to a [`JoinPredicate`].
#[derive(Clone)]
pub struct JoinHook(Arc<dyn JoinPredicate>);

impl JoinHook {
    pub fn new(predicate: impl JoinPredicate + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// A fixed condition; `{parent}` and `{child}` are replaced by quoted aliases.
    pub fn sql(template: impl Into<String>) -> Self {
        Self::new(JoinTemplate(template.into()))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str, &str, &Args, &Context) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        Self::new(JoinFn(f))
    }

    pub async fn evaluate(
        &self,
        parent: &str,
        child: &str,
        args: &Args,
        context: &Context,
        node: &PlanNode,
    ) -> Result<String, BoxError> {
        self.0.condition(parent, child, args, context, node).await
    }
}

impl fmt::Debug for JoinHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JoinHook")
    }
}

impl<'de> Deserialize<'de> for JoinHook {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(JoinHook::sql)
    }
}

struct WhereTemplate(String);

#[async_trait]
impl WherePredicate for WhereTemplate {
    async fn predicate(
        &self,
        table: &str,
        _args: &Args,
        _context: &Context,
        _node: &PlanNode,
    ) -> Result<Option<String>, BoxError> {
        Ok(Some(self.0.replace("{table}", table)))
    }
}

struct JoinTemplate(String);

#[async_trait]
impl JoinPredicate for JoinTemplate {
    async fn condition(
        &self,
        parent: &str,
        child: &str,
        _args: &Args,
        _context: &Context,
        _node: &PlanNode,
    ) -> Result<String, BoxError> {
        Ok(self
            .0
            .replace("{parent}", parent)
            .replace("{child}", child))
    }
}

struct WhereFn<F>(F);

#[async_trait]
impl<F> WherePredicate for WhereFn<F>
where
    F: Fn(&str, &Args, &Context) -> Result<Option<String>, BoxError> + Send + Sync,
{
    async fn predicate(
        &self,
        table: &str,
        args: &Args,
        context: &Context,
        _node: &PlanNode,
    ) -> Result<Option<String>, BoxError> {
        (self.0)(table, args, context)
    }
}

struct JoinFn<F>(F);

#[async_trait]
impl<F> JoinPredicate for JoinFn<F>
where
    F: Fn(&str, &str, &Args, &Context) -> Result<String, BoxError> + Send + Sync,
{
    async fn condition(
        &self,
        parent: &str,
        child: &str,
        args: &Args,
        context: &Context,
        _node: &PlanNode,
    ) -> Result<String, BoxError> {
        (self.0)(parent, child, args, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_where_template() {
        let node = PlanNode::new("posts", "posts", "posts");
        let hook = WhereHook::sql("{table}.archived = FALSE");
        let out = hook
            .evaluate("\"posts\"", &Args::new(), &(), &node)
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("\"posts\".archived = FALSE"));
    }

    #[tokio::test]
    async fn test_blank_where_is_dropped() {
        let node = PlanNode::new("posts", "posts", "posts");
        let hook = WhereHook::from_fn(|_, _, _| Ok(Some("  ".to_string())));
        let out = hook
            .evaluate("\"posts\"", &Args::new(), &(), &node)
            .await
            .unwrap();
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_from_fn_sees_context_and_args() {
        let node = PlanNode::new("posts", "posts", "posts");
        let hook = WhereHook::from_fn(|table, args, ctx| {
            let user = ctx.downcast_ref::<i64>().ok_or("missing user")?;
            let status = args.get("status").and_then(|v| v.as_str()).unwrap_or("open");
            Ok(Some(format!("{}.owner = {} AND {}.status = '{}'", table, user, table, status)))
        });
        let mut args = Args::new();
        args.insert("status".into(), "closed".into());
        let out = hook.evaluate("p", &args, &42i64, &node).await.unwrap();
        assert_eq!(out.as_deref(), Some("p.owner = 42 AND p.status = 'closed'"));

        let err = hook.evaluate("p", &args, &"nope", &node).await.unwrap_err();
        assert_eq!(err.to_string(), "missing user");
    }

    #[tokio::test]
    async fn test_join_template_from_json() {
        let node = PlanNode::new("posts", "posts", "posts");
        let hook: JoinHook =
            serde_json::from_str(r#""{parent}.id = {child}.author_id""#).unwrap();
        let out = hook
            .evaluate("\"u\"", "\"p\"", &Args::new(), &(), &node)
            .await
            .unwrap();
        assert_eq!(out, "\"u\".id = \"p\".author_id");
    }
}
