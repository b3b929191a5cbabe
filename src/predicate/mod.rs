//! Predicate algebra.
//!
//! # Data Flow
//! ```text
//! PredicateSpec (name + args)
//!     → registry.rs (factory lookup, argument binding, validation)
//!     → factory (path.rs, host.rs, fields.rs, time.rs, remote_addr.rs)
//!     → Predicate::Leaf
//!     → combined with And/Or/Not into one tree per route
//!
//! Request time:
//!     Predicate::evaluate(exchange)
//!     → left-to-right, short-circuiting
//! ```
//!
//! # Design Decisions
//! - The tree is a plain enum; only leaves are trait objects
//! - Leaf tests are async so a predicate may suspend without blocking
//! - AND/OR never evaluate the right operand when the left decides the result

pub mod fields;
pub mod host;
pub mod path;
pub mod registry;
pub mod remote_addr;
pub mod time;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use crate::error::PredicateError;
use crate::http::exchange::Exchange;

pub use registry::{PredicateFactory, PredicateFactoryRegistry, PredicateKind, ShortcutType};

/// A leaf test over a request.
#[async_trait]
pub trait RoutePredicate: Send + Sync + fmt::Display {
    /// Returns true if the request satisfies this condition.
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError>;

    /// Bound configuration, for diagnostics.
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// A predicate tree.
#[derive(Clone)]
pub enum Predicate {
    Leaf(Arc<dyn RoutePredicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn leaf(predicate: impl RoutePredicate + 'static) -> Self {
        Predicate::Leaf(Arc::new(predicate))
    }

    /// Matches every request.
    pub fn always() -> Self {
        Self::from_fn("Always", |_| true)
    }

    /// Wrap a synchronous closure as a leaf.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Exchange) -> bool + Send + Sync + 'static,
    {
        Self::leaf(FnPredicate {
            name: name.into(),
            f: Box::new(f),
        })
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Evaluate the tree against a request.
    ///
    /// Operands are evaluated in order and sequentially; a leaf error aborts the
    /// evaluation and is returned to the caller.
    pub fn evaluate<'a>(
        &'a self,
        exchange: &'a mut Exchange,
    ) -> BoxFuture<'a, Result<bool, PredicateError>> {
        Box::pin(async move {
            match self {
                Predicate::Leaf(p) => p.test(exchange).await,
                Predicate::And(left, right) => {
                    if !left.evaluate(exchange).await? {
                        return Ok(false);
                    }
                    right.evaluate(exchange).await
                }
                Predicate::Or(left, right) => {
                    if left.evaluate(exchange).await? {
                        return Ok(true);
                    }
                    right.evaluate(exchange).await
                }
                Predicate::Not(inner) => Ok(!inner.evaluate(exchange).await?),
            }
        })
    }

    /// Visit every leaf, left to right.
    pub fn walk(&self, visit: &mut dyn FnMut(&dyn RoutePredicate)) {
        match self {
            Predicate::Leaf(p) => visit(p.as_ref()),
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Predicate::Not(inner) => inner.walk(visit),
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Leaf(p) => write!(f, "{}", p),
            Predicate::And(left, right) => write!(f, "({} && {})", left, right),
            Predicate::Or(left, right) => write!(f, "({} || {})", left, right),
            Predicate::Not(inner) => write!(f, "!{}", inner),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self)
    }
}

struct FnPredicate {
    name: String,
    f: Box<dyn Fn(&Exchange) -> bool + Send + Sync>,
}

#[async_trait]
impl RoutePredicate for FnPredicate {
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError> {
        Ok((self.f)(&*exchange))
    }
}

impl fmt::Display for FnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
