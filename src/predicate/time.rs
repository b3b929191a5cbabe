//! Time-window predicates: After, Before, Between.
//!
//! Instants are RFC 3339 timestamps with an offset, e.g.
//! `2024-01-20T17:42:47.789-07:00`. Comparisons use the current UTC time.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::PredicateError;
use crate::http::exchange::Exchange;
use crate::predicate::registry::{bind, PredicateConfig, PredicateKind};
use crate::predicate::{Predicate, PredicateFactory, RoutePredicate};

/// Which side of the configured instants the current time must be on.
#[derive(Debug, Clone, Copy)]
enum Window {
    After(DateTime<FixedOffset>),
    Before(DateTime<FixedOffset>),
    Between(DateTime<FixedOffset>, DateTime<FixedOffset>),
}

impl Window {
    fn contains(&self, now: DateTime<Utc>) -> bool {
        match *self {
            Window::After(start) => now > start,
            Window::Before(end) => now < end,
            Window::Between(start, end) => now > start && now < end,
        }
    }
}

#[derive(Debug)]
pub struct TimePredicate {
    window: Window,
}

impl TimePredicate {
    pub fn matches_at(&self, now: DateTime<Utc>) -> bool {
        self.window.contains(now)
    }
}

#[async_trait]
impl RoutePredicate for TimePredicate {
    async fn test(&self, _exchange: &mut Exchange) -> Result<bool, PredicateError> {
        Ok(self.matches_at(Utc::now()))
    }

    fn config(&self) -> Value {
        match self.window {
            Window::After(t) => serde_json::json!({ "datetime": t.to_rfc3339() }),
            Window::Before(t) => serde_json::json!({ "datetime": t.to_rfc3339() }),
            Window::Between(a, b) => serde_json::json!({
                "datetime1": a.to_rfc3339(),
                "datetime2": b.to_rfc3339(),
            }),
        }
    }
}

impl fmt::Display for TimePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window {
            Window::After(t) => write!(f, "After: {}", t.to_rfc3339()),
            Window::Before(t) => write!(f, "Before: {}", t.to_rfc3339()),
            Window::Between(a, b) => write!(f, "Between: {} and {}", a.to_rfc3339(), b.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstantConfig {
    pub datetime: DateTime<FixedOffset>,
}

impl PredicateConfig for InstantConfig {}

#[derive(Debug, Clone, Deserialize)]
pub struct BetweenConfig {
    pub datetime1: DateTime<FixedOffset>,
    pub datetime2: DateTime<FixedOffset>,
}

impl PredicateConfig for BetweenConfig {
    fn validate(&self) -> Result<(), String> {
        if self.datetime1 >= self.datetime2 {
            return Err(format!(
                "datetime1 ({}) must be before datetime2 ({})",
                self.datetime1.to_rfc3339(),
                self.datetime2.to_rfc3339()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TimeFactory {
    After,
    Before,
    Between,
}

impl PredicateFactory for TimeFactory {
    fn kind(&self) -> PredicateKind {
        match self {
            TimeFactory::After => PredicateKind::After,
            TimeFactory::Before => PredicateKind::Before,
            TimeFactory::Between => PredicateKind::Between,
        }
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        match self {
            TimeFactory::Between => &["datetime1", "datetime2"],
            _ => &["datetime"],
        }
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let window = match self {
            TimeFactory::After => Window::After(bind::<InstantConfig>(self.kind(), args)?.datetime),
            TimeFactory::Before => Window::Before(bind::<InstantConfig>(self.kind(), args)?.datetime),
            TimeFactory::Between => {
                let config: BetweenConfig = bind(self.kind(), args)?;
                Window::Between(config.datetime1, config.datetime2)
            }
        };
        Ok(Predicate::leaf(TimePredicate { window }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::testing::exchange;
    use serde_json::json;

    const PAST: &str = "2000-01-01T00:00:00Z";
    const FUTURE: &str = "2999-01-01T00:00:00+08:00";

    #[tokio::test]
    async fn test_after_and_before() {
        let mut ex = exchange("/");
        let after_past = TimeFactory::After.apply(&json!({"datetime": PAST})).unwrap();
        let after_future = TimeFactory::After.apply(&json!({"datetime": FUTURE})).unwrap();
        assert!(after_past.evaluate(&mut ex).await.unwrap());
        assert!(!after_future.evaluate(&mut ex).await.unwrap());

        let before_future = TimeFactory::Before.apply(&json!({"datetime": FUTURE})).unwrap();
        assert!(before_future.evaluate(&mut ex).await.unwrap());
    }

    #[tokio::test]
    async fn test_between() {
        let mut ex = exchange("/");
        let p = TimeFactory::Between
            .apply(&json!({"datetime1": PAST, "datetime2": FUTURE}))
            .unwrap();
        assert!(p.evaluate(&mut ex).await.unwrap());
    }

    #[test]
    fn test_between_requires_ordered_instants() {
        let err = TimeFactory::Between
            .apply(&json!({"datetime1": FUTURE, "datetime2": PAST}))
            .unwrap_err();
        assert!(err.to_string().contains("datetime1"));

        assert!(TimeFactory::Between
            .apply(&json!({"datetime1": PAST, "datetime2": PAST}))
            .is_err());
    }

    #[test]
    fn test_invalid_timestamp() {
        assert!(TimeFactory::After.apply(&json!({"datetime": "yesterday"})).is_err());
        assert!(TimeFactory::After.apply(&json!({})).is_err());
    }

    #[test]
    fn test_window_edges() {
        let start: DateTime<FixedOffset> = "2024-01-01T00:00:00Z".parse().unwrap();
        let p = TimePredicate {
            window: Window::After(start),
        };
        assert!(!p.matches_at(start.with_timezone(&Utc)));
        assert!(p.matches_at(start.with_timezone(&Utc) + chrono::Duration::seconds(1)));
    }
}
