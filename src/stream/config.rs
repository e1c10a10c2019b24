use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::QueryBuilder;

/// Deserializable stream settings.
///
/// ```
/// use streambase_rust::StreamConfig;
///
/// let config: StreamConfig = serde_json::from_str(
///     r#"{ "query": { "order_by": { "child": "score" }, "limit": 10 }, "batch_delay_ms": 0 }"#,
/// )
/// .unwrap();
/// assert_eq!(config.batch_delay(), Some(None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub query: QueryBuilder,
    /// Coalescing delay in milliseconds. `0` delivers every call immediately;
    /// absent keeps the mode's default.
    pub batch_delay_ms: Option<u64>,
}

impl StreamConfig {
    pub fn new(query: QueryBuilder) -> Self {
        Self {
            query,
            batch_delay_ms: None,
        }
    }

    pub fn with_batch_delay_ms(mut self, ms: u64) -> Self {
        self.batch_delay_ms = Some(ms);
        self
    }

    /// The configured delay override: `None` when unset, `Some(None)` when
    /// coalescing is disabled.
    pub fn batch_delay(&self) -> Option<Option<Duration>> {
        self.batch_delay_ms.map(|ms| match ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        })
    }
}
