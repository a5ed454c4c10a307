//! Token usage accounting across runs.

use std::sync::Mutex;

use async_trait::async_trait;
use codeloop_core::error::PluginError;
use codeloop_core::model::Usage;
use codeloop_core::plugin::{Plugin, PluginContext, QueryEndEvent, UsageEvent};
use tracing::info;

/// Running totals kept by [`UsageTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub queries: u32,
    pub rounds: u32,
    pub usage: Usage,
}

/// Sums the usage reported by every generation.
#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: Mutex<UsageTotals>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> UsageTotals {
        *self.totals.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Plugin for UsageTracker {
    fn name(&self) -> &str {
        "usage-tracker"
    }

    async fn usage(&self, _ctx: &PluginContext, event: &UsageEvent) -> Result<(), PluginError> {
        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.rounds += 1;
        totals.usage.accumulate(&event.usage);
        Ok(())
    }

    async fn query_end(&self, _ctx: &PluginContext, event: &QueryEndEvent) -> Result<(), PluginError> {
        let totals = {
            let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
            totals.queries += 1;
            *totals
        };
        info!(
            query_tokens = event.usage.total_tokens,
            session_tokens = totals.usage.total_tokens,
            queries = totals.queries,
            "Token usage"
        );
        Ok(())
    }
}
