use crate::errors::ArchitectError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

/// Per-million-token pricing for a model, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(default)]
    pub cached_input_per_million: f64,
}

/// Normalized token usage for one model call.
///
/// `cached_input_tokens` counts prompt tokens served from the provider's
/// prompt cache; they are a subset of `prompt_tokens` and are billed at the
/// cached rate instead of the input rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, cached_input_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cached_input_tokens,
        }
    }
}

/// Embedded pricing snapshot covering common models.
const PRICING_DATA: &str = include_str!("pricing_data.json");

/// Fallback pricing for models absent from the table.
const DEFAULT_PRICING: PricingEntry = PricingEntry {
    input_per_million: 3.0,
    output_per_million: 15.0,
    cached_input_per_million: 0.3,
};

/// Model-name prefixes that always resolve to zero cost (local runtimes).
const ZERO_COST_PREFIXES: &[&str] = &["ollama/", "local/"];

/// Resolves per-model token prices.
///
/// Resolution order: exact match, longest prefix match, configured default.
/// Config overrides are consulted before the embedded table at each stage.
pub struct PriceBook {
    /// `(pattern, entry)` pairs; overrides first, embedded data after.
    entries: Vec<(String, PricingEntry)>,
}

impl PriceBook {
    pub fn new(overrides: &BTreeMap<String, PricingEntry>) -> Self {
        let mut entries: Vec<(String, PricingEntry)> = overrides
            .iter()
            .map(|(pattern, entry)| (pattern.clone(), entry.clone()))
            .collect();

        match serde_json::from_str::<Vec<serde_json::Value>>(PRICING_DATA) {
            Ok(rows) => {
                for row in rows {
                    let pattern = row["pattern"].as_str().unwrap_or_default();
                    if pattern.is_empty() {
                        continue;
                    }
                    entries.push((
                        pattern.to_string(),
                        PricingEntry {
                            input_per_million: row["input_mtok"]
                                .as_f64()
                                .unwrap_or(DEFAULT_PRICING.input_per_million),
                            output_per_million: row["output_mtok"]
                                .as_f64()
                                .unwrap_or(DEFAULT_PRICING.output_per_million),
                            cached_input_per_million: row["cached_mtok"].as_f64().unwrap_or(0.0),
                        },
                    ));
                }
            }
            Err(e) => warn!("failed to parse embedded pricing data: {}", e),
        }

        Self { entries }
    }

    /// Look up pricing for a model name.
    pub fn get_prices(&self, model: &str) -> PricingEntry {
        if ZERO_COST_PREFIXES.iter().any(|p| model.starts_with(p)) {
            return PricingEntry {
                input_per_million: 0.0,
                output_per_million: 0.0,
                cached_input_per_million: 0.0,
            };
        }

        if let Some((_, entry)) = self.entries.iter().find(|(pattern, _)| pattern == model) {
            return entry.clone();
        }

        // Longest-prefix match so "claude-sonnet-4-6-20250514" resolves to
        // the "claude-sonnet-4-6" entry rather than "claude-sonnet-4".
        self.entries
            .iter()
            .filter(|(pattern, _)| model.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map_or(DEFAULT_PRICING, |(_, entry)| entry.clone())
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

/// Token and cost totals attributed to one source (e.g. "plan", "build").
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub cost_usd: f64,
}

/// Snapshot returned by [`CostTracker::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cached_tokens: u64,
    pub total_cost_usd: f64,
    pub by_source: BTreeMap<String, SourceTotals>,
}

/// Accumulates tokens and USD per step and enforces the run budget.
///
/// Owned by a single agent loop; all model adapters used within that loop
/// record into the same tracker.
pub struct CostTracker {
    price_book: PriceBook,
    budget_usd: Option<f64>,
    warn_at_usd: Option<f64>,
    warned: bool,
    total_input_tokens: u64,
    total_output_tokens: u64,
    total_cached_tokens: u64,
    total_cost_usd: f64,
    by_source: BTreeMap<String, SourceTotals>,
}

impl CostTracker {
    pub fn new(price_book: PriceBook, budget_usd: Option<f64>, warn_at_usd: Option<f64>) -> Self {
        Self {
            price_book,
            budget_usd,
            warn_at_usd,
            warned: false,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cached_tokens: 0,
            total_cost_usd: 0.0,
            by_source: BTreeMap::new(),
        }
    }

    /// Record usage for one model call.
    ///
    /// The totals are updated first; only then is the budget checked, so on
    /// `BudgetExceeded` the tracker still reflects the call that crossed the
    /// line.
    pub fn record(
        &mut self,
        step: usize,
        model: &str,
        usage: &TokenUsage,
        source: &str,
    ) -> Result<(), ArchitectError> {
        let cost = self.estimate_cost(model, usage);

        self.total_input_tokens += usage.prompt_tokens;
        self.total_output_tokens += usage.completion_tokens;
        self.total_cached_tokens += usage.cached_input_tokens;
        self.total_cost_usd += cost;

        let entry = self.by_source.entry(source.to_string()).or_default();
        entry.calls += 1;
        entry.input_tokens += usage.prompt_tokens;
        entry.output_tokens += usage.completion_tokens;
        entry.cached_tokens += usage.cached_input_tokens;
        entry.cost_usd += cost;

        info!(
            step,
            model,
            source,
            input = usage.prompt_tokens,
            output = usage.completion_tokens,
            cached = usage.cached_input_tokens,
            cost_usd = cost,
            "llm call recorded"
        );

        if let Some(warn_at) = self.warn_at_usd {
            if !self.warned && self.total_cost_usd >= warn_at {
                self.warned = true;
                warn!(
                    total_cost_usd = self.total_cost_usd,
                    warn_at_usd = warn_at,
                    "cost warning threshold crossed"
                );
            }
        }

        if let Some(budget) = self.budget_usd {
            if self.total_cost_usd > budget {
                return Err(ArchitectError::BudgetExceeded {
                    total: self.total_cost_usd,
                    budget,
                });
            }
        }

        Ok(())
    }

    /// Cost in USD for one call. Cached tokens are billed at the cached rate
    /// and subtracted from the input count so they are not double-counted.
    pub fn estimate_cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        let prices = self.price_book.get_prices(model);
        let billable_input = usage.prompt_tokens.saturating_sub(usage.cached_input_tokens);
        (billable_input as f64 / 1_000_000.0) * prices.input_per_million
            + (usage.completion_tokens as f64 / 1_000_000.0) * prices.output_per_million
            + (usage.cached_input_tokens as f64 / 1_000_000.0) * prices.cached_input_per_million
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input_tokens
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output_tokens
    }

    pub fn total_cached_tokens(&self) -> u64 {
        self.total_cached_tokens
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    /// Whether the one-shot warning threshold has been crossed.
    pub fn warned(&self) -> bool {
        self.warned
    }

    /// Whether anything has been recorded yet.
    pub fn has_data(&self) -> bool {
        !self.by_source.is_empty()
    }

    pub fn summary(&self) -> CostSummary {
        CostSummary {
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            total_cached_tokens: self.total_cached_tokens,
            total_cost_usd: self.total_cost_usd,
            by_source: self.by_source.clone(),
        }
    }

    /// Single-line human summary, e.g.
    /// `1500 in / 300 out / 200 cached · $0.0123`.
    pub fn format_summary_line(&self) -> String {
        format!(
            "{} in / {} out / {} cached · ${:.4}",
            self.total_input_tokens,
            self.total_output_tokens,
            self.total_cached_tokens,
            self.total_cost_usd
        )
    }
}
