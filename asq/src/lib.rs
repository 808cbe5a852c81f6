//! Selector-driven automation for desktop accessibility trees
//!
//! This crate implements a jQuery-style query engine over the widget tree
//! exposed by an external accessibility service: CSS-like selectors with
//! attribute operators, pseudo-selectors, and spatial relations; a bounded
//! TTL result cache; and a workflow executor for ordered, retryable,
//! optionally-required automation steps.
//!
//! The accessibility binding itself is an external collaborator: the engine
//! only consumes the [`WidgetProvider`] seam and opaque step actions.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

pub mod cache;
pub mod element;
pub mod errors;
pub mod matcher;
pub mod selector;
pub mod spatial;
#[cfg(test)]
mod tests;
pub mod workflow;

pub use cache::{CacheContext, CacheStats, TtlCache};
pub use element::{SnapshotPool, Widget, WidgetImpl, WidgetProvider, WidgetSnapshot};
pub use errors::AutomationError;
pub use selector::{
    AttrOperator, AttributePredicate, Pseudo, SelectorPart, SpatialClause, SpatialRelation,
};
pub use workflow::{
    StepAction, WorkflowContext, WorkflowExecutor, WorkflowRegistry, WorkflowResult, WorkflowStatus,
    WorkflowStep,
};

/// Tuning knobs for an [`Asq`] engine.
#[derive(Debug, Clone)]
pub struct AsqConfig {
    /// Capacity of the result cache and the normalization memo.
    pub cache_capacity: usize,
    /// Time-to-live used by [`Asq::query_cached`].
    pub query_ttl: Duration,
    /// Time-to-live used by [`Asq::find_cached`].
    pub find_ttl: Duration,
    /// Edge-to-edge distance threshold for the `near` relation.
    pub near_threshold: f64,
    /// Sleep between polls in [`Asq::wait_for`].
    pub poll_interval: Duration,
}

impl Default for AsqConfig {
    fn default() -> Self {
        Self {
            cache_capacity: cache::DEFAULT_CACHE_CAPACITY,
            query_ttl: cache::DEFAULT_QUERY_TTL,
            find_ttl: cache::DEFAULT_FIND_TTL,
            near_threshold: spatial::DEFAULT_NEAR_THRESHOLD,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// The main entry point for selector queries.
///
/// Holds the provider seam and the injected cache context. Queries are
/// synchronous and read-only over provider snapshots; the engine never
/// mutates the widget tree.
pub struct Asq {
    provider: Arc<dyn WidgetProvider>,
    cache: CacheContext,
    config: AsqConfig,
}

impl Asq {
    pub fn new(provider: Arc<dyn WidgetProvider>) -> Self {
        Self::with_config(provider, AsqConfig::default())
    }

    pub fn with_config(provider: Arc<dyn WidgetProvider>, config: AsqConfig) -> Self {
        let cache = CacheContext::new(config.cache_capacity, config.query_ttl);
        Self {
            provider,
            cache,
            config,
        }
    }

    /// Find all widgets matching a selector, in pool order.
    ///
    /// "No match" is an empty vec, never an error; only malformed selector
    /// syntax fails.
    ///
    /// ```
    /// use asq::{Asq, SnapshotPool, WidgetSnapshot};
    /// use std::sync::Arc;
    ///
    /// let pool = SnapshotPool::new(vec![
    ///     WidgetSnapshot::new("push button").with_name("Save").into(),
    /// ]);
    /// let asq = Asq::new(Arc::new(pool));
    /// let found = asq.query(r#"button[name="Save"]"#)?;
    /// assert_eq!(found.len(), 1);
    /// # Ok::<(), asq::AutomationError>(())
    /// ```
    #[instrument(skip(self))]
    pub fn query(&self, selector: &str) -> Result<Vec<Widget>, AutomationError> {
        let part = SelectorPart::parse(selector)?;
        Ok(self.run_query(&part))
    }

    /// [`Asq::query`] with result caching under the generic query TTL.
    #[instrument(skip(self))]
    pub fn query_cached(&self, selector: &str) -> Result<Vec<Widget>, AutomationError> {
        self.query_with_ttl(selector, self.config.query_ttl)
    }

    /// The "optimized find" entry point: caches under the longer find TTL.
    #[instrument(skip(self))]
    pub fn find_cached(&self, selector: &str) -> Result<Vec<Widget>, AutomationError> {
        self.query_with_ttl(selector, self.config.find_ttl)
    }

    fn query_with_ttl(
        &self,
        selector: &str,
        ttl: Duration,
    ) -> Result<Vec<Widget>, AutomationError> {
        let key = self.cache.optimize(selector);
        // Reject bad syntax before touching the cache so a retried
        // malformed selector cannot skew the hit/miss counters.
        let part = SelectorPart::parse(&key)?;
        if let Some(cached) = self.cache.get_results(&key) {
            debug!(selector = %key, count = cached.len(), "cache hit");
            return Ok(cached);
        }
        let widgets = self.run_query(&part);
        self.cache.store_results(key, widgets.clone(), ttl);
        Ok(widgets)
    }

    fn run_query(&self, part: &SelectorPart) -> Vec<Widget> {
        let pool = self.provider.widgets();
        let matched = spatial::evaluate(&pool, part, self.config.near_threshold);
        matcher::apply_positional(matched, part)
    }

    /// Check a single widget against a selector.
    ///
    /// A spatial clause needs the whole candidate pool for context and is
    /// not evaluated here; only the subject part is checked.
    pub fn matches(&self, widget: &Widget, selector: &str) -> Result<bool, AutomationError> {
        let part = SelectorPart::parse(selector)?;
        Ok(matcher::matches(widget, &part))
    }

    pub fn exists(&self, selector: &str) -> Result<bool, AutomationError> {
        Ok(!self.query(selector)?.is_empty())
    }

    pub fn find_first(&self, selector: &str) -> Result<Option<Widget>, AutomationError> {
        Ok(self.query(selector)?.into_iter().next())
    }

    /// Poll until a widget matches the selector or the timeout elapses.
    ///
    /// This is a poll-and-sleep loop, not true cancellation: a provider
    /// snapshot already being taken is never interrupted, the timeout only
    /// stops further polls.
    #[instrument(skip(self))]
    pub fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Widget, AutomationError> {
        // Fail fast on syntax before entering the poll loop.
        let part = SelectorPart::parse(selector)?;
        let start = Instant::now();
        loop {
            if let Some(widget) = self.run_query(&part).into_iter().next() {
                return Ok(widget);
            }
            if start.elapsed() >= timeout {
                // Surface the underlying miss inside the timeout, like a
                // locator reporting what it was still waiting on.
                let miss =
                    AutomationError::ElementNotFound(format!("no widget matched '{selector}'"));
                return Err(AutomationError::Timeout(format!(
                    "timed out after {timeout:?}: {miss}"
                )));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Normalized form of a selector (memoized).
    pub fn optimize(&self, selector: &str) -> String {
        self.cache.optimize(selector)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_clear(&self) {
        self.cache.clear()
    }

    /// Explicit sweep of expired cached results.
    pub fn cache_cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }
}
