use std::collections::BTreeMap;
use std::time::Duration;

use crate::cost_table::CostTable;
use crate::cost_table::Params;
use crate::cost_table::ResolvedCost;
use crate::cost_table::Verb;
use crate::error::Result;
use crate::error::ThrottleError;
use crate::events::ListenerId;
use crate::events::ThrottleEvent;
use crate::pipeline::Pipeline;
use crate::throttler::Admission;
use crate::throttler::Throttler;
use crate::time;

/// Throttler whose pipelines are partitioned into named categories
///
/// A request only contends with the pipelines of its own category, e.g.
/// market data requests never wait on an exhausted order budget. A pipeline can
/// belong to several categories to model an exchange-wide budget shared by all
/// of them. Endpoint costs and categories come from a [`CostTable`].
pub struct CategorizedThrottler {
    throttler: Throttler,
    categories: BTreeMap<String, Vec<usize>>,
    costs: CostTable,
}

impl CategorizedThrottler {
    pub fn builder() -> CategorizedThrottlerBuilder {
        CategorizedThrottlerBuilder::new()
    }

    /// Wait until every pipeline of `category` can absorb `cost`, then charge them
    pub async fn check_and_wait(&self, cost: u32, category: &str) -> Result<Admission> {
        let selected = self.selected(category)?;
        self.throttler.admit(selected, cost).await
    }

    /// Resolve an endpoint's cost and category, then wait for admission
    pub async fn check_and_wait_endpoint(&self, verb: Verb, resource: &str, params: Params<'_>) -> Result<Admission> {
        let resolved = self.resolve(verb, resource, params)?;
        self.check_and_wait(resolved.cost, &resolved.category).await
    }

    pub fn resolve(&self, verb: Verb, resource: &str, params: Params<'_>) -> Result<ResolvedCost> {
        self.costs.resolve(verb, resource, params)
    }

    /// Reverse the charges recorded in `admission`
    pub fn refund(&self, admission: &Admission) {
        self.throttler.refund(admission)
    }

    /// Longest delay the pipelines of `category` ask for before admitting `cost`
    pub fn wait_time(&self, cost: u32, category: &str) -> Result<Duration> {
        let selected = self.selected(category)?;
        Ok(self.throttler.wait_time_for(selected, cost, time::now()))
    }

    pub fn add_event_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.throttler.add_event_listener(callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.throttler.remove_event_listener(id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Pipelines governing `category`
    pub fn pipelines(&self, category: &str) -> Result<Vec<&Pipeline>> {
        let selected = self.selected(category)?;
        Ok(selected.iter().map(|&index| &self.throttler.pipelines()[index]).collect())
    }

    pub fn pipeline(&self, label: &str) -> Option<&Pipeline> {
        self.throttler.pipeline(label)
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    fn selected(&self, category: &str) -> Result<&[usize]> {
        self.categories.get(category).map(Vec::as_slice).ok_or_else(|| ThrottleError::UnknownCategory(category.to_string()))
    }
}

impl std::fmt::Debug for CategorizedThrottler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategorizedThrottler")
            .field("categories", &self.categories)
            .field("throttler", &self.throttler)
            .field("costs", &self.costs)
            .finish()
    }
}

/// Builder for a categorized throttler
pub struct CategorizedThrottlerBuilder {
    pipelines: Vec<(Vec<String>, Pipeline)>,
    costs: CostTable,
}

impl CategorizedThrottlerBuilder {
    pub fn new() -> Self {
        Self { pipelines: Vec::new(), costs: CostTable::default() }
    }

    /// Add a pipeline governing a single category
    pub fn with_pipeline(self, category: &str, pipeline: Pipeline) -> Self {
        self.with_shared_pipeline(&[category], pipeline)
    }

    /// Add a pipeline shared by several categories
    pub fn with_shared_pipeline(mut self, categories: &[&str], pipeline: Pipeline) -> Self {
        self.pipelines.push((categories.iter().map(|c| c.to_string()).collect(), pipeline));
        self
    }

    pub fn with_costs(mut self, costs: CostTable) -> Self {
        self.costs = costs;
        self
    }

    /// Build the throttler
    ///
    /// Fails if a pipeline belongs to no category, labels collide, or the
    /// cost table names a category with no pipelines.
    pub fn build(self) -> Result<CategorizedThrottler> {
        let mut categories: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut pipelines = Vec::with_capacity(self.pipelines.len());

        for (index, (names, pipeline)) in self.pipelines.into_iter().enumerate() {
            if names.is_empty() {
                return Err(ThrottleError::InvalidConfig(format!("pipeline '{}' belongs to no category", pipeline.label())));
            }
            for name in names {
                let members = categories.entry(name).or_default();
                if !members.contains(&index) {
                    members.push(index);
                }
            }
            pipelines.push(pipeline);
        }

        if let Some(missing) = self.costs.categories().find(|category| !categories.contains_key(*category)) {
            return Err(ThrottleError::UnknownCategory(missing.to_string()));
        }

        let throttler = Throttler::new(pipelines)?;
        Ok(CategorizedThrottler { throttler, categories, costs: self.costs })
    }
}

impl Default for CategorizedThrottlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
