use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;
use crate::error::ThrottleError;

/// HTTP verb of a throttled endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// Request query parameters handed to cost overrides
pub type Params<'a> = &'a [(&'a str, &'a str)];

/// Computes a parameter-dependent cost, e.g. from a page size
pub type CostOverride = Arc<dyn Fn(&[(&str, &str)]) -> u32 + Send + Sync>;

/// What to do with an endpoint missing from the table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum UnknownEndpointPolicy {
    /// Fail closed with `ThrottleError::UnknownEndpoint`
    #[default]
    Reject,
    /// Fail open, charging a fixed cost against a fixed category
    Fallback { cost: u32, category: String },
}

/// Cost and category an endpoint resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCost {
    pub cost: u32,
    pub category: Arc<str>,
}

#[derive(Clone)]
struct EndpointCost {
    cost: u32,
    category: Arc<str>,
    cost_override: Option<CostOverride>,
}

/// Static `(verb, resource) -> (cost, category)` table
pub struct CostTable {
    entries: HashMap<Verb, HashMap<String, EndpointCost>>,
    unknown: UnknownEndpointPolicy,
}

impl CostTable {
    pub fn new(unknown: UnknownEndpointPolicy) -> Self {
        Self { entries: HashMap::new(), unknown }
    }

    /// Register an endpoint with a flat cost
    pub fn with_endpoint(mut self, verb: Verb, resource: impl Into<String>, cost: u32, category: &str) -> Self {
        self.insert(verb, resource, cost, category);
        self
    }

    /// Attach a parameter-dependent cost to an already registered endpoint
    pub fn with_override<F>(mut self, verb: Verb, resource: &str, cost_override: F) -> Result<Self>
    where
        F: Fn(&[(&str, &str)]) -> u32 + Send + Sync + 'static,
    {
        let entry = self.entries.get_mut(&verb).and_then(|by_resource| by_resource.get_mut(resource)).ok_or_else(|| {
            ThrottleError::UnknownEndpoint { verb: verb.to_string(), resource: resource.to_string() }
        })?;
        entry.cost_override = Some(Arc::new(cost_override));
        Ok(self)
    }

    pub fn insert(&mut self, verb: Verb, resource: impl Into<String>, cost: u32, category: &str) {
        let entry = EndpointCost { cost, category: Arc::from(category), cost_override: None };
        self.entries.entry(verb).or_default().insert(resource.into(), entry);
    }

    /// Resolve the cost and category of a request
    pub fn resolve(&self, verb: Verb, resource: &str, params: Params<'_>) -> Result<ResolvedCost> {
        if let Some(entry) = self.entries.get(&verb).and_then(|by_resource| by_resource.get(resource)) {
            let cost = entry.cost_override.as_ref().map_or(entry.cost, |cost_override| cost_override(params));
            return Ok(ResolvedCost { cost, category: Arc::clone(&entry.category) });
        }

        match &self.unknown {
            UnknownEndpointPolicy::Reject => Err(ThrottleError::UnknownEndpoint { verb: verb.to_string(), resource: resource.to_string() }),
            UnknownEndpointPolicy::Fallback { cost, category } => Ok(ResolvedCost { cost: *cost, category: Arc::from(category.as_str()) }),
        }
    }

    /// Every category referenced by the table, including the fallback one
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        let fallback = match &self.unknown {
            UnknownEndpointPolicy::Fallback { category, .. } => Some(category.as_str()),
            UnknownEndpointPolicy::Reject => None,
        };
        self.entries.values().flat_map(|by_resource| by_resource.values().map(|entry| &*entry.category)).chain(fallback)
    }

    pub fn unknown_policy(&self) -> &UnknownEndpointPolicy {
        &self.unknown
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self::new(UnknownEndpointPolicy::Reject)
    }
}

impl fmt::Debug for CostTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostTable").field("endpoints", &self.len()).field("unknown", &self.unknown).finish()
    }
}

/// Look up a query parameter by name
pub fn param<'a>(params: &[(&str, &'a str)], name: &str) -> Option<&'a str> {
    params.iter().find(|(key, _)| *key == name).map(|(_, value)| *value)
}
