//! Named negotiator constructors

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{NegotiationError, Result};
use crate::negotiator::{
    Aspiration, AspirationType, CapabilitySet, ComparisonStrategy, Negotiator, UtilityNegotiator,
};
use crate::utility::SharedUtility;

/// Arguments handed to a negotiator constructor
#[derive(Debug, Clone, Default)]
pub struct NegotiatorParams {
    pub ufun: Option<SharedUtility>,
    pub values: Map<String, Value>,
}

impl NegotiatorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ufun(mut self, ufun: SharedUtility) -> Self {
        self.ufun = Some(ufun);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize one parameter, if present
    pub fn parse<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.values
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    NegotiationError::configuration(format!("invalid parameter {}: {}", key, e))
                })
            })
            .transpose()
    }

    /// Fill in keys the caller did not set
    pub(crate) fn merge_defaults(&mut self, defaults: &Map<String, Value>) {
        for (key, value) in defaults {
            self.values
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

pub type NegotiatorConstructor =
    Arc<dyn Fn(Option<&str>, NegotiatorParams) -> Result<Box<dyn Negotiator>> + Send + Sync>;

/// Maps negotiator type names to constructors
#[derive(Clone, Default)]
pub struct NegotiatorRegistry {
    constructors: HashMap<String, NegotiatorConstructor>,
}

impl NegotiatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one utility-driven negotiator type per comparison strategy
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for strategy in ComparisonStrategy::all() {
            registry.register(strategy.as_str(), move |name, params| {
                Ok(Box::new(build_utility_negotiator(strategy, name, &params)?) as Box<dyn Negotiator>)
            });
        }
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(Option<&str>, NegotiatorParams) -> Result<Box<dyn Negotiator>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(
        &self,
        negotiator_type: &str,
        name: Option<&str>,
        params: NegotiatorParams,
    ) -> Result<Box<dyn Negotiator>> {
        let constructor = self.constructors.get(negotiator_type).ok_or_else(|| {
            NegotiationError::configuration(format!(
                "unknown negotiator type: {}",
                negotiator_type
            ))
        })?;
        constructor(name, params)
    }
}

impl fmt::Debug for NegotiatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiatorRegistry")
            .field("types", &self.names())
            .finish()
    }
}

/// Recognized parameters: `thresholds`, `aspiration` (type name or exponent),
/// `max_aspiration` and `capabilities`
fn build_utility_negotiator(
    strategy: ComparisonStrategy,
    name: Option<&str>,
    params: &NegotiatorParams,
) -> Result<UtilityNegotiator> {
    let mut negotiator = UtilityNegotiator::of_strategy(strategy, name, params.ufun.clone());

    if let Some(thresholds) = params.parse::<Vec<f64>>("thresholds")? {
        negotiator = negotiator.with_thresholds(thresholds);
    }
    if let Some(kind) = params.get("aspiration") {
        let aspiration_type = match kind {
            Value::String(s) => s.parse::<AspirationType>(),
            Value::Number(n) => n.to_string().parse::<AspirationType>(),
            other => Err(format!("Invalid aspiration type: {}", other)),
        }
        .map_err(NegotiationError::Configuration)?;
        let max = params.parse::<f64>("max_aspiration")?.unwrap_or(1.0);
        negotiator = negotiator.with_aspiration(Aspiration::new(max, aspiration_type));
    }
    if let Some(capabilities) = params.parse::<CapabilitySet>("capabilities")? {
        negotiator = negotiator.with_capabilities(&capabilities);
    }
    Ok(negotiator)
}
