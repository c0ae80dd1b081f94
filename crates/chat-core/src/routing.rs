use serde::{Deserialize, Serialize};

/// Which seat in the conversation a route is being resolved for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteRole {
    Primary,
}

/// A resolved model route plus its fallback chain.
///
/// Consumed opaquely: the continuation engine never implements escalation
/// or downgrade logic itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRoute {
    pub provider: String,
    pub model: String,
    pub fallback_chain: Vec<(String, String)>,
}

pub trait ModelRouter: Send + Sync {
    fn resolve(&self, role: RouteRole, task: Option<&str>) -> ModelRoute;
}
