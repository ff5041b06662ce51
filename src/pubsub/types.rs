use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEvent {
    pub plan_id: String,
    pub action: PlanAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanAction {
    /// Capabilities of `plan_id` changed.
    Invalidate,
    /// Drop every cached plan.
    InvalidateAll,
}

impl PlanEvent {
    pub fn invalidate(plan_id: &str) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            action: PlanAction::Invalidate,
        }
    }
}
