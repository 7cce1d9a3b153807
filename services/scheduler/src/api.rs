//! Operator HTTP surface.
//!
//! Endpoints:
//! - GET /healthz - liveness probe
//! - GET /v1/plans - the uninstall plan with per-step status

use axum::{extract::State, routing::get, Json, Router};

use crate::plan::{PlanManager, PlanView};

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct ApiState {
    pub plans: PlanManager,
}

/// Builds the operator router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/plans", get(list_plans))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_plans(State(state): State<ApiState>) -> Json<Vec<PlanView>> {
    Json(vec![state.plans.view()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Phase, Plan, Status, Step, Strategy};

    #[tokio::test]
    async fn test_list_plans_snapshot() {
        let plans = PlanManager::new(Plan::new(
            "uninstall",
            vec![Phase::new(
                "unreserve-resources",
                Strategy::Parallel,
                vec![Step::release("r1")],
            )],
        ));
        let state = ApiState { plans };

        let Json(views) = list_plans(State(state)).await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].name, "uninstall");
        assert_eq!(views[0].phases[0].steps[0].status, Status::Pending);
    }
}
