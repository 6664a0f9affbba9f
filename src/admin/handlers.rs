use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::{TargetId, TargetSnapshot};
use crate::pairing::PairSnapshot;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub admitted_connections: usize,
    pub max_connections: usize,
    pub active_pairs: usize,
    pub active_tasks: usize,
}

#[derive(Debug, Serialize)]
pub struct TargetStatus {
    #[serde(flatten)]
    pub target: TargetSnapshot,
    /// Registered pairs whose target leg is attached to this target.
    pub paired: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        admitted_connections: state.gate.in_flight(),
        max_connections: state.gate.max_connections(),
        active_pairs: state.pairs.count_pairs(),
        active_tasks: state.supervisor.active_count(),
    })
}

pub async fn get_targets(State(state): State<AdminState>) -> Json<Vec<TargetStatus>> {
    let statuses = state
        .targets
        .snapshot()
        .into_iter()
        .map(|target| TargetStatus {
            paired: state.pairs.count_by_target_id(&target.id),
            target,
        })
        .collect();
    Json(statuses)
}

pub async fn get_pairs(State(state): State<AdminState>) -> Json<Vec<PairSnapshot>> {
    Json(state.pairs.snapshots())
}

pub async fn get_target_pairs(
    State(state): State<AdminState>,
    Path(target_id): Path<String>,
) -> Result<Json<Vec<PairSnapshot>>, StatusCode> {
    let target_id = TargetId::from(target_id.as_str());
    if state.targets.get(&target_id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let mut pairs: Vec<_> = state.pairs.pairs_by_target_id(&target_id).into_values().collect();
    pairs.sort_by_key(|p| p.target.id());
    Ok(Json(pairs.iter().map(|p| p.snapshot()).collect()))
}
