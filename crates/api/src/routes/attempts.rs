//! Attempt audit routes

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use integrity_ledger::{IntegrityStatus, StoreError, ViolationRecord};
use violation_engine::ViolationKind;

use crate::AppState;

/// Query parameters for the violations endpoint
#[derive(Debug, Deserialize)]
pub struct ViolationQuery {
    /// Filter by violation kind
    pub kind: Option<ViolationKind>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for the violations endpoint
#[derive(Debug, Serialize)]
pub struct ViolationResponse {
    pub data: Vec<ViolationRecord>,
    pub count: usize,
}

/// Response for the integrity endpoint
#[derive(Debug, Serialize)]
pub struct IntegrityResponse {
    pub attempt_id: Uuid,
    pub status: IntegrityStatus,
    pub terminated: bool,
    pub counts_by_kind: BTreeMap<String, u32>,
}

/// Get violation rows for one attempt, newest first
pub async fn get_violations(
    State(state): State<Arc<RwLock<AppState>>>,
    Path(attempt_id): Path<Uuid>,
    Query(params): Query<ViolationQuery>,
) -> Result<Json<ViolationResponse>, StatusCode> {
    counter!("api_violation_queries_total").increment(1);

    let state = state.read().await;
    let rows = state
        .store
        .rows_for_attempt(attempt_id, params.kind, params.limit)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ViolationResponse {
        count: rows.len(),
        data: rows,
    }))
}

/// Get the final integrity summary for one attempt
pub async fn get_integrity(
    State(state): State<Arc<RwLock<AppState>>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<IntegrityResponse>, StatusCode> {
    counter!("api_integrity_queries_total").increment(1);

    let state = state.read().await;
    let summary = state.store.attempt_summary(attempt_id).map_err(|e| match e {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    })?;

    let rows = state
        .store
        .rows_for_attempt(attempt_id, None, usize::MAX)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut counts_by_kind = BTreeMap::new();
    for row in rows {
        *counts_by_kind.entry(row.violation_type).or_insert(0) += 1;
    }

    Ok(Json(IntegrityResponse {
        attempt_id,
        status: summary.status,
        terminated: summary.terminated,
        counts_by_kind,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use integrity_ledger::{
        AttemptIntegrityLedger, EscalationPolicy, InMemoryViolationStore, ViolationStore,
    };
    use tower::ServiceExt;
    use violation_engine::{ViolationDetail, ViolationEvent};

    fn store_with_attempt() -> (Arc<InMemoryViolationStore>, Uuid) {
        let store = Arc::new(InMemoryViolationStore::new());
        let mut ledger = AttemptIntegrityLedger::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            EscalationPolicy::default(),
        );
        for kind in [
            ViolationKind::TabSwitch,
            ViolationKind::TabSwitch,
            ViolationKind::NoFace,
        ] {
            ledger
                .append(ViolationEvent::now(
                    ledger.attempt_id(),
                    kind,
                    ViolationDetail::new(),
                ))
                .unwrap();
        }
        ledger.seal();
        store.persist(&ledger, false).unwrap();
        (store, ledger.attempt_id())
    }

    fn app(store: Arc<InMemoryViolationStore>) -> axum::Router {
        create_router(Arc::new(RwLock::new(AppState::new(store))))
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_violations_filter_and_limit() {
        let (store, attempt_id) = store_with_attempt();

        let (status, json) = get_json(
            app(store.clone()),
            &format!("/api/v1/attempts/{attempt_id}/violations?kind=tab_switch"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);

        let (status, json) = get_json(
            app(store),
            &format!("/api/v1/attempts/{attempt_id}/violations?limit=1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_violations_for_unknown_attempt_is_empty() {
        let (store, _) = store_with_attempt();
        let (status, json) = get_json(
            app(store),
            &format!("/api/v1/attempts/{}/violations", Uuid::new_v4()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn test_integrity_summary_counts_by_kind() {
        let (store, attempt_id) = store_with_attempt();
        let (status, json) = get_json(
            app(store),
            &format!("/api/v1/attempts/{attempt_id}/integrity"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "flagged");
        assert_eq!(json["terminated"], false);
        assert_eq!(json["counts_by_kind"]["tab_switch"], 2);
        assert_eq!(json["counts_by_kind"]["no_face"], 1);
    }

    #[tokio::test]
    async fn test_integrity_unknown_attempt_is_404() {
        let (store, _) = store_with_attempt();
        let (status, _) = get_json(
            app(store),
            &format!("/api/v1/attempts/{}/integrity", Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
