use std::collections::HashMap;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::EngineError;
use crate::model::new_record_id;
use crate::model::permission::{Decision, PermissionRequest, PermissionStatus};
use crate::store::{Collection, RecordStore};
use crate::utils::clock::Clock;
use crate::utils::time::local_date;

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PermissionFilter {
    /// Filter by requesting user
    #[schema(example = "u-1001")]
    pub user_id: Option<String>,
    /// Filter by request status
    #[schema(example = "pending")]
    pub status: Option<PermissionStatus>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u64>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PermissionPage {
    pub data: Vec<PermissionRequest>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

/// Exception requests: `pending -> approved | rejected`, decided once.
pub struct PermissionWorkflow {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    requests: RwLock<HashMap<String, PermissionRequest>>,
}

impl PermissionWorkflow {
    pub async fn load(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Result<Self, EngineError> {
        let mut requests = HashMap::new();
        for record in store.load(Collection::Permissions).await? {
            let request: PermissionRequest = serde_json::from_value(record.body)?;
            requests.insert(request.id.clone(), request);
        }
        info!(requests = requests.len(), "Permission workflow loaded");

        Ok(Self {
            store,
            clock,
            offset,
            requests: RwLock::new(requests),
        })
    }

    /// Files a new pending request. `date` defaults to the local today.
    pub async fn request(
        &self,
        user_id: &str,
        user_name: &str,
        reason: &str,
        date: Option<NaiveDate>,
    ) -> Result<PermissionRequest, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::validation("reason must not be empty"));
        }

        let now = self.clock.now();
        let request = PermissionRequest {
            id: new_record_id(),
            user_id: user_id.to_string(),
            user_name: user_name.trim().to_string(),
            reason: reason.to_string(),
            status: PermissionStatus::Pending,
            requested_at: now,
            date: date.unwrap_or_else(|| local_date(now, self.offset)),
        };

        let mut requests = self.requests.write().await;
        let body = serde_json::to_value(&request)?;
        self.store
            .put(Collection::Permissions, &request.id, &body)
            .await?;
        requests.insert(request.id.clone(), request.clone());

        info!(request_id = %request.id, user_id, date = %request.date, "Permission requested");
        Ok(request)
    }

    pub async fn decide(
        &self,
        request_id: &str,
        decision: Decision,
    ) -> Result<PermissionRequest, EngineError> {
        let mut requests = self.requests.write().await;
        let current = requests.get(request_id).ok_or_else(|| {
            EngineError::not_found(format!("permission request {request_id} not found"))
        })?;
        if !current.is_pending() {
            warn!(request_id, status = %current.status, "Decision on settled request rejected");
            return Err(EngineError::conflict("already decided"));
        }

        let mut decided = current.clone();
        decided.status = decision.into();
        let body = serde_json::to_value(&decided)?;
        self.store
            .put(Collection::Permissions, request_id, &body)
            .await?;
        requests.insert(decided.id.clone(), decided.clone());

        info!(request_id, %decision, user_id = %decided.user_id, "Permission decided");
        Ok(decided)
    }

    pub async fn has_approved_for(&self, user_id: &str, date: NaiveDate) -> bool {
        self.approved_for(user_id, date).await.is_some()
    }

    /// The approved request excusing `date`, earliest filed first when several
    /// were approved.
    pub async fn approved_for(&self, user_id: &str, date: NaiveDate) -> Option<PermissionRequest> {
        self.requests
            .read()
            .await
            .values()
            .filter(|r| {
                r.user_id == user_id && r.date == date && r.status == PermissionStatus::Approved
            })
            .min_by(|a, b| {
                a.requested_at
                    .cmp(&b.requested_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned()
    }

    pub async fn get(&self, request_id: &str) -> Result<PermissionRequest, EngineError> {
        self.requests
            .read()
            .await
            .get(request_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("permission request {request_id} not found")))
    }

    /// Oldest pending first, the order an approver works through them.
    pub async fn pending(&self) -> Vec<PermissionRequest> {
        let mut pending: Vec<_> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.requested_at);
        pending
    }

    /// Newest first, paginated.
    pub async fn list(&self, filter: &PermissionFilter) -> PermissionPage {
        let per_page = filter.per_page.unwrap_or(10).clamp(1, 100);
        let page = filter.page.unwrap_or(1).max(1);

        let mut matching: Vec<_> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| filter.user_id.as_deref().is_none_or(|u| r.user_id == u))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .collect();

        PermissionPage {
            data,
            page,
            per_page,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::utils::clock::ManualClock;
    use chrono::{TimeDelta, Utc};

    async fn workflow() -> (Arc<ManualClock>, PermissionWorkflow) {
        let clock = Arc::new(ManualClock::new("2026-03-02T04:00:00Z".parse::<chrono::DateTime<Utc>>().unwrap()));
        let workflow = PermissionWorkflow::load(
            Arc::new(InMemoryStore::default()),
            clock.clone(),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        )
        .await
        .unwrap();
        (clock, workflow)
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[tokio::test]
    async fn empty_reason_is_rejected() {
        let (_, workflow) = workflow().await;
        let err = workflow.request("u1", "Sara", "   ", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(workflow.pending().await.is_empty());
    }

    #[tokio::test]
    async fn request_defaults_to_local_today() {
        let (_, workflow) = workflow().await;
        let request = workflow.request("u1", "Sara", "clinic", None).await.unwrap();
        assert_eq!(request.date, march(2));
        assert_eq!(request.status, PermissionStatus::Pending);
    }

    #[tokio::test]
    async fn decisions_are_terminal() {
        let (_, workflow) = workflow().await;
        let request = workflow.request("u1", "Sara", "clinic", None).await.unwrap();

        let approved = workflow.decide(&request.id, Decision::Approved).await.unwrap();
        assert_eq!(approved.status, PermissionStatus::Approved);

        for decision in [Decision::Approved, Decision::Rejected] {
            let err = workflow.decide(&request.id, decision).await.unwrap_err();
            assert!(matches!(err, EngineError::Conflict(ref m) if m == "already decided"));
        }
        assert_eq!(workflow.get(&request.id).await.unwrap().status, PermissionStatus::Approved);

        assert!(matches!(
            workflow.decide("missing", Decision::Rejected).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_approved_requests_excuse_the_day() {
        let (clock, workflow) = workflow().await;
        let rejected = workflow.request("u1", "Sara", "first try", Some(march(2))).await.unwrap();
        workflow.decide(&rejected.id, Decision::Rejected).await.unwrap();
        assert!(!workflow.has_approved_for("u1", march(2)).await);

        clock.advance(TimeDelta::minutes(5));
        let resubmitted = workflow.request("u1", "Sara", "second try", Some(march(2))).await.unwrap();
        assert!(!workflow.has_approved_for("u1", march(2)).await);

        workflow.decide(&resubmitted.id, Decision::Approved).await.unwrap();
        assert!(workflow.has_approved_for("u1", march(2)).await);
        assert!(!workflow.has_approved_for("u1", march(3)).await);
        assert!(!workflow.has_approved_for("u2", march(2)).await);
        assert_eq!(
            workflow.approved_for("u1", march(2)).await.unwrap().reason,
            "second try"
        );
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let (clock, workflow) = workflow().await;
        for i in 0..5 {
            clock.advance(TimeDelta::minutes(1));
            workflow.request("u1", "Sara", &format!("r{i}"), None).await.unwrap();
        }
        workflow.request("u2", "Omar", "other", None).await.unwrap();

        let page = workflow
            .list(&PermissionFilter {
                user_id: Some("u1".into()),
                page: Some(2),
                per_page: Some(2),
                ..Default::default()
            })
            .await;
        assert_eq!(page.total, 5);
        let reasons: Vec<_> = page.data.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons, ["r2", "r1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decisions_settle_once() {
        let (_, workflow) = workflow().await;
        let workflow = Arc::new(workflow);
        let request = workflow.request("u1", "Sara", "clinic", None).await.unwrap();

        let approve = {
            let workflow = workflow.clone();
            let id = request.id.clone();
            tokio::spawn(async move { workflow.decide(&id, Decision::Approved).await })
        };
        let reject = {
            let workflow = workflow.clone();
            let id = request.id.clone();
            tokio::spawn(async move { workflow.decide(&id, Decision::Rejected).await })
        };

        let results = [approve.await.unwrap(), reject.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }
}
