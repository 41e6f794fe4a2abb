//! Tool-call vetting coordinator.
//!
//! Calls to tools flagged `requires_vetting` are held back until an external
//! approver decides on each of them. The coordinator keeps a pending table of
//! open requests (request id -> decisions so far + oneshot waker) and publishes
//! every new request on a broadcast channel. Approvers answer through
//! [`VettingCoordinator::submit_approvals`], possibly over several calls.
//!
//! There is no timeout. A waiting turn ends only when every reviewed call is
//! decided, when its cancellation token fires, or when the wait future is
//! dropped; the last two release the pending entry without resolving it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use parley_types::conversation::ConversationId;
use parley_types::error::VettingError;
use parley_types::event::ToolApproval;
use parley_types::message::ToolCall;

use crate::tool::executor::ApprovedCall;
use crate::tool::registry::ToolRegistry;

/// Buffer size for the request broadcast channel.
const REQUEST_BUFFER: usize = 64;

/// A batch of reviewed calls waiting for human decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VettingRequest {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    /// Only the calls that need review, in proposal order.
    pub calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
}

/// Result of submitting decisions for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// No pending request with that id (already resolved, cancelled, or never existed).
    Unknown,
    /// Some reviewed calls are still undecided.
    Waiting { remaining: usize },
    /// Every reviewed call is decided; the waiting turn has been woken.
    Resolved,
}

struct PendingVetting {
    request: VettingRequest,
    decisions: Vec<Option<bool>>,
    waker: Option<oneshot::Sender<Vec<bool>>>,
}

impl PendingVetting {
    fn remaining(&self) -> usize {
        self.decisions.iter().filter(|d| d.is_none()).count()
    }
}

pub struct VettingCoordinator {
    pending: DashMap<Uuid, PendingVetting>,
    sender: broadcast::Sender<VettingRequest>,
}

impl Default for VettingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl VettingCoordinator {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(REQUEST_BUFFER);
        Self {
            pending: DashMap::new(),
            sender,
        }
    }

    /// Subscribe to newly opened vetting requests.
    pub fn subscribe(&self) -> broadcast::Receiver<VettingRequest> {
        self.sender.subscribe()
    }

    /// Snapshot of every open request, oldest first.
    ///
    /// Approvers that subscribe late use this to catch up.
    pub fn pending_requests(&self) -> Vec<VettingRequest> {
        let mut requests: Vec<VettingRequest> = self
            .pending
            .iter()
            .map(|entry| entry.request.clone())
            .collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
        requests
    }

    /// Partition `calls` and open a request for the reviewed subset.
    ///
    /// The request (if any) is registered and published before this returns,
    /// so callers can log it before they start waiting.
    pub fn begin(
        &self,
        conversation_id: ConversationId,
        calls: &[ToolCall],
        registry: &ToolRegistry,
    ) -> PendingBatch<'_> {
        let reviewed: Vec<bool> = calls
            .iter()
            .map(|call| registry.requires_vetting(&call.name))
            .collect();

        let reviewed_calls: Vec<ToolCall> = calls
            .iter()
            .zip(&reviewed)
            .filter(|(_, needs_review)| **needs_review)
            .map(|(call, _)| call.clone())
            .collect();

        let mut batch = PendingBatch {
            coordinator: self,
            calls: calls.to_vec(),
            reviewed,
            request: None,
            receiver: None,
        };
        if reviewed_calls.is_empty() {
            return batch;
        }

        let request = VettingRequest {
            id: Uuid::now_v7(),
            conversation_id,
            calls: reviewed_calls,
            created_at: Utc::now(),
        };
        let (waker, receiver) = oneshot::channel();
        self.pending.insert(
            request.id,
            PendingVetting {
                request: request.clone(),
                decisions: vec![None; request.calls.len()],
                waker: Some(waker),
            },
        );

        match self.sender.send(request.clone()) {
            Ok(count) => debug!(request_id = %request.id, subscribers = count, "published vetting request"),
            Err(_) => debug!(request_id = %request.id, "no vetting subscribers; request stays pending"),
        }
        info!(
            request_id = %request.id,
            %conversation_id,
            reviewed = request.calls.len(),
            total = calls.len(),
            "tool calls awaiting approval"
        );

        batch.request = Some(request);
        batch.receiver = Some(receiver);
        batch
    }

    /// Partition, publish and wait in one step.
    pub async fn vet(
        &self,
        conversation_id: ConversationId,
        calls: &[ToolCall],
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<VettingOutcome, VettingError> {
        self.begin(conversation_id, calls, registry).wait(cancel).await
    }

    /// Record decisions for an open request.
    ///
    /// Decisions for call ids outside the request are ignored, and the first
    /// decision recorded for a call wins. A decision applies to every reviewed
    /// call carrying that id.
    pub fn submit_approvals(&self, request_id: Uuid, approvals: &[ToolApproval]) -> ApprovalStatus {
        let remaining = {
            let Some(mut pending) = self.pending.get_mut(&request_id) else {
                debug!(%request_id, "approvals for unknown vetting request");
                return ApprovalStatus::Unknown;
            };
            let pending = &mut *pending;
            for approval in approvals {
                let mut matched = false;
                let mut recorded = false;
                for (call, decision) in pending.request.calls.iter().zip(&mut pending.decisions) {
                    if call.id != approval.call_id {
                        continue;
                    }
                    matched = true;
                    if decision.is_none() {
                        *decision = Some(approval.allowed);
                        recorded = true;
                    }
                }
                if !matched {
                    debug!(%request_id, call_id = %approval.call_id, "approval for unknown call");
                } else if !recorded {
                    debug!(%request_id, call_id = %approval.call_id, "call already decided");
                }
            }
            pending.remaining()
        };

        if remaining > 0 {
            return ApprovalStatus::Waiting { remaining };
        }
        self.resolve(&request_id)
    }

    /// Remove a fully decided request and wake its waiter.
    ///
    /// Reports `Unknown` when the request was released in the meantime.
    fn resolve(&self, request_id: &Uuid) -> ApprovalStatus {
        let Some((_, mut pending)) = self.pending.remove(request_id) else {
            debug!(%request_id, "vetting request released before it resolved");
            return ApprovalStatus::Unknown;
        };
        let decisions: Vec<bool> = pending
            .decisions
            .iter()
            .map(|d| d.unwrap_or(false))
            .collect();
        if let Some(waker) = pending.waker.take() {
            // The waiter may already be gone; nothing to do then.
            let _ = waker.send(decisions);
        }
        info!(%request_id, "vetting request resolved");
        ApprovalStatus::Resolved
    }

    fn release(&self, request_id: &Uuid) {
        if self.pending.remove(request_id).is_some() {
            debug!(%request_id, "released unresolved vetting request");
        }
    }
}

/// A partitioned batch, registered with the coordinator until it is waited on
/// to completion or dropped.
pub struct PendingBatch<'a> {
    coordinator: &'a VettingCoordinator,
    calls: Vec<ToolCall>,
    reviewed: Vec<bool>,
    request: Option<VettingRequest>,
    receiver: Option<oneshot::Receiver<Vec<bool>>>,
}

impl PendingBatch<'_> {
    /// The published request, or `None` when every call was auto-approved.
    pub fn request(&self) -> Option<&VettingRequest> {
        self.request.as_ref()
    }

    /// Wait until every reviewed call is decided.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<VettingOutcome, VettingError> {
        let Some(receiver) = self.receiver.take() else {
            return Ok(VettingOutcome {
                approvals: vec![true; self.calls.len()],
                calls: std::mem::take(&mut self.calls),
                request: None,
            });
        };
        let request_id = self.request.as_ref().map(|r| r.id).unwrap_or_default();

        let decisions = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%request_id, "vetting cancelled");
                return Err(VettingError::Cancelled(request_id));
            }
            received = receiver => received.map_err(|_| VettingError::Abandoned(request_id))?,
        };

        let mut reviewed_decisions = decisions.into_iter();
        let approvals = self
            .reviewed
            .iter()
            .map(|needs_review| {
                if *needs_review {
                    reviewed_decisions.next().unwrap_or(false)
                } else {
                    true
                }
            })
            .collect();

        Ok(VettingOutcome {
            calls: std::mem::take(&mut self.calls),
            approvals,
            request: self.request.take(),
        })
    }
}

impl Drop for PendingBatch<'_> {
    fn drop(&mut self) {
        if let Some(request) = &self.request {
            self.coordinator.release(&request.id);
        }
    }
}

/// One call's fate after vetting.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Approved(ApprovedCall<'a>),
    Rejected(&'a ToolCall),
}

/// Merged result of a vetting round.
#[derive(Debug, Clone)]
pub struct VettingOutcome {
    /// The published request, if any call needed review.
    pub request: Option<VettingRequest>,
    /// Every proposed call, in proposal order.
    pub calls: Vec<ToolCall>,
    /// One entry per call in `calls`; auto-approved calls are always `true`.
    pub approvals: Vec<bool>,
}

impl VettingOutcome {
    /// Decisions for the reviewed calls only, suitable for an approval event.
    pub fn decisions(&self) -> Vec<ToolApproval> {
        let Some(request) = &self.request else {
            return Vec::new();
        };
        request
            .calls
            .iter()
            .filter_map(|reviewed| {
                let index = self.calls.iter().position(|c| c.id == reviewed.id)?;
                Some(ToolApproval {
                    call_id: reviewed.id.clone(),
                    allowed: self.approvals[index],
                })
            })
            .collect()
    }

    /// Pair every call with its resolution, in proposal order.
    pub fn resolutions(&self) -> impl Iterator<Item = Resolution<'_>> {
        self.calls
            .iter()
            .zip(&self.approvals)
            .map(|(call, allowed)| {
                if *allowed {
                    Resolution::Approved(ApprovedCall::new(call))
                } else {
                    Resolution::Rejected(call)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use parley_types::message::ToolDescriptor;

    fn registry() -> ToolRegistry {
        [
            ToolDescriptor::new("clock", "read the time"),
            ToolDescriptor::new("send_mail", "send an email").with_vetting(true),
            ToolDescriptor::new("delete_file", "delete a file").with_vetting(true),
        ]
        .into_iter()
        .collect()
    }

    fn approval(call_id: &str, allowed: bool) -> ToolApproval {
        ToolApproval {
            call_id: call_id.to_string(),
            allowed,
        }
    }

    #[tokio::test]
    async fn auto_approved_batch_does_not_publish() {
        let coordinator = VettingCoordinator::new();
        let calls = vec![ToolCall::new("1", "clock"), ToolCall::new("2", "unknown_tool")];

        let batch = coordinator.begin(ConversationId::new(), &calls, &registry());
        assert!(batch.request().is_none());
        let outcome = batch.wait(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.approvals, vec![true, true]);
        assert!(outcome.decisions().is_empty());
        assert!(coordinator.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn mixed_batch_merges_in_call_order() {
        let coordinator = Arc::new(VettingCoordinator::new());
        let mut requests = coordinator.subscribe();
        let calls = vec![
            ToolCall::new("call1", "clock"),
            ToolCall::new("call2", "send_mail"),
            ToolCall::new("call3", "delete_file"),
        ];

        let approver = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let request = requests.recv().await.unwrap();
                assert_eq!(request.calls.len(), 2);
                let first = coordinator.submit_approvals(request.id, &[approval("call2", true)]);
                assert_eq!(first, ApprovalStatus::Waiting { remaining: 1 });
                coordinator.submit_approvals(
                    request.id,
                    &[approval("call3", false), approval("call99", true)],
                )
            })
        };

        let outcome = coordinator
            .vet(ConversationId::new(), &calls, &registry(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.approvals, vec![true, true, false]);
        assert_eq!(approver.await.unwrap(), ApprovalStatus::Resolved);
        assert_eq!(
            outcome.decisions(),
            vec![approval("call2", true), approval("call3", false)]
        );
        assert!(coordinator.pending_requests().is_empty());

        let kinds: Vec<bool> = outcome
            .resolutions()
            .map(|r| matches!(r, Resolution::Approved(_)))
            .collect();
        assert_eq!(kinds, vec![true, true, false]);
    }

    #[tokio::test]
    async fn first_decision_wins() {
        let coordinator = VettingCoordinator::new();
        let calls = vec![ToolCall::new("a", "send_mail"), ToolCall::new("b", "delete_file")];
        let batch = coordinator.begin(ConversationId::new(), &calls, &registry());
        let id = batch.request().unwrap().id;

        coordinator.submit_approvals(id, &[approval("a", false)]);
        coordinator.submit_approvals(id, &[approval("a", true), approval("b", true)]);

        let outcome = batch.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.approvals, vec![false, true]);
    }

    #[tokio::test]
    async fn cancellation_releases_without_resolving() {
        let coordinator = Arc::new(VettingCoordinator::new());
        let calls = vec![ToolCall::new("x", "delete_file")];
        let cancel = CancellationToken::new();

        let batch = coordinator.begin(ConversationId::new(), &calls, &registry());
        let id = batch.request().unwrap().id;
        assert_eq!(coordinator.pending_requests().len(), 1);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = batch.wait(&cancel).await.unwrap_err();
        assert_eq!(err, VettingError::Cancelled(id));
        assert!(coordinator.pending_requests().is_empty());
        assert_eq!(
            coordinator.submit_approvals(id, &[approval("x", true)]),
            ApprovalStatus::Unknown
        );
    }

    #[tokio::test]
    async fn dropping_batch_releases_entry() {
        let coordinator = VettingCoordinator::new();
        let calls = vec![ToolCall::new("x", "send_mail")];
        {
            let _batch = coordinator.begin(ConversationId::new(), &calls, &registry());
            assert_eq!(coordinator.pending_requests().len(), 1);
        }
        assert!(coordinator.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn decisions_before_wait_are_kept() {
        let coordinator = VettingCoordinator::new();
        let calls = vec![ToolCall::new("m", "send_mail")];
        let batch = coordinator.begin(ConversationId::new(), &calls, &registry());
        let id = batch.request().unwrap().id;

        assert_eq!(
            coordinator.submit_approvals(id, &[approval("m", true)]),
            ApprovalStatus::Resolved
        );
        let outcome = batch.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.approvals, vec![true]);
    }

    #[test]
    fn unknown_request_is_reported() {
        let coordinator = VettingCoordinator::new();
        assert_eq!(
            coordinator.submit_approvals(Uuid::now_v7(), &[approval("a", true)]),
            ApprovalStatus::Unknown
        );
    }

    #[tokio::test]
    async fn one_decision_covers_calls_sharing_an_id() {
        let coordinator = VettingCoordinator::new();
        let calls = vec![
            ToolCall::new("dup", "send_mail"),
            ToolCall::new("dup", "delete_file"),
        ];
        let batch = coordinator.begin(ConversationId::new(), &calls, &registry());
        let id = batch.request().unwrap().id;

        assert_eq!(
            coordinator.submit_approvals(id, &[approval("dup", true)]),
            ApprovalStatus::Resolved
        );
        let outcome = tokio::time::timeout(Duration::from_secs(1), batch.wait(&CancellationToken::new()))
            .await
            .expect("wait must finish once every call is decided")
            .unwrap();
        assert_eq!(outcome.approvals, vec![true, true]);
    }

    #[test]
    fn resolving_a_released_request_reports_unknown() {
        let coordinator = VettingCoordinator::new();
        let calls = vec![ToolCall::new("x", "delete_file")];
        let batch = coordinator.begin(ConversationId::new(), &calls, &registry());
        let id = batch.request().unwrap().id;

        drop(batch);
        assert_eq!(coordinator.resolve(&id), ApprovalStatus::Unknown);
    }
}
