//! Memo workflow state machine.
//!
//! # Responsibility
//! - Decide which status moves are legal and what each move writes.
//! - Persist a move, its delivery rows and its audit entry.
//!
//! # Invariants
//! - An illegal move is refused before anything is written.
//! - Approval and rejection fields are never set together.
//! - Rejection fields survive only while a memo is rejected, resubmitted
//!   (pending) or trashed; revising or sending clears them.
//! - Archive and delete remember the status they came from; unarchive and
//!   restore return exactly there.
//! - Stored status changes are compare-and-set on the status the caller saw.
//! - `transition` validates legality only; `authorize_and_transition` also
//!   checks the move's permission.

use crate::clock::{Clock, EpochMillis};
use crate::error::{CoreError, CoreResult};
use crate::model::activity::{ActivityLogEntry, RequestContext};
use crate::model::actor::Actor;
use crate::model::memo::{Memo, MemoAcknowledgment, MemoId, MemoStatus};
use crate::model::permission::{
    MEMO_ACKNOWLEDGE, MEMO_APPROVE, MEMO_ARCHIVE, MEMO_CREATE, MEMO_DELETE, MEMO_EDIT,
    MEMO_REJECT, MEMO_SEND, MEMO_VIEW,
};
use crate::model::role::Role;
use crate::repo::memo_repo::MemoRepository;
use crate::repo::RepoError;
use crate::service::activity_logger::ActivityLogger;
use crate::service::rbac::Authorizer;
use log::{info, warn};

/// Named status move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoTransition {
    Submit,
    Resubmit,
    Send,
    Approve,
    Reject,
    MarkRead,
    Archive,
    Unarchive,
    Revise,
    Delete,
    Restore,
}

impl MemoTransition {
    /// Activity action recorded for this move.
    pub fn name(self) -> &'static str {
        match self {
            Self::Submit => "memo.submit",
            Self::Resubmit => "memo.resubmit",
            Self::Send => "memo.send",
            Self::Approve => "memo.approve",
            Self::Reject => "memo.reject",
            Self::MarkRead => "memo.read",
            Self::Archive => "memo.archive",
            Self::Unarchive => "memo.unarchive",
            Self::Revise => "memo.revise",
            Self::Delete => "memo.delete",
            Self::Restore => "memo.restore",
        }
    }

    pub fn required_permission(self) -> &'static str {
        match self {
            Self::Submit | Self::Resubmit => MEMO_CREATE,
            Self::Send => MEMO_SEND,
            Self::Approve => MEMO_APPROVE,
            Self::Reject => MEMO_REJECT,
            Self::MarkRead => MEMO_VIEW,
            Self::Archive | Self::Unarchive => MEMO_ARCHIVE,
            Self::Revise => MEMO_EDIT,
            Self::Delete | Self::Restore => MEMO_DELETE,
        }
    }

    /// Whether recipients see the memo after this move.
    pub fn delivers(self) -> bool {
        matches!(self, Self::Approve | Self::Send)
    }
}

/// Optional inputs for a move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionExtra {
    /// Required when rejecting.
    pub reason: Option<String>,
    pub request: RequestContext,
}

impl TransitionExtra {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            request: RequestContext::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub memo: Memo,
    pub log_entry: ActivityLogEntry,
    /// Delivery rows written by this move; empty unless it delivers.
    pub acknowledgments: Vec<MemoAcknowledgment>,
}

/// Resolves `memo.status -> target` to a named move.
///
/// # Errors
/// - `InvalidTransition` for every pair not in the transition table.
pub fn plan_transition(
    memo: &Memo,
    target: MemoStatus,
    actor_role: Role,
) -> CoreResult<MemoTransition> {
    use MemoStatus::{Approved, Archived, Deleted, Draft, Pending, Read, Rejected, Sent};

    let transition = match (memo.status, target) {
        (Draft, Pending) => Some(MemoTransition::Submit),
        (Rejected, Pending) => Some(MemoTransition::Resubmit),
        (Draft, Sent) if actor_role.skips_memo_approval() => Some(MemoTransition::Send),
        (Approved, Sent) => Some(MemoTransition::Send),
        (Pending, Approved) => Some(MemoTransition::Approve),
        (Pending, Rejected) => Some(MemoTransition::Reject),
        (Sent, Read) => Some(MemoTransition::MarkRead),
        (Sent | Read | Approved, Archived) => Some(MemoTransition::Archive),
        (Archived, to) if memo.archived_from == Some(to) => Some(MemoTransition::Unarchive),
        (Rejected, Draft) => Some(MemoTransition::Revise),
        (Deleted, to) if memo.deleted_from == Some(to) => Some(MemoTransition::Restore),
        (from, Deleted) if from != Deleted => Some(MemoTransition::Delete),
        _ => None,
    };

    transition.ok_or(CoreError::InvalidTransition {
        from: memo.status,
        to: target,
    })
}

/// Produces the memo as it looks after `transition`. Does not persist.
fn apply_transition(
    memo: &Memo,
    transition: MemoTransition,
    target: MemoStatus,
    actor: Option<&Actor>,
    extra: &TransitionExtra,
    now: EpochMillis,
) -> CoreResult<Memo> {
    let mut next = memo.clone();
    next.status = target;
    next.updated_at = now;

    match transition {
        MemoTransition::Approve => {
            let approver = actor.ok_or_else(|| {
                CoreError::Validation("approving a memo requires an actor".to_string())
            })?;
            next.approved_by = Some(approver.id);
            next.approved_at = Some(now);
            clear_rejection(&mut next);
        }
        MemoTransition::Reject => {
            let rejecter = actor.ok_or_else(|| {
                CoreError::Validation("rejecting a memo requires an actor".to_string())
            })?;
            let reason = extra
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .ok_or_else(|| CoreError::Validation("rejection reason is required".to_string()))?;
            next.rejected_by = Some(rejecter.id);
            next.rejected_at = Some(now);
            next.rejection_reason = Some(reason.to_string());
            next.approved_by = None;
            next.approved_at = None;
        }
        MemoTransition::Send => {
            if memo.recipients.is_empty() {
                return Err(CoreError::Validation(
                    "memo has no recipients to send to".to_string(),
                ));
            }
            next.sent_at = Some(now);
            clear_rejection(&mut next);
        }
        MemoTransition::Archive => next.archived_from = Some(memo.status),
        MemoTransition::Unarchive => next.archived_from = None,
        MemoTransition::Delete => next.deleted_from = Some(memo.status),
        MemoTransition::Restore => next.deleted_from = None,
        MemoTransition::Revise => clear_rejection(&mut next),
        MemoTransition::Submit | MemoTransition::Resubmit | MemoTransition::MarkRead => {}
    }

    next.validate().map_err(|err| CoreError::Validation(err.to_string()))?;
    Ok(next)
}

fn clear_rejection(memo: &mut Memo) {
    memo.rejected_by = None;
    memo.rejected_at = None;
    memo.rejection_reason = None;
}

pub struct MemoWorkflow<'a, M: MemoRepository> {
    memos: M,
    authorizer: &'a dyn Authorizer,
    audit: &'a dyn ActivityLogger,
    clock: &'a dyn Clock,
}

impl<'a, M: MemoRepository> MemoWorkflow<'a, M> {
    pub fn new(
        memos: M,
        authorizer: &'a dyn Authorizer,
        audit: &'a dyn ActivityLogger,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            memos,
            authorizer,
            audit,
            clock,
        }
    }

    /// Stores a new memo.
    pub fn create_memo(&self, memo: &Memo) -> CoreResult<MemoId> {
        Ok(self.memos.create_memo(memo)?)
    }

    pub fn get_memo(&self, id: MemoId) -> CoreResult<Memo> {
        self.memos.get_memo(id)?.ok_or_else(|| memo_not_found(id))
    }

    /// Moves `memo` to `target` without a permission check.
    ///
    /// `memo` must be the caller's current view of the stored row; the write
    /// fails with a stale-write error when the stored status has moved on.
    pub fn transition(
        &self,
        memo: &Memo,
        target: MemoStatus,
        actor: &Actor,
        extra: &TransitionExtra,
    ) -> CoreResult<TransitionOutcome> {
        let transition = self.plan(memo, target, actor.role)?;
        self.commit(memo, transition, target, Some(actor), extra)
    }

    /// Loads the memo, plans the move, checks its permission and applies it.
    pub fn authorize_and_transition(
        &self,
        memo_id: MemoId,
        target: MemoStatus,
        actor: &Actor,
        extra: &TransitionExtra,
    ) -> CoreResult<TransitionOutcome> {
        let memo = self.get_memo(memo_id)?;
        let transition = self.plan(&memo, target, actor.role)?;
        self.authorizer
            .require(Some(actor), transition.required_permission())?;
        self.commit(&memo, transition, target, Some(actor), extra)
    }

    /// Marks `actor`'s delivery row as acknowledged. Repeated calls keep the
    /// first acknowledgment time.
    pub fn acknowledge_memo(
        &self,
        memo_id: MemoId,
        actor: &Actor,
    ) -> CoreResult<MemoAcknowledgment> {
        self.authorizer.require(Some(actor), MEMO_ACKNOWLEDGE)?;
        let memo = self.get_memo(memo_id)?;
        let now = self.clock.now_ms();

        let acknowledgment = match self.memos.acknowledge(memo_id, &actor.email, now) {
            Ok(row) => row,
            Err(RepoError::NotFound { entity, id }) => {
                return Err(CoreError::NotFound { entity, id });
            }
            Err(err) => return Err(err.into()),
        };

        self.audit.record(
            &ActivityLogEntry::new(Some(actor), "memo.acknowledge", memo.subject.as_str(), now)
                .with_target_id(memo_id.to_string()),
        );
        Ok(acknowledgment)
    }

    /// Sends every approved memo whose scheduled time has passed.
    ///
    /// Memos another worker moved first are skipped.
    pub fn send_due_scheduled(&self) -> CoreResult<Vec<TransitionOutcome>> {
        let now = self.clock.now_ms();
        let mut sent = Vec::new();
        for memo in self.memos.list_due_scheduled(now)? {
            match self.commit(
                &memo,
                MemoTransition::Send,
                MemoStatus::Sent,
                None,
                &TransitionExtra::default(),
            ) {
                Ok(outcome) => sent.push(outcome),
                Err(CoreError::Repo(RepoError::StaleWrite { id, .. })) => {
                    info!("event=memo_schedule module=service status=skipped memo_id={id}");
                }
                Err(err) => return Err(err),
            }
        }
        if !sent.is_empty() {
            info!(
                "event=memo_schedule module=service status=ok sent={}",
                sent.len()
            );
        }
        Ok(sent)
    }

    fn plan(&self, memo: &Memo, target: MemoStatus, role: Role) -> CoreResult<MemoTransition> {
        plan_transition(memo, target, role).inspect_err(|_| {
            warn!(
                "event=memo_transition module=service status=invalid memo_id={} from={} to={}",
                memo.id, memo.status, target
            );
        })
    }

    fn commit(
        &self,
        memo: &Memo,
        transition: MemoTransition,
        target: MemoStatus,
        actor: Option<&Actor>,
        extra: &TransitionExtra,
    ) -> CoreResult<TransitionOutcome> {
        let now = self.clock.now_ms();
        let next = apply_transition(memo, transition, target, actor, extra, now)?;
        let delivered_at = transition.delivers().then_some(now);
        let acknowledgments = self.memos.save_transition(&next, memo.status, delivered_at)?;

        let mut entry = ActivityLogEntry::new(actor, transition.name(), memo.subject.as_str(), now)
            .with_target_id(memo.id.to_string())
            .with_detail("from", memo.status.as_str())
            .with_detail("to", target.as_str())
            .with_request(extra.request.clone());
        if let Some(reason) = &next.rejection_reason {
            if transition == MemoTransition::Reject {
                entry = entry.with_detail("reason", reason.as_str());
            }
        }
        if !acknowledgments.is_empty() {
            entry = entry.with_detail("recipients", acknowledgments.len() as u64);
        }
        self.audit.record(&entry);

        info!(
            "event=memo_transition module=service status=ok memo_id={} transition={} from={} to={}",
            memo.id,
            transition.name(),
            memo.status,
            target
        );
        Ok(TransitionOutcome {
            memo: next,
            log_entry: entry,
            acknowledgments,
        })
    }
}

fn memo_not_found(id: MemoId) -> CoreError {
    CoreError::NotFound {
        entity: "memo",
        id: id.to_string(),
    }
}
