//! Operator-triggered allocation actions.
//!
//! Each invocation walks `Idle -> Confirming -> Dispatched -> {Completed | Failed}`.
//! The tracker owns the confirming slot and the set of dispatched
//! `(action, allocation)` pairs; completion and failure are terminal and return
//! the pair to idle.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::dispatch::Msg;
use crate::format::short_id;
use crate::model::AllocTarget;
use crate::nomad::ClusterClient;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AdminAction {
    Restart,
    Stop,
}

impl AdminAction {
    pub const ALL: [Self; 2] = [Self::Restart, Self::Stop];

    pub fn label(self) -> &'static str {
        match self {
            Self::Restart => "Restart",
            Self::Stop => "Stop",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Restart => "Restarted",
            Self::Stop => "Stopped",
        }
    }
}

pub fn admin_text(action: AdminAction, target: &AllocTarget) -> String {
    format!(
        "{} allocation {} ({})",
        action.label(),
        target.name,
        short_id(&target.id)
    )
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AdminPhase {
    Idle,
    Confirming,
    Dispatched,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingAdmin {
    pub action: AdminAction,
    pub target: AllocTarget,
}

impl PendingAdmin {
    pub fn prompt(&self) -> String {
        admin_text(self.action, &self.target)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AdminRejection {
    #[error("{0} is already in progress")]
    AlreadyDispatched(String),
}

#[derive(Debug, Default)]
pub struct AdminTracker {
    confirming: Option<PendingAdmin>,
    dispatched: HashSet<(AdminAction, String)>,
}

impl AdminTracker {
    pub fn phase(&self, action: AdminAction, alloc_id: &str) -> AdminPhase {
        if self.dispatched.contains(&(action, alloc_id.to_string())) {
            AdminPhase::Dispatched
        } else if self
            .confirming
            .as_ref()
            .is_some_and(|pending| pending.action == action && pending.target.id == alloc_id)
        {
            AdminPhase::Confirming
        } else {
            AdminPhase::Idle
        }
    }

    pub fn confirming(&self) -> Option<&PendingAdmin> {
        self.confirming.as_ref()
    }

    pub fn dispatched_count(&self) -> usize {
        self.dispatched.len()
    }

    /// Opens the confirmation step, replacing any earlier unconfirmed request.
    pub fn request(
        &mut self,
        action: AdminAction,
        target: AllocTarget,
    ) -> Result<&PendingAdmin, AdminRejection> {
        if self.dispatched.contains(&(action, target.id.clone())) {
            return Err(AdminRejection::AlreadyDispatched(admin_text(
                action, &target,
            )));
        }
        let pending = self.confirming.insert(PendingAdmin { action, target });
        Ok(&*pending)
    }

    /// Second keypress: moves the confirming invocation to `Dispatched`.
    pub fn confirm(&mut self) -> Option<PendingAdmin> {
        let pending = self.confirming.take()?;
        self.dispatched
            .insert((pending.action, pending.target.id.clone()));
        Some(pending)
    }

    pub fn cancel(&mut self) -> Option<PendingAdmin> {
        self.confirming.take()
    }

    /// Records a terminal outcome. Returns false for outcomes that were not
    /// dispatched by this tracker.
    pub fn finish(&mut self, action: AdminAction, alloc_id: &str) -> bool {
        self.dispatched.remove(&(action, alloc_id.to_string()))
    }
}

/// Runs one admin action. The allocation is re-read by id first so the
/// mutation always targets current server state; a failed lookup fails the
/// action without mutating anything.
pub async fn perform<C: ClusterClient>(client: &C, action: AdminAction, target: AllocTarget) -> Msg {
    let alloc = match client.get_allocation(&target.id).await {
        Ok(alloc) => alloc,
        Err(error) => {
            return Msg::ActionFailed {
                action,
                target,
                error: error.to_string(),
            };
        }
    };

    debug!(
        "admin action={} alloc={} name={} resolved",
        action.label(),
        alloc.id,
        alloc.name
    );
    let result = match action {
        AdminAction::Restart => client.restart_allocation(&alloc).await,
        AdminAction::Stop => client.stop_allocation(&alloc).await,
    };

    match result {
        Ok(()) => Msg::ActionComplete { action, target },
        Err(error) => Msg::ActionFailed {
            action,
            target,
            error: error.to_string(),
        },
    }
}
