use std::collections::HashMap;
use std::sync::{mpsc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lock::LockError;

/// Classes of activity competing for the receiver. Priorities are assigned
/// per kind at startup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequesterKind {
    Observation,
    DeviceProbe,
    Monitor,
}

/// Message delivered to a requester when it loses or may regain the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockNotice {
    Suspend,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Denied,
}

impl Acquire {
    pub fn is_granted(self) -> bool {
        matches!(self, Acquire::Granted)
    }
}

/// Owned handle identifying one requester instance. Notices are pushed into
/// the requester's own channel; the lock never calls into requester code.
#[derive(Debug, Clone)]
pub struct Requester {
    kind: RequesterKind,
    id: Uuid,
    notices: mpsc::Sender<LockNotice>,
}

impl Requester {
    pub fn new(kind: RequesterKind) -> (Self, mpsc::Receiver<LockNotice>) {
        let (notices, rx) = mpsc::channel();
        let requester = Self {
            kind,
            id: Uuid::new_v4(),
            notices,
        };
        (requester, rx)
    }

    pub fn kind(&self) -> RequesterKind {
        self.kind
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn notify(&self, notice: LockNotice) -> bool {
        match self.notices.send(notice) {
            Ok(()) => true,
            Err(_) => {
                log::warn!(
                    "Unable to deliver {:?} to {} ({}): receiver gone",
                    notice,
                    self.kind,
                    self.id
                );
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct LockState {
    priorities: HashMap<RequesterKind, u32>,
    holder: Option<Requester>,
    // in order of entering the waiting set
    waiters: Vec<Requester>,
}

impl LockState {
    fn priority(&self, kind: RequesterKind) -> Result<u32, LockError> {
        self.priorities
            .get(&kind)
            .copied()
            .ok_or(LockError::Unregistered(kind))
    }

    fn enqueue(&mut self, requester: Requester) {
        match self.waiters.iter_mut().find(|w| w.id == requester.id) {
            Some(existing) => *existing = requester,
            None => self.waiters.push(requester),
        }
    }

    fn dequeue(&mut self, id: Uuid) {
        self.waiters.retain(|w| w.id != id);
    }

    /// Index of the highest priority waiter, earliest first on ties.
    fn next_waiter(&self) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (index, waiter) in self.waiters.iter().enumerate() {
            let Some(&priority) = self.priorities.get(&waiter.kind) else {
                continue;
            };
            if best.is_none_or(|(_, top)| priority > top) {
                best = Some((index, priority));
            }
        }
        best.map(|(index, _)| index)
    }
}

/// Exclusive, preemptible lock over the single receiver.
#[derive(Debug, Default)]
pub struct PriorityLock {
    state: Mutex<LockState>,
}

impl PriorityLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, kind: RequesterKind, priority: u32) -> Result<(), LockError> {
        if priority == 0 {
            return Err(LockError::InvalidPriority(kind));
        }
        let mut state = self.state();
        if let Some(previous) = state.priorities.insert(kind, priority) {
            if previous != priority {
                log::warn!(
                    "Priority of {} changed from {} to {}",
                    kind,
                    previous,
                    priority
                );
            }
        }
        Ok(())
    }

    /// Non-blocking acquisition. A strictly higher priority displaces the
    /// current holder, which is sent `Suspend` and starts waiting.
    pub fn try_acquire(&self, requester: &Requester) -> Result<Acquire, LockError> {
        let mut state = self.state();
        let priority = state.priority(requester.kind).inspect_err(|e| {
            log::error!("Lock requested by misconfigured requester: {}", e);
        })?;

        let holder = state.holder.as_ref().map(|h| (h.id, h.kind));
        match holder {
            None => {
                state.holder = Some(requester.clone());
                state.dequeue(requester.id);
                log::debug!("Receiver locked by {}", requester.kind);
                Ok(Acquire::Granted)
            }
            Some((id, _)) if id == requester.id => Ok(Acquire::Granted),
            Some((_, held_by)) => {
                let held = state.priority(held_by)?;
                if priority > held {
                    let displaced = state.holder.replace(requester.clone());
                    state.dequeue(requester.id);
                    if let Some(displaced) = displaced {
                        log::info!(
                            "Receiver taken from {} by {}",
                            displaced.kind,
                            requester.kind
                        );
                        if displaced.notify(LockNotice::Suspend) {
                            state.enqueue(displaced);
                        }
                    }
                    Ok(Acquire::Granted)
                } else {
                    log::debug!(
                        "Receiver busy: {} ({}) holds it, {} ({}) waits",
                        held_by,
                        held,
                        requester.kind,
                        priority
                    );
                    state.enqueue(requester.clone());
                    Ok(Acquire::Denied)
                }
            }
        }
    }

    /// Releases the receiver if `requester` holds it and resumes the waiter
    /// with the highest priority. Ties go to the one that has waited longest.
    pub fn release(&self, requester: &Requester) {
        let mut state = self.state();
        if state.holder.as_ref().map(|h| h.id) != Some(requester.id) {
            return;
        }
        state.holder = None;
        state.dequeue(requester.id);
        log::debug!("Receiver released by {}", requester.kind);

        while let Some(index) = state.next_waiter() {
            let next = &state.waiters[index];
            log::info!("Resuming {}", next.kind);
            if next.notify(LockNotice::Resume) {
                break;
            }
            state.waiters.remove(index);
        }
    }

    pub fn holder(&self) -> Option<Requester> {
        self.state().holder.clone()
    }

    pub fn is_waiting(&self, requester: &Requester) -> bool {
        self.state().waiters.iter().any(|w| w.id == requester.id)
    }
}
