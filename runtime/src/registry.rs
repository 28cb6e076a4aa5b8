//! Task registry: which background task currently owns each cancellation slot.
//!
//! Only the store touches the registry, and only while holding its core lock,
//! so nothing here synchronizes on its own.

use futures::future::Shared;
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Resolves once a task has terminated, whether it finished or was aborted.
///
/// The sender half lives inside the task future, so dropping the future
/// (completion or abort) resolves every clone.
pub(crate) type Completion = Shared<oneshot::Receiver<()>>;

/// A running keyed task
pub(crate) struct TaskEntry {
    /// Distinguishes this task from a later one started under the same key
    pub(crate) token: u64,
    pub(crate) abort: AbortHandle,
    pub(crate) done: Completion,
}

/// Keyed slots plus the set of unkeyed (fire-and-forget) tasks
pub(crate) struct TaskRegistry<Id> {
    tasks: HashMap<Id, TaskEntry>,
    detached: HashMap<u64, AbortHandle>,
    next_token: u64,
}

impl<Id> Default for TaskRegistry<Id> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            detached: HashMap::new(),
            next_token: 0,
        }
    }
}

impl<Id> TaskRegistry<Id>
where
    Id: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hand out a token no other task has used
    pub(crate) fn next_token(&mut self) -> u64 {
        self.next_token = self.next_token.wrapping_add(1);
        self.next_token
    }

    /// Store `entry` under `id`, aborting and returning whatever held the slot
    pub(crate) fn register(&mut self, id: Id, entry: TaskEntry) -> Option<TaskEntry> {
        let prior = self.tasks.insert(id, entry);
        if let Some(prior) = &prior {
            prior.abort.abort();
        }
        prior
    }

    /// Abort and remove the task in `id`'s slot
    ///
    /// Removal is immediate; the task itself may still be unwinding. A missing
    /// entry is not an error.
    pub(crate) fn cancel(&mut self, id: &Id) -> Option<TaskEntry> {
        let entry = self.tasks.remove(id)?;
        entry.abort.abort();
        Some(entry)
    }

    /// Remove `id`'s entry after natural completion
    ///
    /// Only removes it if it still belongs to the task holding `token`.
    /// Returns whether that task was still current, i.e. whether its result
    /// may be delivered.
    pub(crate) fn complete(&mut self, id: &Id, token: u64) -> bool {
        if self.is_current(id, token) {
            self.tasks.remove(id);
            true
        } else {
            false
        }
    }

    /// Whether `id` is held by the task with `token`
    pub(crate) fn is_current(&self, id: &Id, token: u64) -> bool {
        self.tasks.get(id).is_some_and(|entry| entry.token == token)
    }

    pub(crate) fn contains(&self, id: &Id) -> bool {
        self.tasks.contains_key(id)
    }

    pub(crate) fn ids(&self) -> Vec<Id> {
        self.tasks.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Remember an unkeyed task so shutdown can abort it
    pub(crate) fn track_detached(&mut self, token: u64, abort: AbortHandle) {
        self.detached.insert(token, abort);
    }

    /// Forget an unkeyed task; returns whether it was still tracked
    pub(crate) fn complete_detached(&mut self, token: u64) -> bool {
        self.detached.remove(&token).is_some()
    }

    pub(crate) fn is_detached(&self, token: u64) -> bool {
        self.detached.contains_key(&token)
    }

    /// Abort every keyed task, returning how many there were
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, entry) in self.tasks.drain() {
            entry.abort.abort();
        }
        count
    }

    /// Abort every unkeyed task, returning how many there were
    pub(crate) fn abort_detached(&mut self) -> usize {
        let count = self.detached.len();
        for (_, abort) in self.detached.drain() {
            abort.abort();
        }
        count
    }
}
