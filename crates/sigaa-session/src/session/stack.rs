// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Request stack controller: per-host request lanes.
//!
//! Each host gets three lanes: requests without a cookie yet (session
//! bootstrap), GET, and POST. A lane releases one entry at a time, in the
//! order entries were enqueued. Lanes are independent of each other, so a
//! cookie-establishing request never waits behind bulk GET traffic.
//!
//! Every enqueued entry publishes a shareable handle to its outcome. A
//! caller with an identical key may await that handle instead of issuing a
//! second request; all of them observe the same value.
//!
//! Dropping an entry, whether still queued or holding the turn, releases its
//! ticket. Callers that joined it get [`SigaaError::RequestAbandoned`]
//! unless it was resolved first.

use super::lock;
use super::request::{HttpMethod, RequestKey};
use crate::error::{Result, SigaaError};
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

/// Outcome handle other callers can attach to.
pub type SharedOutcome<V> = Shared<oneshot::Receiver<Result<V>>>;

/// Await a shared outcome.
pub async fn join_shared<V: Clone>(outcome: SharedOutcome<V>) -> Result<V> {
    outcome.await.map_err(|_| SigaaError::RequestAbandoned)?
}

struct PendingEntry<K, V> {
    ticket: u64,
    key: K,
    outcome: SharedOutcome<V>,
}

struct LaneState<K, V> {
    next_ticket: u64,
    /// Ticket currently allowed to run.
    serving: u64,
    /// Tickets dropped before their turn came.
    released: BTreeSet<u64>,
    pending: Vec<PendingEntry<K, V>>,
}

/// A FIFO lane releasing one entry at a time.
pub struct RequestStack<K, V> {
    name: &'static str,
    state: Mutex<LaneState<K, V>>,
    serving: watch::Sender<u64>,
}

impl<K, V> RequestStack<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            name,
            state: Mutex::new(LaneState {
                next_ticket: 0,
                serving: 0,
                released: BTreeSet::new(),
                pending: Vec::new(),
            }),
            serving,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take a ticket for `key`. The lane position is fixed here, synchronously.
    pub fn enqueue(self: &Arc<Self>, key: K) -> QueueEntry<K, V> {
        let (tx, rx) = oneshot::channel();
        let mut state = lock(&self.state);
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending.push(PendingEntry {
            ticket,
            key,
            outcome: rx.shared(),
        });
        QueueEntry {
            stack: Arc::clone(self),
            ticket,
            sender: Some(tx),
        }
    }

    /// Handle to the oldest queued or running entry with an identical key.
    pub fn find_pending(&self, key: &K) -> Option<SharedOutcome<V>> {
        lock(&self.state)
            .pending
            .iter()
            .find(|entry| entry.key == *key)
            .map(|entry| entry.outcome.clone())
    }

    /// Entries queued or running.
    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Run `factory` when the lane reaches this entry and resolve every
    /// attached waiter with its outcome.
    ///
    /// With `share`, an identical pending entry is joined instead and
    /// `factory` is never called.
    pub async fn add_promise<F, Fut>(self: &Arc<Self>, key: K, share: bool, factory: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if share {
            if let Some(outcome) = self.find_pending(&key) {
                return join_shared(outcome).await;
            }
        }
        let turn = self.enqueue(key).wait_turn().await;
        let outcome = factory().await;
        turn.resolve(outcome.clone());
        outcome
    }

    fn finish(&self, ticket: u64) {
        let mut state = lock(&self.state);
        state.pending.retain(|entry| entry.ticket != ticket);
        if state.serving == ticket {
            state.serving += 1;
            loop {
                let next = state.serving;
                if !state.released.remove(&next) {
                    break;
                }
                state.serving += 1;
            }
            self.serving.send_replace(state.serving);
        } else {
            state.released.insert(ticket);
        }
    }
}

/// A queued entry. Dropping it gives up its place in the lane.
pub struct QueueEntry<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    stack: Arc<RequestStack<K, V>>,
    ticket: u64,
    sender: Option<oneshot::Sender<Result<V>>>,
}

impl<K, V> QueueEntry<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Suspend until every earlier entry of the lane has finished.
    pub async fn wait_turn(self) -> LaneTurn<K, V> {
        let ticket = self.ticket;
        let mut serving = self.stack.serving.subscribe();
        // The sender lives in the stack we hold, so the channel never closes.
        let _ = serving.wait_for(|current| *current == ticket).await;
        tracing::trace!(lane = self.stack.name, ticket, "lane released entry");
        LaneTurn { entry: self }
    }
}

impl<K, V> Drop for QueueEntry<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        self.stack.finish(self.ticket);
    }
}

/// The lane's turn. The next entry is released when this is dropped.
pub struct LaneTurn<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    entry: QueueEntry<K, V>,
}

impl<K, V> LaneTurn<K, V>
where
    K: PartialEq + Clone,
    V: Clone,
{
    pub fn ticket(&self) -> u64 {
        self.entry.ticket
    }

    /// Deliver the outcome to every attached waiter and release the lane.
    pub fn resolve(mut self, outcome: Result<V>) {
        if let Some(tx) = self.entry.sender.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Which lane a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneKind {
    NoCookie,
    Get,
    Post,
}

impl LaneKind {
    pub fn for_request(key: &RequestKey) -> Self {
        if !key.has_cookie() {
            LaneKind::NoCookie
        } else if key.method == HttpMethod::Post {
            LaneKind::Post
        } else {
            LaneKind::Get
        }
    }
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LaneKind::NoCookie => "no-cookie",
            LaneKind::Get => "get",
            LaneKind::Post => "post",
        })
    }
}

/// The three lanes of one host.
pub struct RequestStacks<V: Clone> {
    pub no_cookie: Arc<RequestStack<RequestKey, V>>,
    pub get: Arc<RequestStack<RequestKey, V>>,
    pub post: Arc<RequestStack<RequestKey, V>>,
}

impl<V: Clone> RequestStacks<V> {
    fn new() -> Self {
        Self {
            no_cookie: Arc::new(RequestStack::new("no-cookie")),
            get: Arc::new(RequestStack::new("get")),
            post: Arc::new(RequestStack::new("post")),
        }
    }

    pub fn lane(&self, kind: LaneKind) -> &Arc<RequestStack<RequestKey, V>> {
        match kind {
            LaneKind::NoCookie => &self.no_cookie,
            LaneKind::Get => &self.get,
            LaneKind::Post => &self.post,
        }
    }

    pub fn lane_for(&self, key: &RequestKey) -> &Arc<RequestStack<RequestKey, V>> {
        self.lane(LaneKind::for_request(key))
    }
}

/// Lanes for every host a session talks to.
pub struct RequestStackController<V: Clone> {
    stacks: DashMap<String, Arc<RequestStacks<V>>>,
}

impl<V: Clone> Default for RequestStackController<V> {
    fn default() -> Self {
        Self {
            stacks: DashMap::new(),
        }
    }
}

impl<V: Clone> RequestStackController<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lanes of `host`, created on first use.
    pub fn stacks_for(&self, host: &str) -> Arc<RequestStacks<V>> {
        self.stacks
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(RequestStacks::new()))
            .clone()
    }
}
