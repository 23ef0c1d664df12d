//! Association-set synchronizer.
//!
//! One [`AspSync`] owns the approved-label tree of one pool scope. Mutations
//! (`process_new_deposits`, `update_on_chain_root`) are single-flighted: each
//! run is its own task, and a caller arriving while one is running awaits
//! that run's result instead of starting another. Readers (`status`, `has_label`) see the last committed
//! [`AspView`] and never wait on a mutation.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use accum::{IncrementalMerkleTree, LeanTree};
use futures::future::{BoxFuture, FutureExt, Shared};
use primitives::{Fr, Label, Root, Scope};
use serde::Serialize;
use tokio::sync::{watch, Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::snapshot::{encode_parts, AspSnapshot, ContentPointer, Cursor};
use crate::source::{ApprovedDepositSource, RootPublisher};
use crate::store::AspStore;
use crate::{Result, SyncError};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Uninitialized,
    Restoring,
    Idle,
    Syncing,
}

/// Committed state of one scope.
#[derive(Clone, Debug, Default)]
pub struct AspView {
    pub tree: LeanTree,
    pub labels: HashSet<Label>,
    pub cursor: Option<Cursor>,
}

impl AspView {
    pub fn root(&self) -> Root { self.tree.root() }

    pub fn contains(&self, label: &Label) -> bool { self.labels.contains(label) }

    pub fn content_pointer(&self) -> ContentPointer { ContentPointer::of_leaves(self.tree.leaves()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub synced: bool,
    pub local_root: Root,
    /// `None` without a publisher or before the first publication.
    pub on_chain_root: Option<Root>,
    pub size: usize,
    pub cursor: Option<Cursor>,
}

/// What an operator needs to publish a root by hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AspExport {
    pub scope: Scope,
    pub root: Root,
    pub size: usize,
    pub cursor: Option<Cursor>,
    pub content_pointer: ContentPointer,
}

type SharedRun<T> = Shared<BoxFuture<'static, Result<T>>>;

#[derive(Default)]
struct InFlight {
    process: Option<SharedRun<Vec<Label>>>,
    publish: Option<SharedRun<Root>>,
}

/// Sets the phase back to `Idle` however a mutation ends.
struct PhaseGuard<'a>(&'a watch::Sender<SyncPhase>);

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<SyncPhase>) -> Self {
        phase.send_replace(SyncPhase::Syncing);
        Self(phase)
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) { self.0.send_replace(SyncPhase::Idle); }
}

pub struct AspSync {
    scope: Scope,
    store: Arc<dyn AspStore>,
    source: Arc<dyn ApprovedDepositSource>,
    publisher: Option<Arc<dyn RootPublisher>>,
    batch_size: usize,
    restored: OnceCell<()>,
    state: Mutex<AspView>,
    view: watch::Sender<Arc<AspView>>,
    phase: watch::Sender<SyncPhase>,
    in_flight: Mutex<InFlight>,
}

impl AspSync {
    pub fn new(
        scope: Scope,
        store: Arc<dyn AspStore>,
        source: Arc<dyn ApprovedDepositSource>,
        publisher: Option<Arc<dyn RootPublisher>>,
        batch_size: usize,
    ) -> Self {
        Self {
            scope,
            store,
            source,
            publisher,
            batch_size: batch_size.max(1),
            restored: OnceCell::new(),
            state: Mutex::new(AspView::default()),
            view: watch::channel(Arc::new(AspView::default())).0,
            phase: watch::channel(SyncPhase::Uninitialized).0,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub fn scope(&self) -> Scope { self.scope }

    pub fn phase(&self) -> SyncPhase { *self.phase.borrow() }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> { self.phase.subscribe() }

    /// Last committed state.
    pub fn view(&self) -> Arc<AspView> { self.view.borrow().clone() }

    /// Restore tree and cursor from storage. Runs once; concurrent callers
    /// wait for the same restore, and a failed restore is retried by the
    /// next call.
    pub async fn initialize(&self) -> Result<()> {
        self.restored
            .get_or_try_init(|| async {
                self.phase.send_replace(SyncPhase::Restoring);
                match self.restore().await {
                    Ok(view) => {
                        info!(scope = %self.scope, size = view.tree.size(), cursor = ?view.cursor, root = %view.root(), "association set restored");
                        self.commit(&mut *self.state.lock().await, view);
                        self.phase.send_replace(SyncPhase::Idle);
                        Ok(())
                    }
                    Err(err) => {
                        warn!(scope = %self.scope, %err, "association set restore failed");
                        self.phase.send_replace(SyncPhase::Uninitialized);
                        Err(err)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    async fn restore(&self) -> Result<AspView> {
        let Some(bytes) = self.store.load(&self.scope).await? else {
            return Ok(AspView::default());
        };
        let snapshot = AspSnapshot::decode(&bytes)
            .map_err(|e| SyncError::CorruptSnapshot { scope: self.scope, reason: e.to_string() })?;
        let mut labels = HashSet::with_capacity(snapshot.labels.len());
        for label in &snapshot.labels {
            if !labels.insert(*label) {
                return Err(SyncError::DuplicateLabel(*label));
            }
        }
        let leaves: Vec<Fr> = snapshot.labels.iter().map(|l| l.0).collect();
        Ok(AspView { tree: LeanTree::from_leaves(&leaves)?, labels, cursor: snapshot.cursor })
    }

    fn commit(&self, state: &mut AspView, next: AspView) {
        *state = next;
        self.view.send_replace(Arc::new(state.clone()));
    }

    /// Run `work` on its own task unless the same kind of mutation is
    /// already in flight, in which case wait for that one. The task keeps
    /// going if every caller stops waiting.
    async fn single_flight<T, Fut>(
        self: &Arc<Self>,
        slot: fn(&mut InFlight) -> &mut Option<SharedRun<T>>,
        work: Fut,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let run = {
            let mut in_flight = self.in_flight.lock().await;
            let current = slot(&mut in_flight);
            if let Some(run) = current.clone() {
                debug!(scope = %self.scope, "joining in-flight mutation");
                run
            } else {
                let this = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let result = work.await;
                    *slot(&mut *this.in_flight.lock().await) = None;
                    result
                });
                let this = Arc::clone(self);
                let run = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(err) => {
                            // The task died before it could clear its slot.
                            *slot(&mut *this.in_flight.lock().await) = None;
                            Err(SyncError::Task(err.to_string()))
                        }
                    }
                }
                .boxed()
                .shared();
                *current = Some(run.clone());
                run
            }
        };
        run.await
    }

    /// Fetch approved deposits after the cursor and insert their labels,
    /// persisting tree and cursor once per batch. Returns the labels that
    /// were new.
    pub async fn process_new_deposits(self: &Arc<Self>) -> Result<Vec<Label>> {
        self.initialize().await?;
        let this = Arc::clone(self);
        self.single_flight(|f| &mut f.process, async move { this.run_process().await }).await
    }

    async fn run_process(&self) -> Result<Vec<Label>> {
        let mut state = self.state.lock().await;
        let _phase = PhaseGuard::enter(&self.phase);
        let mut inserted = Vec::new();
        loop {
            let batch = self
                .source
                .fetch_since(&self.scope, state.cursor, self.batch_size)
                .await
                .map_err(|e| SyncError::Source(e.0))?;
            let fetched = batch.len();

            let mut cursor = state.cursor;
            let mut fresh = Vec::new();
            let mut seen = HashSet::new();
            for deposit in batch {
                if cursor.is_some_and(|c| deposit.cursor <= c) {
                    warn!(scope = %self.scope, cursor = %deposit.cursor, "source returned an already processed deposit");
                    continue;
                }
                cursor = Some(deposit.cursor);
                if deposit.label.is_zero() {
                    return Err(SyncError::ZeroLabel { block_number: deposit.cursor.block_number });
                }
                if state.contains(&deposit.label) || !seen.insert(deposit.label) {
                    debug!(label = %deposit.label, "label already in association set");
                    continue;
                }
                fresh.push(deposit.label);
            }
            if cursor == state.cursor {
                break;
            }

            let mut next = state.clone();
            for label in &fresh {
                next.tree.insert(label.0)?;
                next.labels.insert(*label);
            }
            next.cursor = cursor;
            self.store.save(&self.scope, encode_parts(next.tree.leaves(), next.cursor)).await?;
            self.commit(&mut state, next);
            info!(scope = %self.scope, fetched, inserted = fresh.len(), cursor = ?state.cursor, root = %state.root(), "association batch committed");
            inserted.extend(fresh);

            if fetched < self.batch_size {
                break;
            }
        }
        Ok(inserted)
    }

    /// Publish the local root and content pointer unless the contract
    /// already has it. Returns the root now on chain.
    pub async fn update_on_chain_root(self: &Arc<Self>) -> Result<Root> {
        self.initialize().await?;
        let this = Arc::clone(self);
        self.single_flight(|f| &mut f.publish, async move { this.run_publish().await }).await
    }

    async fn run_publish(&self) -> Result<Root> {
        let publisher = self.publisher.as_ref().ok_or(SyncError::NoPublisher(self.scope))?;
        let state = self.state.lock().await;
        let _phase = PhaseGuard::enter(&self.phase);
        let root = state.root();
        let on_chain = publisher.on_chain_root(&self.scope).await.map_err(|e| SyncError::Publish(e.0))?;
        if on_chain == Some(root) {
            debug!(scope = %self.scope, %root, "on-chain root already current");
            return Ok(root);
        }
        let content = state.content_pointer();
        publisher.publish_root(&self.scope, root, content).await.map_err(|e| SyncError::Publish(e.0))?;
        info!(scope = %self.scope, %root, %content, size = state.tree.size(), "published association root");
        Ok(root)
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        self.initialize().await?;
        let view = self.view();
        let on_chain_root = match &self.publisher {
            Some(publisher) => publisher.on_chain_root(&self.scope).await.map_err(|e| SyncError::Publish(e.0))?,
            None => None,
        };
        let local_root = view.root();
        Ok(SyncStatus {
            synced: on_chain_root == Some(local_root),
            local_root,
            on_chain_root,
            size: view.tree.size(),
            cursor: view.cursor,
        })
    }

    /// Membership in the local tree only.
    pub async fn has_label(&self, label: &Label) -> Result<bool> {
        self.initialize().await?;
        Ok(self.view().contains(label))
    }

    pub async fn export(&self) -> Result<AspExport> {
        self.initialize().await?;
        let view = self.view();
        Ok(AspExport {
            scope: self.scope,
            root: view.root(),
            size: view.tree.size(),
            cursor: view.cursor,
            content_pointer: view.content_pointer(),
        })
    }
}

/// Shared dependencies and one [`AspSync`] per scope.
pub struct Synchronizer {
    store: Arc<dyn AspStore>,
    source: Arc<dyn ApprovedDepositSource>,
    publisher: Option<Arc<dyn RootPublisher>>,
    batch_size: usize,
    scopes: Mutex<HashMap<Scope, Arc<AspSync>>>,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn AspStore>,
        source: Arc<dyn ApprovedDepositSource>,
        publisher: Option<Arc<dyn RootPublisher>>,
        batch_size: usize,
    ) -> Self {
        Self { store, source, publisher, batch_size, scopes: Mutex::new(HashMap::new()) }
    }

    /// The synchronizer for `scope`, created on first use.
    pub async fn scope(&self, scope: Scope) -> Arc<AspSync> {
        let mut scopes = self.scopes.lock().await;
        scopes
            .entry(scope)
            .or_insert_with(|| {
                Arc::new(AspSync::new(
                    scope,
                    self.store.clone(),
                    self.source.clone(),
                    self.publisher.clone(),
                    self.batch_size,
                ))
            })
            .clone()
    }

    /// Process new deposits for every scope created so far.
    pub async fn process_all(&self) -> Vec<(Scope, Result<Vec<Label>>)> {
        let syncs: Vec<Arc<AspSync>> = self.scopes.lock().await.values().cloned().collect();
        let runs = syncs.iter().map(|sync| async move { (sync.scope(), sync.process_new_deposits().await) });
        futures::future::join_all(runs).await
    }

    /// Status of every scope created so far, ordered by scope.
    pub async fn status_all(&self) -> Vec<(Scope, Result<SyncStatus>)> {
        let mut syncs: Vec<Arc<AspSync>> = self.scopes.lock().await.values().cloned().collect();
        syncs.sort_by_key(|sync| sync.scope());
        let runs = syncs.iter().map(|sync| async move { (sync.scope(), sync.status().await) });
        futures::future::join_all(runs).await
    }
}
