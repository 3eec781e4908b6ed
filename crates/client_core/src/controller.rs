use std::{sync::Arc, time::Duration};

use shared::domain::ReorderScope;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    ordering::{self, OrderedItem},
    store::ItemStore,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_SUCCESS_DISPLAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_ERROR_DISPLAY: Duration = Duration::from_secs(3);

const NOTICE_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderTimings {
    /// Quiet period after the last move before an auto-save fires.
    pub debounce: Duration,
    pub success_display: Duration,
    pub error_display: Duration,
}

impl Default for ReorderTimings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            success_display: DEFAULT_SUCCESS_DISPLAY,
            error_display: DEFAULT_ERROR_DISPLAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReorderStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

impl ReorderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReorderStatus::Idle => "idle",
            ReorderStatus::Pending => "pending",
            ReorderStatus::Success => "success",
            ReorderStatus::Error => "error",
        }
    }
}

/// Result of handing an authoritative sequence to [`ReorderController::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Unchanged,
    /// Local edits are unsaved or in flight; the sequence is applied once the
    /// controller settles.
    Deferred,
}

/// Snapshot published to the presentation layer after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderView<T> {
    pub scope: ReorderScope,
    pub items: Vec<T>,
    pub status: ReorderStatus,
    pub pending_changes: bool,
    pub is_reorder_mode: bool,
    pub is_saving: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderNotice {
    Saved {
        scope: ReorderScope,
        ordered_item_ids: Vec<i64>,
    },
    Failed {
        scope: ReorderScope,
        message: String,
    },
}

struct ControllerState<T> {
    local: Vec<T>,
    committed: Vec<T>,
    status: ReorderStatus,
    pending_changes: bool,
    manual_mode: bool,
    in_flight: bool,
    // Bumped on every local mutation so a completing save can tell whether
    // the order it sent is still the latest one.
    generation: u64,
    // Number of saves sent so far.
    saves_sent: u64,
    debounce_task: Option<JoinHandle<()>>,
    revert_task: Option<JoinHandle<()>>,
    deferred_refresh: Option<DeferredRefresh<T>>,
}

struct DeferredRefresh<T> {
    items: Vec<T>,
    // `saves_sent` when the refresh arrived. A refresh that arrives while save
    // N is in flight carries N and may already include that write.
    captured_at: u64,
}

/// Order captured under the lock when a save starts.
struct PendingSave<T> {
    sent: Vec<T>,
    ordered_item_ids: Vec<i64>,
    generation: u64,
    save_seq: u64,
}

impl<T: OrderedItem> ControllerState<T> {
    fn is_settled(&self) -> bool {
        !self.pending_changes && !self.in_flight && !self.manual_mode
    }

    fn view(&self, scope: ReorderScope) -> ReorderView<T> {
        ReorderView {
            scope,
            items: self.local.clone(),
            status: self.status,
            pending_changes: self.pending_changes,
            is_reorder_mode: self.manual_mode,
            is_saving: self.in_flight,
        }
    }

    fn abort_debounce(&mut self) {
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
    }

    fn apply_deferred_refresh(&mut self, scope: ReorderScope) {
        if !self.is_settled() {
            return;
        }
        if let Some(refresh) = self.deferred_refresh.take() {
            info!(%scope, items = refresh.items.len(), "reorder: applying deferred refresh");
            self.local = refresh.items.clone();
            self.committed = refresh.items;
        }
    }

    /// Drops a deferred refresh that was fetched before save `save_seq` was sent.
    fn discard_refresh_before(&mut self, save_seq: u64) {
        if self
            .deferred_refresh
            .as_ref()
            .is_some_and(|refresh| refresh.captured_at < save_seq)
        {
            self.deferred_refresh = None;
        }
    }
}

/// Optimistic, debounced, rollback-on-error ordering for one scope.
///
/// Moves are applied to the local sequence immediately. In auto-save mode a
/// save of the full order fires after the debounce period; in manual reorder
/// mode moves are batched until [`commit`](Self::commit) or
/// [`cancel`](Self::cancel). A failed save restores the last committed order.
/// At most one save per controller is in flight.
pub struct ReorderController<T: OrderedItem> {
    scope: ReorderScope,
    store: Arc<dyn ItemStore>,
    timings: ReorderTimings,
    inner: Mutex<ControllerState<T>>,
    view: watch::Sender<ReorderView<T>>,
    notices: broadcast::Sender<ReorderNotice>,
}

impl<T: OrderedItem> ReorderController<T> {
    pub fn new(
        scope: ReorderScope,
        store: Arc<dyn ItemStore>,
        timings: ReorderTimings,
        items: Vec<T>,
    ) -> Arc<Self> {
        let state = ControllerState {
            local: items.clone(),
            committed: items,
            status: ReorderStatus::Idle,
            pending_changes: false,
            manual_mode: false,
            in_flight: false,
            generation: 0,
            saves_sent: 0,
            debounce_task: None,
            revert_task: None,
            deferred_refresh: None,
        };
        let (view, _) = watch::channel(state.view(scope));
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);
        Arc::new(Self {
            scope,
            store,
            timings,
            inner: Mutex::new(state),
            view,
            notices,
        })
    }

    pub fn scope(&self) -> ReorderScope {
        self.scope
    }

    pub fn subscribe(&self) -> watch::Receiver<ReorderView<T>> {
        self.view.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<ReorderNotice> {
        self.notices.subscribe()
    }

    /// Latest published view.
    pub fn view(&self) -> ReorderView<T> {
        self.view.borrow().clone()
    }

    /// Replaces the local and committed sequence with authoritative data.
    pub async fn initialize(&self, items: Vec<T>) -> RefreshOutcome {
        let mut guard = self.inner.lock().await;
        if !guard.is_settled() {
            debug!(scope = %self.scope, "reorder: deferring refresh while edits are unsaved");
            let captured_at = guard.saves_sent;
            guard.deferred_refresh = Some(DeferredRefresh { items, captured_at });
            return RefreshOutcome::Deferred;
        }
        guard.deferred_refresh = None;
        if guard.committed == items && guard.local == items {
            return RefreshOutcome::Unchanged;
        }
        guard.local = items.clone();
        guard.committed = items;
        self.publish(&guard);
        RefreshOutcome::Applied
    }

    /// Applies a move optimistically. Invalid requests are ignored and return
    /// `false`.
    pub async fn request_reorder(
        self: &Arc<Self>,
        moved_item_id: i64,
        from_index: usize,
        to_index: usize,
    ) -> bool {
        let mut guard = self.inner.lock().await;
        let Some((next, operation)) =
            ordering::plan_move(&guard.local, moved_item_id, from_index, to_index)
        else {
            debug!(
                scope = %self.scope,
                moved_item_id,
                from_index,
                to_index,
                "reorder: ignoring invalid move"
            );
            return false;
        };
        guard.local = next;
        guard.pending_changes = true;
        guard.generation += 1;
        debug!(
            scope = %self.scope,
            moved_item_id = operation.moved_item_id,
            from_index = operation.from_index,
            to_index = operation.to_index,
            "reorder: applied move"
        );
        // A save already in flight re-arms the debounce when it completes.
        if !guard.manual_mode && !guard.in_flight {
            self.arm_debounce(&mut guard);
        }
        self.publish(&guard);
        true
    }

    /// Entry point for drag-and-drop input. A drop outside any item is a no-op.
    pub async fn handle_drag_end(self: &Arc<Self>, active_id: i64, over_id: Option<i64>) -> bool {
        let indices = {
            let guard = self.inner.lock().await;
            ordering::drag_indices(&guard.local, active_id, over_id)
        };
        match indices {
            Some((from, to)) => self.request_reorder(active_id, from, to).await,
            None => false,
        }
    }

    /// Persists the current order now, bypassing the debounce period.
    ///
    /// In manual reorder mode this also leaves the mode; with no pending moves
    /// no call is made.
    pub async fn commit(self: &Arc<Self>) -> ReorderStatus {
        let save = {
            let mut guard = self.inner.lock().await;
            let was_manual = guard.manual_mode;
            guard.manual_mode = false;
            guard.abort_debounce();
            if !guard.pending_changes {
                if was_manual {
                    guard.apply_deferred_refresh(self.scope);
                    self.publish(&guard);
                }
                return guard.status;
            }
            match self.begin_save(&mut guard) {
                Some(save) => save,
                None => return guard.status,
            }
        };
        self.finish_save(save).await
    }

    /// Discards batched moves and leaves manual reorder mode. Never calls the
    /// store. Returns `false` outside manual mode.
    pub async fn cancel(&self) -> bool {
        let mut guard = self.inner.lock().await;
        if !guard.manual_mode {
            return false;
        }
        guard.manual_mode = false;
        guard.local = guard.committed.clone();
        guard.pending_changes = false;
        guard.generation += 1;
        info!(scope = %self.scope, "reorder: manual changes discarded");
        guard.apply_deferred_refresh(self.scope);
        self.publish(&guard);
        true
    }

    pub async fn enter_manual_reorder_mode(&self) {
        let mut guard = self.inner.lock().await;
        if guard.manual_mode {
            return;
        }
        guard.manual_mode = true;
        guard.abort_debounce();
        self.publish(&guard);
    }

    /// Leaves manual mode without an explicit save. Batched moves fall back to
    /// the auto-save debounce.
    pub async fn exit_manual_reorder_mode(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        if !guard.manual_mode {
            return;
        }
        guard.manual_mode = false;
        if guard.pending_changes && !guard.in_flight {
            self.arm_debounce(&mut guard);
        }
        guard.apply_deferred_refresh(self.scope);
        self.publish(&guard);
    }

    /// Debounce timer entry point.
    async fn persist(self: &Arc<Self>) -> ReorderStatus {
        let save = {
            let mut guard = self.inner.lock().await;
            // The handle belongs to the task running this call.
            guard.debounce_task = None;
            match self.begin_save(&mut guard) {
                Some(save) => save,
                None => return guard.status,
            }
        };
        self.finish_save(save).await
    }

    /// Marks a save as in flight and captures the order to send. Returns
    /// `None` when a save is already running or nothing is pending.
    fn begin_save(&self, state: &mut ControllerState<T>) -> Option<PendingSave<T>> {
        if state.in_flight || !state.pending_changes {
            return None;
        }
        state.in_flight = true;
        state.saves_sent += 1;
        if let Some(task) = state.revert_task.take() {
            task.abort();
        }
        state.status = ReorderStatus::Pending;
        self.publish(state);
        let sent = state.local.clone();
        Some(PendingSave {
            ordered_item_ids: ordering::item_ids(&sent),
            sent,
            generation: state.generation,
            save_seq: state.saves_sent,
        })
    }

    async fn finish_save(self: &Arc<Self>, save: PendingSave<T>) -> ReorderStatus {
        let PendingSave {
            sent,
            ordered_item_ids,
            generation,
            save_seq,
        } = save;
        info!(scope = %self.scope, items = ordered_item_ids.len(), "reorder: saving order");
        let result = self.store.reorder(self.scope, &ordered_item_ids).await;

        let mut guard = self.inner.lock().await;
        guard.in_flight = false;
        match result {
            Ok(()) => {
                guard.committed = sent;
                guard.discard_refresh_before(save_seq);
                if guard.generation != generation && guard.pending_changes {
                    debug!(scope = %self.scope, "reorder: newer moves queued behind completed save");
                    if guard.manual_mode {
                        guard.status = ReorderStatus::Success;
                        self.arm_status_revert(&mut guard, self.timings.success_display);
                    } else {
                        self.arm_debounce(&mut guard);
                    }
                } else {
                    guard.local = guard.committed.clone();
                    guard.pending_changes = false;
                    guard.status = ReorderStatus::Success;
                    self.arm_status_revert(&mut guard, self.timings.success_display);
                    guard.apply_deferred_refresh(self.scope);
                    info!(scope = %self.scope, "reorder: order saved");
                    let _ = self.notices.send(ReorderNotice::Saved {
                        scope: self.scope,
                        ordered_item_ids,
                    });
                }
            }
            Err(err) => {
                warn!(scope = %self.scope, error = %err, "reorder: save failed, reverting");
                guard.local = guard.committed.clone();
                guard.pending_changes = false;
                guard.generation += 1;
                guard.abort_debounce();
                guard.status = ReorderStatus::Error;
                self.arm_status_revert(&mut guard, self.timings.error_display);
                guard.apply_deferred_refresh(self.scope);
                let _ = self.notices.send(ReorderNotice::Failed {
                    scope: self.scope,
                    message: format!("reorder failed, reverted: {err:#}"),
                });
            }
        }
        self.publish(&guard);
        guard.status
    }

    fn arm_debounce(self: &Arc<Self>, state: &mut ControllerState<T>) {
        state.abort_debounce();
        let controller = Arc::clone(self);
        let delay = self.timings.debounce;
        state.debounce_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.persist().await;
        }));
    }

    fn arm_status_revert(self: &Arc<Self>, state: &mut ControllerState<T>, delay: Duration) {
        if let Some(task) = state.revert_task.take() {
            task.abort();
        }
        let controller = Arc::clone(self);
        state.revert_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = controller.inner.lock().await;
            if matches!(guard.status, ReorderStatus::Success | ReorderStatus::Error) {
                guard.status = ReorderStatus::Idle;
                guard.revert_task = None;
                controller.publish(&guard);
            }
        }));
    }

    fn publish(&self, state: &ControllerState<T>) {
        self.view.send_replace(state.view(self.scope));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
