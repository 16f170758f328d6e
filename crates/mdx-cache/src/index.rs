use crate::body::SegmentBody;
use crate::header::SegmentHeader;
use crate::loader::{AggregateLoader, SegmentLoadError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle of one logical aggregate key.
///
/// `Loading` is the only state that lives in the in-flight map for long; final
/// states are published to attached waiters through the shared slot and, for
/// success, to the per-measure ready list.
enum SlotState {
    Loading,
    Ready(Arc<SegmentBody>),
    Failed(SegmentLoadError),
}

struct LoadSlot {
    state: Mutex<SlotState>,
    done: Condvar,
}

impl LoadSlot {
    fn loading() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Loading),
            done: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A waiter panicking while holding the guard cannot corrupt SlotState
        // (all writes are whole-value replacements), so poisoning is ignored.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of [`SegmentCacheIndex::request`].
pub enum RequestOutcome {
    /// A resident segment covering the request.
    Ready(Arc<SegmentBody>),
    /// The caller owns the fetch and must complete the token.
    Load(LoadToken),
    /// Another caller owns an equal fetch; attach and wait.
    Wait(SegmentWaiter),
}

/// Ownership of one in-flight load. Complete it with
/// [`SegmentCacheIndex::load_succeeded`] or [`SegmentCacheIndex::load_failed`];
/// dropping it uncompleted releases waiters with a failure.
pub struct LoadToken {
    header: SegmentHeader,
    slot: Arc<LoadSlot>,
    completed: bool,
}

impl LoadToken {
    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }
}

impl Drop for LoadToken {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut state = self.slot.lock();
        if matches!(*state, SlotState::Loading) {
            *state = SlotState::Failed(SegmentLoadError::abandoned(&self.header));
        }
        drop(state);
        self.slot.done.notify_all();
    }
}

/// Attachment to someone else's in-flight load.
pub struct SegmentWaiter {
    slot: Arc<LoadSlot>,
}

impl SegmentWaiter {
    /// Block until the owning fetch completes.
    pub fn wait(&self) -> Result<Arc<SegmentBody>, SegmentLoadError> {
        let mut state = self.slot.lock();
        while matches!(*state, SlotState::Loading) {
            state = self
                .slot
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match &*state {
            SlotState::Ready(body) => Ok(body.clone()),
            SlotState::Failed(error) => Err(error.clone()),
            SlotState::Loading => unreachable!("loop exits only on a final state"),
        }
    }

    /// Wait with an external deadline. `None` on expiry: this waiter stops
    /// waiting; the fetch itself and other waiters are unaffected.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Result<Arc<SegmentBody>, SegmentLoadError>> {
        let mut state = self.slot.lock();
        while matches!(*state, SlotState::Loading) {
            let (guard, result) = self
                .slot
                .done
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if result.timed_out() && matches!(*state, SlotState::Loading) {
                return None;
            }
        }
        match &*state {
            SlotState::Ready(body) => Some(Ok(body.clone())),
            SlotState::Failed(error) => Some(Err(error.clone())),
            SlotState::Loading => unreachable!("loop exits only on a final state"),
        }
    }
}

/// Concurrent index over cached aggregate segments.
///
/// Guarantees at most one in-flight backend fetch per logical key under
/// arbitrary interleavings: the first requester to install a Loading slot owns
/// the fetch, later requesters attach to it, and covering-header queries over
/// Ready entries never block other readers.
#[derive(Default)]
pub struct SegmentCacheIndex {
    inflight: DashMap<SegmentHeader, Arc<LoadSlot>>,
    ready: DashMap<String, Vec<(SegmentHeader, Arc<SegmentBody>)>>,
}

impl SegmentCacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// A Ready entry whose header covers `header`, if any.
    pub fn query(&self, header: &SegmentHeader) -> Option<(SegmentHeader, Arc<SegmentBody>)> {
        let entries = self.ready.get(header.measure())?;
        entries
            .iter()
            .find(|(resident, _)| resident.covers(header))
            .map(|(resident, body)| (resident.clone(), body.clone()))
    }

    /// Resolve a request against resident and in-flight state.
    pub fn request(&self, header: &SegmentHeader) -> RequestOutcome {
        if let Some((_, body)) = self.query(header) {
            return RequestOutcome::Ready(body);
        }

        match self.inflight.entry(header.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get().clone();
                let state = slot.lock();
                match &*state {
                    SlotState::Loading => {
                        drop(state);
                        RequestOutcome::Wait(SegmentWaiter { slot })
                    }
                    SlotState::Ready(body) => RequestOutcome::Ready(body.clone()),
                    // A failed or abandoned slot is not terminal: this caller
                    // re-attempts with a fresh Loading slot.
                    SlotState::Failed(_) => {
                        drop(state);
                        let fresh = LoadSlot::loading();
                        occupied.insert(fresh.clone());
                        log::debug!("segment {header}: retrying after failed load");
                        RequestOutcome::Load(LoadToken {
                            header: header.clone(),
                            slot: fresh,
                            completed: false,
                        })
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let slot = LoadSlot::loading();
                vacant.insert(slot.clone());
                log::debug!("segment {header}: loading");
                RequestOutcome::Load(LoadToken {
                    header: header.clone(),
                    slot,
                    completed: false,
                })
            }
        }
    }

    /// Publish a completed fetch: Loading -> Ready, release all waiters, make
    /// the body available to covering queries.
    pub fn load_succeeded(&self, mut token: LoadToken, body: SegmentBody) -> Arc<SegmentBody> {
        token.completed = true;
        let body = Arc::new(body);

        {
            let mut state = token.slot.lock();
            *state = SlotState::Ready(body.clone());
        }
        token.slot.done.notify_all();

        self.ready
            .entry(token.header.measure().to_string())
            .or_default()
            .push((token.header.clone(), body.clone()));
        self.remove_inflight(&token.header, &token.slot);
        log::debug!(
            "segment {}: ready ({} of {} cells)",
            token.header,
            body.effective_len(),
            body.cell_count()
        );
        body
    }

    /// Record a failed fetch: Loading -> Failed, release all waiters with the
    /// error. The key may be re-attempted by a later request.
    pub fn load_failed(&self, mut token: LoadToken, error: SegmentLoadError) {
        token.completed = true;

        {
            let mut state = token.slot.lock();
            *state = SlotState::Failed(error);
        }
        token.slot.done.notify_all();

        self.remove_inflight(&token.header, &token.slot);
        log::debug!("segment {}: load failed", token.header);
    }

    /// Single-flight convenience wrapper: serve from a covering segment, attach
    /// to an in-flight fetch, or own the fetch via `loader`.
    pub fn get_or_load(
        &self,
        header: &SegmentHeader,
        loader: &dyn AggregateLoader,
    ) -> Result<Arc<SegmentBody>, SegmentLoadError> {
        match self.request(header) {
            RequestOutcome::Ready(body) => Ok(body),
            RequestOutcome::Wait(waiter) => waiter.wait(),
            RequestOutcome::Load(token) => match loader.load(header) {
                Ok(body) => Ok(self.load_succeeded(token, body)),
                Err(error) => {
                    self.load_failed(token, error.clone());
                    Err(error)
                }
            },
        }
    }

    /// Number of Ready segments resident for `measure`.
    pub fn resident_count(&self, measure: &str) -> usize {
        self.ready.get(measure).map_or(0, |entries| entries.len())
    }

    /// Drop all Ready segments (and stale failed slots) for one measure.
    /// In-flight loads are left to complete; their results land normally.
    pub fn flush_measure(&self, measure: &str) -> usize {
        let removed = self
            .ready
            .remove(measure)
            .map_or(0, |(_, entries)| entries.len());
        self.inflight.retain(|header, slot| {
            if header.measure() != measure {
                return true;
            }
            matches!(*slot.lock(), SlotState::Loading)
        });
        if removed > 0 {
            log::debug!("flushed {removed} segment(s) for measure {measure}");
        }
        removed
    }

    /// Remove the in-flight entry, but only if it still holds this load's slot
    /// (a failed slot may already have been replaced by a retry).
    fn remove_inflight(&self, header: &SegmentHeader, slot: &Arc<LoadSlot>) {
        self.inflight
            .remove_if(header, |_, resident| Arc::ptr_eq(resident, slot));
    }
}
