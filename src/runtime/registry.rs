//! Per-entry-point series tables.
//!
//! A `SeriesRegistry` holds up to `capacity` series, each behind its own
//! mutex and created on first use. It belongs to one stateful entry point
//! of one `ModuleInstance` and lives as long as that instance.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use super::error::KernelError;
use super::series::{ExpandingPolicy, SeriesElement, SeriesState};
use crate::ir::DType;

/// Where a series gets its window from.
#[derive(Debug)]
enum WindowMode {
    /// Every series uses the window seen on the first call.
    Shared(OnceLock<usize>),
    /// Each series keeps the window current when it was created.
    PerSeries,
}

#[derive(Debug)]
pub struct SeriesRegistry<T> {
    series: Vec<Mutex<Option<SeriesState<T>>>>,
    policy: ExpandingPolicy,
    mode: WindowMode,
}

impl<T: SeriesElement> SeriesRegistry<T> {
    /// Registry whose series each keep their own first window.
    pub fn new(capacity: usize, policy: ExpandingPolicy) -> Self {
        Self::build(capacity, policy, WindowMode::PerSeries)
    }

    /// Registry whose series all share the first window it is given.
    pub fn with_shared_window(capacity: usize, policy: ExpandingPolicy) -> Self {
        Self::build(capacity, policy, WindowMode::Shared(OnceLock::new()))
    }

    fn build(capacity: usize, policy: ExpandingPolicy, mode: WindowMode) -> Self {
        Self {
            series: (0..capacity).map(|_| Mutex::new(None)).collect(),
            policy,
            mode,
        }
    }

    pub fn capacity(&self) -> usize {
        self.series.len()
    }

    pub fn policy(&self) -> ExpandingPolicy {
        self.policy
    }

    /// Reject a call touching more series than the table holds.
    pub fn check_batch(&self, requested: usize) -> Result<(), KernelError> {
        if requested > self.capacity() {
            return Err(KernelError::SeriesLimitExceeded {
                requested,
                limit: self.capacity(),
            });
        }
        Ok(())
    }

    /// The window a call asking for `requested` actually gets. For a shared
    /// registry the first request wins.
    pub fn resolve_window(&self, requested: usize) -> usize {
        match &self.mode {
            WindowMode::PerSeries => requested,
            WindowMode::Shared(cell) => {
                let window = *cell.get_or_init(|| {
                    tracing::debug!(window = requested, "shared window fixed");
                    requested
                });
                if window != requested {
                    tracing::trace!(window, requested, "shared window already fixed");
                }
                window
            }
        }
    }

    /// The shared window, once fixed.
    pub fn shared_window(&self) -> Option<usize> {
        match &self.mode {
            WindowMode::Shared(cell) => cell.get().copied(),
            WindowMode::PerSeries => None,
        }
    }

    /// Create every missing series among the first `count` with `window`.
    /// Runs before any update so that a failed allocation leaves existing
    /// series and the caller's output untouched.
    pub fn prepare(&self, count: usize, window: usize) -> Result<(), KernelError> {
        self.check_batch(count)?;
        for slot in &self.series[..count] {
            let mut guard = lock(slot);
            if guard.is_none() {
                *guard = Some(SeriesState::new(window, self.policy)?);
            }
        }
        Ok(())
    }

    /// Feed `value` into series `index`, creating it with `window` if it
    /// does not exist yet. An existing series keeps its window.
    pub fn update(&self, index: usize, window: usize, value: T) -> Result<T, KernelError> {
        let slot = self
            .series
            .get(index)
            .ok_or(KernelError::SeriesLimitExceeded {
                requested: index + 1,
                limit: self.capacity(),
            })?;
        let mut guard = lock(slot);
        match guard.as_mut() {
            Some(state) => {
                if state.window() != window {
                    tracing::warn!(
                        series = index,
                        window = state.window(),
                        requested = window,
                        "series keeps its original window"
                    );
                }
                Ok(state.update(value))
            }
            None => {
                let mut state = SeriesState::new(window, self.policy)?;
                let result = state.update(value);
                *guard = Some(state);
                Ok(result)
            }
        }
    }

    /// Number of series created so far.
    pub fn initialized(&self) -> usize {
        self.series.iter().filter(|s| lock(s).is_some()).count()
    }

    pub fn window_of(&self, index: usize) -> Option<usize> {
        self.series
            .get(index)
            .and_then(|s| lock(s).as_ref().map(|state| state.window()))
    }

    /// Copy of series `index`, if it exists.
    pub fn snapshot(&self, index: usize) -> Option<SeriesState<T>> {
        self.series.get(index).and_then(|s| lock(s).clone())
    }
}

/// A panicking caller cannot leave a series half-updated (`update` does
/// not panic between its writes), so a poisoned lock is still usable.
fn lock<S>(m: &Mutex<S>) -> MutexGuard<'_, S> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A series registry of either float element type.
#[derive(Debug)]
pub enum SeriesTable {
    F32(SeriesRegistry<f32>),
    F64(SeriesRegistry<f64>),
}

impl SeriesTable {
    /// Table for `elem`; `None` for non-float element types.
    pub fn new(elem: DType, capacity: usize, policy: ExpandingPolicy, shared: bool) -> Option<Self> {
        fn make<T: SeriesElement>(
            capacity: usize,
            policy: ExpandingPolicy,
            shared: bool,
        ) -> SeriesRegistry<T> {
            if shared {
                SeriesRegistry::with_shared_window(capacity, policy)
            } else {
                SeriesRegistry::new(capacity, policy)
            }
        }
        match elem {
            DType::Float32 => Some(SeriesTable::F32(make(capacity, policy, shared))),
            DType::Float64 => Some(SeriesTable::F64(make(capacity, policy, shared))),
            DType::Int32 | DType::Int64 => None,
        }
    }

    pub fn elem(&self) -> DType {
        match self {
            SeriesTable::F32(_) => DType::Float32,
            SeriesTable::F64(_) => DType::Float64,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            SeriesTable::F32(r) => r.capacity(),
            SeriesTable::F64(r) => r.capacity(),
        }
    }

    pub fn initialized(&self) -> usize {
        match self {
            SeriesTable::F32(r) => r.initialized(),
            SeriesTable::F64(r) => r.initialized(),
        }
    }

    pub fn window_of(&self, index: usize) -> Option<usize> {
        match self {
            SeriesTable::F32(r) => r.window_of(index),
            SeriesTable::F64(r) => r.window_of(index),
        }
    }

    pub fn shared_window(&self) -> Option<usize> {
        match self {
            SeriesTable::F32(r) => r.shared_window(),
            SeriesTable::F64(r) => r.shared_window(),
        }
    }
}
