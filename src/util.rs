use std::sync::Arc;

use parking_lot::Mutex;

/// Represents a 2D size in physical pixels
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Metrics of the display being mirrored
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisplayMetrics {
    pub size: Size,
    pub density_dpi: u32,
}

impl DisplayMetrics {
    pub const fn new(width: u32, height: u32, density_dpi: u32) -> Self {
        Self {
            size: Size::new(width, height),
            density_dpi,
        }
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }
}

/// Identifies a subscription made with [`ObservableFlag::subscribe`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(bool) + Send + Sync>;

struct FlagState {
    value: bool,
    next_id: u64,
    observers: Vec<(ObserverId, Observer)>,
}

/// A shared boolean whose observers are told about every change.
///
/// Observers run on the thread that changed the value, after the change is
/// visible through [`ObservableFlag::get`]. They must not block.
#[derive(Clone)]
pub struct ObservableFlag {
    state: Arc<Mutex<FlagState>>,
}

impl ObservableFlag {
    pub fn new(value: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(FlagState {
                value,
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> bool {
        self.state.lock().value
    }

    /// Register an observer. It is not called for the current value.
    pub fn subscribe(&self, observer: impl Fn(bool) + Send + Sync + 'static) -> ObserverId {
        let mut state = self.state.lock();
        let id = ObserverId(state.next_id);
        state.next_id += 1;
        state.observers.push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer, returns false if it was not registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|(observer_id, _)| *observer_id != id);
        state.observers.len() != before
    }

    /// Store a new value. Returns the observers to notify if the value changed.
    ///
    /// Split from notification so callers can update the value inside their
    /// own critical section and run observers once it has been left.
    pub(crate) fn set_deferred(&self, value: bool) -> Option<FlagNotification> {
        let mut state = self.state.lock();
        if state.value == value {
            return None;
        }
        state.value = value;
        Some(FlagNotification {
            value,
            observers: state.observers.iter().map(|(_, observer)| observer.clone()).collect(),
        })
    }
}

impl Default for ObservableFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for ObservableFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObservableFlag")
            .field("value", &state.value)
            .field("observers", &state.observers.len())
            .finish()
    }
}

/// Pending observer calls for one flag change
#[must_use]
pub(crate) struct FlagNotification {
    value: bool,
    observers: Vec<Observer>,
}

impl FlagNotification {
    pub(crate) fn notify(self) {
        for observer in self.observers {
            observer(self.value);
        }
    }
}
