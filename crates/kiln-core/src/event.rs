//! Lifecycle events of an asset.
//!
//! Every cook, reload, and bake cycle ends with exactly one event carrying
//! a success flag and the artifact list at that point, failed cycles
//! included. Events are delivered to passive listeners as they are emitted
//! and also kept, per kind, in a bounded ring buffer for hosts that prefer
//! to poll with [`AssetEventBus::drain`]. A host that never drains loses
//! the oldest queued events instead of growing without limit.

use crate::asset::CookState;
use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::scene::ArtifactSummary;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    /// A recook against an existing session node finished.
    Cooked {
        asset: String,
        success: bool,
        artifacts: Vec<ArtifactSummary>,
        warnings: Vec<String>,
    },
    /// A build from a fresh session node finished.
    Reloaded {
        asset: String,
        success: bool,
        artifacts: Vec<ArtifactSummary>,
        warnings: Vec<String>,
    },
    Baked {
        asset: String,
        success: bool,
        artifacts: Vec<ArtifactSummary>,
    },
    StateChanged {
        asset: String,
        from: CookState,
        to: CookState,
    },
    Warning {
        asset: String,
        message: String,
    },
}

/// Discriminant tag for event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetEventKind {
    Cooked,
    Reloaded,
    Baked,
    StateChanged,
    Warning,
}

const EVENT_KIND_COUNT: usize = 5;

impl AssetEvent {
    pub fn kind(&self) -> AssetEventKind {
        match self {
            AssetEvent::Cooked { .. } => AssetEventKind::Cooked,
            AssetEvent::Reloaded { .. } => AssetEventKind::Reloaded,
            AssetEvent::Baked { .. } => AssetEventKind::Baked,
            AssetEvent::StateChanged { .. } => AssetEventKind::StateChanged,
            AssetEvent::Warning { .. } => AssetEventKind::Warning,
        }
    }

    /// The success flag of cycle-ending events.
    pub fn success(&self) -> Option<bool> {
        match self {
            AssetEvent::Cooked { success, .. }
            | AssetEvent::Reloaded { success, .. }
            | AssetEvent::Baked { success, .. } => Some(*success),
            _ => None,
        }
    }
}

impl AssetEventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity ring buffer of queued events. When full, the oldest
/// event is overwritten. Each entry carries its bus-wide sequence number so
/// [`AssetEventBus::drain`] can restore emission order across kinds.
#[derive(Debug)]
pub struct EventBuffer {
    slots: Vec<Option<(u64, AssetEvent)>>,
    /// Next write position.
    head: usize,
    len: usize,
    total_written: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    fn push(&mut self, seq: u64, event: AssetEvent) {
        let capacity = self.capacity();
        self.slots[self.head] = Some((seq, event));
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Events written since creation, dropped ones included.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events overwritten because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Remove every stored entry, oldest first.
    fn take(&mut self) -> Vec<(u64, AssetEvent)> {
        let capacity = self.capacity();
        let start = if self.len < capacity { 0 } else { self.head };
        let mut out = Vec::with_capacity(self.len);
        for i in 0..self.len {
            if let Some(entry) = self.slots[(start + i) % capacity].take() {
                out.push(entry);
            }
        }
        self.head = 0;
        self.len = 0;
        // Drop counts restart with each drain.
        self.total_written = 0;
        out
    }
}

// ---------------------------------------------------------------------------
// AssetEventBus
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&AssetEvent)>;

/// One ring buffer per event kind, listener lists, and suppression flags.
pub struct AssetEventBus {
    listeners: [Vec<PassiveListener>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    capacity: usize,
    next_seq: u64,
    dropped: u64,
}

impl std::fmt::Debug for AssetEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetEventBus")
            .field("suppressed", &self.suppressed)
            .field("buffers", &self.buffers)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Default for AssetEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Keep at most `capacity` queued events of each kind.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            listeners: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            buffers: Default::default(),
            capacity,
            next_seq: 0,
            dropped: 0,
        }
    }

    /// Register a passive listener for an event kind. Listeners are called
    /// in registration order.
    pub fn on_passive(&mut self, kind: AssetEventKind, listener: PassiveListener) {
        self.listeners[kind.index()].push(listener);
    }

    /// Suppressed kinds are neither delivered nor queued.
    pub fn suppress(&mut self, kind: AssetEventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: AssetEventKind) -> bool {
        self.suppressed[kind.index()]
    }

    pub fn emit(&mut self, event: AssetEvent) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        for listener in &mut self.listeners[idx] {
            listener(&event);
        }
        let capacity = self.capacity;
        let buffer = self.buffers[idx].get_or_insert_with(|| EventBuffer::new(capacity));
        if buffer.len() == buffer.capacity() {
            self.dropped += 1;
        }
        buffer.push(self.next_seq, event);
        self.next_seq += 1;
    }

    /// The queue of one kind, if anything of that kind was emitted.
    pub fn buffer(&self, kind: AssetEventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    pub fn pending_count(&self) -> usize {
        self.buffers.iter().flatten().map(EventBuffer::len).sum()
    }

    /// Events overwritten before anyone drained them, over the bus lifetime.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Take every queued event, oldest first across all kinds.
    pub fn drain(&mut self) -> Vec<AssetEvent> {
        let mut entries: Vec<(u64, AssetEvent)> = self
            .buffers
            .iter_mut()
            .flatten()
            .flat_map(EventBuffer::take)
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, event)| event).collect()
    }
}
