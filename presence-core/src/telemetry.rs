//! Presence event history shared by the firmware status task and the emulator.
//!
//! Records live in a fixed-size ring so the firmware can keep the most recent
//! activity without allocation. Presence transitions also carry the time spent
//! in the previous state.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::exti::TriggerMode;
use crate::presence::Transition;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic identifier assigned to each record.
pub type EventId = u32;

/// Event kinds captured by the recorder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PresenceEvent {
    PulseObserved,
    PresenceAsserted,
    PresenceCleared,
    ChannelAttached { channel: u8, mode: TriggerMode },
    ChannelDetached { channel: u8 },
}

impl PresenceEvent {
    /// Short kebab-case label.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PresenceEvent::PulseObserved => "pulse-observed",
            PresenceEvent::PresenceAsserted => "presence-asserted",
            PresenceEvent::PresenceCleared => "presence-cleared",
            PresenceEvent::ChannelAttached { .. } => "channel-attached",
            PresenceEvent::ChannelDetached { .. } => "channel-detached",
        }
    }

    /// Event produced by a state machine transition, if it changed anything.
    #[must_use]
    pub const fn from_transition(transition: Transition) -> Option<Self> {
        match transition {
            Transition::Unchanged => None,
            Transition::Cleared => Some(PresenceEvent::PresenceCleared),
            Transition::Asserted => Some(PresenceEvent::PresenceAsserted),
        }
    }
}

impl fmt::Display for PresenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceEvent::ChannelAttached { channel, mode } => {
                write!(f, "{} {channel} {mode}", self.name())
            }
            PresenceEvent::ChannelDetached { channel } => write!(f, "{} {channel}", self.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: PresenceEvent,
    /// Time spent in the previous presence state; only set on transitions
    /// after the first one.
    pub elapsed_since_transition: Option<Duration>,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records presence events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an observed pulse.
    pub fn record_pulse(&mut self, timestamp: TInstant) -> EventId {
        self.record(PresenceEvent::PulseObserved, None, timestamp)
    }

    /// Records a presence transition and the time since the previous one.
    /// `Transition::Unchanged` records nothing.
    pub fn record_transition(
        &mut self,
        transition: Transition,
        timestamp: TInstant,
    ) -> Option<EventId> {
        let event = PresenceEvent::from_transition(transition)?;
        let elapsed = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        Some(self.record(event, elapsed, timestamp))
    }

    /// Records a channel binding.
    pub fn record_attach(
        &mut self,
        channel: u8,
        mode: TriggerMode,
        timestamp: TInstant,
    ) -> EventId {
        let event = PresenceEvent::ChannelAttached { channel, mode };
        self.record(event, None, timestamp)
    }

    /// Records a channel release.
    pub fn record_detach(&mut self, channel: u8, timestamp: TInstant) -> EventId {
        self.record(PresenceEvent::ChannelDetached { channel }, None, timestamp)
    }

    fn record(
        &mut self,
        event: PresenceEvent,
        elapsed_since_transition: Option<Duration>,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            elapsed_since_transition,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
