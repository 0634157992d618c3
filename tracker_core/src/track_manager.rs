//! Track bookkeeping: serial allocation, slot assignment, expiry policy and
//! the recent-track list.
//!
//! # Track Management Policy
//! - **Birth**: an observation on an unmapped slot allocates the next serial.
//!   Serials continue from the highest one already recorded today.
//! - **Identity**: a slot maps to at most one live track; later observations
//!   on that slot update the same track.
//! - **Expiry**: a track silent for longer than `end_timeout` is expired, its
//!   slot mapping removed and its summary pushed to the front of the recent
//!   list (bounded by `recent_capacity`).

use crate::{
    track::{RecentTrack, Track, END_TIMEOUT},
    types::{Slot, TrackId},
};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Configuration for track management policy.
#[derive(Clone, Debug)]
pub struct TrackManagerConfig {
    /// Silence before a track is expired
    pub end_timeout: Duration,
    /// Expired tracks kept for display
    pub recent_capacity: usize,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            end_timeout: END_TIMEOUT,
            recent_capacity: 3,
        }
    }
}

/// Slot table and serial counter for the pool of live tracks.
#[derive(Debug)]
pub struct TrackManager {
    pub config: TrackManagerConfig,
    next_id: u64,
    slots: BTreeMap<Slot, TrackId>,
    recent: VecDeque<RecentTrack>,
}

impl TrackManager {
    /// `max_prior_serial` is the highest serial already used today (0 if none).
    pub fn new(config: TrackManagerConfig, max_prior_serial: u64) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.recent_capacity),
            config,
            next_id: max_prior_serial + 1,
            slots: BTreeMap::new(),
        }
    }

    pub fn next_track_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Serial the next birth will receive.
    pub fn peek_next_id(&self) -> TrackId {
        TrackId(self.next_id)
    }

    pub fn assign(&mut self, slot: Slot, id: TrackId) {
        self.slots.insert(slot, id);
    }

    pub fn resolve(&self, slot: Slot) -> Option<TrackId> {
        self.slots.get(&slot).copied()
    }

    pub fn assigned_slots(&self) -> impl Iterator<Item = (Slot, TrackId)> + '_ {
        self.slots.iter().map(|(s, id)| (*s, *id))
    }

    pub fn is_expired(&self, track: &Track, now: Instant) -> bool {
        track.is_stale(now, self.config.end_timeout)
    }

    /// Drop the slot mapping of an expired track and archive its summary.
    pub fn archive(&mut self, summary: RecentTrack) {
        if self.slots.get(&summary.slot) == Some(&summary.id) {
            self.slots.remove(&summary.slot);
        }
        self.recent.push_front(summary);
        self.recent.truncate(self.config.recent_capacity);
    }

    /// Expired tracks, most recent first.
    pub fn recent(&self) -> &VecDeque<RecentTrack> {
        &self.recent
    }

    /// Split out the expired tracks from `tracks`, leaving the live ones.
    pub fn take_expired(&self, tracks: &mut Vec<Track>, now: Instant) -> Vec<Track> {
        let (expired, live): (Vec<Track>, Vec<Track>) = std::mem::take(tracks)
            .into_iter()
            .partition(|t| self.is_expired(t, now));
        *tracks = live;
        expired
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
