//! Rotation state machine.
//!
//! [`Rotation::handle`] takes one event and returns the effects the driver
//! must carry out. It performs no I/O and never looks at a clock: the poll
//! event carries the repository snapshot and the evaluation instant, and
//! timer expiries come back as events tagged with the [`TimerId`] they were
//! armed with.

use std::time::Duration;

use chrono::NaiveDateTime;
use signage_model::{Image, Playlist};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOptions {
    pub min_duration: Duration,
    /// `None` keeps the no-data notice up indefinitely.
    pub fallback_delay: Option<Duration>,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            min_duration: signage_model::MIN_DURATION,
            fallback_delay: Some(crate::config::DEFAULT_FALLBACK_DELAY),
        }
    }
}

/// Identifies one arming of the duration timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No poll has completed yet.
    Starting,
    NoData,
    Empty,
    Playing { index: usize },
}

#[derive(Debug, Clone)]
pub enum RotationEvent {
    Poll {
        snapshot: Vec<Image>,
        now: NaiveDateTime,
    },
    DurationElapsed(TimerId),
    FallbackElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Display(Image),
    ShowEmpty,
    ShowNoData,
    /// Replaces whatever duration timer is pending.
    ArmDuration { timer: TimerId, after: Duration },
    CancelDuration,
    ArmFallback { after: Duration },
    RunFallback,
}

#[derive(Debug)]
pub struct Rotation {
    options: RotationOptions,
    playlist: Playlist,
    phase: Phase,
    pending: Option<TimerId>,
    next_timer: u64,
    fallback_pending: bool,
}

impl Rotation {
    pub fn new(options: RotationOptions) -> Self {
        Self {
            options,
            playlist: Playlist::default(),
            phase: Phase::Starting,
            pending: None,
            next_timer: 0,
            fallback_pending: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// The single duration timer the driver should currently hold, if any.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending
    }

    pub fn fallback_pending(&self) -> bool {
        self.fallback_pending
    }

    pub fn handle(&mut self, event: RotationEvent) -> Vec<Effect> {
        match event {
            RotationEvent::Poll { snapshot, now } => self.on_poll(&snapshot, now),
            RotationEvent::DurationElapsed(timer) => self.on_duration_elapsed(timer),
            RotationEvent::FallbackElapsed => self.on_fallback_elapsed(),
        }
    }

    fn on_poll(&mut self, snapshot: &[Image], now: NaiveDateTime) -> Vec<Effect> {
        let playlist = Playlist::build(snapshot, now, self.options.min_duration);
        let mut effects = Vec::new();
        if self.pending.take().is_some() {
            effects.push(Effect::CancelDuration);
        }

        if playlist.is_empty() {
            self.playlist = playlist;
            if snapshot.is_empty() {
                let entering = self.phase != Phase::NoData;
                self.phase = Phase::NoData;
                effects.push(Effect::ShowNoData);
                if let Some(after) = self.options.fallback_delay {
                    if entering && !self.fallback_pending {
                        self.fallback_pending = true;
                        effects.push(Effect::ArmFallback { after });
                    }
                }
            } else {
                self.phase = Phase::Empty;
                effects.push(Effect::ShowEmpty);
            }
            return effects;
        }

        let index = match self.phase {
            Phase::Playing { index } if index < playlist.len() => index,
            _ => 0,
        };
        self.playlist = playlist;
        self.phase = Phase::Playing { index };
        self.show_current(&mut effects);
        effects
    }

    fn on_duration_elapsed(&mut self, timer: TimerId) -> Vec<Effect> {
        // Expiry of a timer that a poll already replaced.
        if self.pending != Some(timer) {
            return Vec::new();
        }
        self.pending = None;
        let Phase::Playing { index } = self.phase else {
            return Vec::new();
        };
        let len = self.playlist.len();
        if len == 0 {
            return Vec::new();
        }
        self.phase = Phase::Playing {
            index: (index + 1) % len,
        };
        let mut effects = Vec::new();
        self.show_current(&mut effects);
        effects
    }

    fn on_fallback_elapsed(&mut self) -> Vec<Effect> {
        if !self.fallback_pending {
            return Vec::new();
        }
        self.fallback_pending = false;
        vec![Effect::RunFallback]
    }

    fn show_current(&mut self, effects: &mut Vec<Effect>) {
        let Phase::Playing { index } = self.phase else {
            return;
        };
        let Some(entry) = self.playlist.get(index) else {
            return;
        };
        let image = entry.image.clone();
        let after = entry.duration;
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.pending = Some(timer);
        effects.push(Effect::Display(image));
        effects.push(Effect::ArmDuration { timer, after });
    }
}
