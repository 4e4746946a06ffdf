//! Target selector (C5).
//!
//! Chooses which track is the current primary target, alternating with a
//! secondary target under dwell/hysteresis rules, and models the brief
//! "preset transit" period a large re-target implies. A closed
//! `SelectorMode` sum type stands in for a stringly-typed status field.

use crate::config::AlternationConfig;
use crate::geometry;
use crate::track::{TrackId, TrackStore};

/// Centre-distance jump, in normalised units, above which a re-target is
/// treated as a large repositioning rather than a smooth hand-off —
/// entering [`SelectorMode::PresetTransit`] instead of switching
/// directly. Transit is modelled as an explicit state rather than a
/// boolean flag bolted onto `Primary`/`Secondary`.
const LARGE_JUMP_THRESHOLD: f64 = 0.3;

/// How long a preset transit is assumed to take before normal tracking
/// resumes.
const TRANSIT_DURATION: f64 = 0.5;

/// Minimum priority-score margin the alternate target must hold over the
/// current target before a voluntary (non-forced) switch is considered.
const SWITCH_HYSTERESIS: f64 = 0.05;

/// Which of up to two tracked targets the selector is currently
/// following, or whether it is mid-transit between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    /// No track has ever been acquired (startup, or every track has
    /// already been cleanly handed off).
    Idle,
    /// Following the single highest-priority target.
    Primary,
    /// Following the secondary target during an alternation cycle.
    Secondary,
    /// Camera is repositioning toward a newly chosen target; tracking
    /// commands are suppressed until the transit completes.
    PresetTransit,
    /// Was actively following a target that disappeared (timed out); no
    /// detections have arrived since. Distinct from `Idle` so the engine
    /// can issue a one-shot stop command exactly once on this transition.
    Lost,
}

/// The selector's output for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub target: Option<TrackId>,
    pub mode: SelectorMode,
    pub switched: bool,
}

/// Stateful target selector, one per engine session.
pub struct TargetSelector {
    config: AlternationConfig,
    mode: SelectorMode,
    pending_mode: SelectorMode,
    target: Option<TrackId>,
    last_switch_time: f64,
    transit_deadline: Option<f64>,
}

impl TargetSelector {
    pub fn new(config: AlternationConfig) -> Self {
        Self {
            config,
            mode: SelectorMode::Idle,
            pending_mode: SelectorMode::Idle,
            target: None,
            last_switch_time: 0.0,
            transit_deadline: None,
        }
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    pub fn current_target(&self) -> Option<TrackId> {
        self.target
    }

    fn enter(&mut self, target: Option<TrackId>, mode: SelectorMode, now: f64) -> Decision {
        let switched = target != self.target || mode != self.mode;
        self.target = target;
        self.mode = mode;
        if switched {
            self.last_switch_time = now;
        }
        Decision {
            target,
            mode,
            switched,
        }
    }

    fn begin_transit(&mut self, target: TrackId, resolved_mode: SelectorMode, now: f64) -> Decision {
        self.pending_mode = resolved_mode;
        self.transit_deadline = Some(now + TRANSIT_DURATION);
        self.enter(Some(target), SelectorMode::PresetTransit, now)
    }

    /// Advances the selector by one tick given the ranked set of live
    /// tracks (by descending `priority_score`, as computed by the
    /// scorer).
    pub fn tick(&mut self, store: &TrackStore, now: f64) -> Decision {
        if let SelectorMode::PresetTransit = self.mode {
            if let Some(deadline) = self.transit_deadline {
                if now < deadline {
                    return Decision {
                        target: self.target,
                        mode: SelectorMode::PresetTransit,
                        switched: false,
                    };
                }
            }
            let resolved = self.pending_mode;
            self.transit_deadline = None;
            return self.enter(self.target, resolved, now);
        }

        let mut ranked: Vec<&crate::track::Track> = store.iter_ordered().collect();
        ranked.sort_by(|a, b| {
            b.priority_score()
                .partial_cmp(&a.priority_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id().cmp(&b.id()))
        });

        if ranked.is_empty() {
            // A target that was actually being followed (Primary/Secondary)
            // or already Lost stays/becomes Lost rather than Idle, so the
            // engine can tell "never acquired anything" apart from "had a
            // target, it timed out" and issue a one-shot stop on the
            // latter transition. Idle only covers the former.
            let mode = if self.mode == SelectorMode::Idle {
                SelectorMode::Idle
            } else {
                SelectorMode::Lost
            };
            return self.enter(None, mode, now);
        }

        if !self.config.enabled {
            return self.retarget(store, ranked[0].id(), SelectorMode::Primary, now);
        }

        let best = ranked[0];
        let second = ranked.get(1).copied();

        // Current target vanished (lost/pruned) — replace it immediately,
        // bypassing the min-switch-interval debounce and the transit delay
        // that only apply to voluntary alternation.
        let current_alive = self.target.map(|id| store.contains(id)).unwrap_or(false);
        if !current_alive {
            return self.enter(Some(best.id()), SelectorMode::Primary, now);
        }

        let elapsed_since_switch = now - self.last_switch_time;
        if elapsed_since_switch < self.config.min_switch_interval {
            return Decision {
                target: self.target,
                mode: self.mode,
                switched: false,
            };
        }

        let forced = elapsed_since_switch > self.config.max_switch_interval;
        let dwell_elapsed = match self.mode {
            SelectorMode::Primary => elapsed_since_switch >= self.config.primary_dwell,
            SelectorMode::Secondary => elapsed_since_switch >= self.config.secondary_dwell,
            _ => true,
        };

        if !forced && !dwell_elapsed {
            return Decision {
                target: self.target,
                mode: self.mode,
                switched: false,
            };
        }

        match self.mode {
            SelectorMode::Primary => {
                if let Some(secondary) = second {
                    if forced || secondary.priority_score() + SWITCH_HYSTERESIS >= best.priority_score() {
                        return self.retarget(store, secondary.id(), SelectorMode::Secondary, now);
                    }
                }
                // No viable secondary: stay put but reset the clock so we
                // don't immediately force-switch again next tick.
                self.last_switch_time = now;
                Decision {
                    target: self.target,
                    mode: self.mode,
                    switched: false,
                }
            }
            SelectorMode::Secondary | SelectorMode::Idle | SelectorMode::Lost => {
                self.retarget(store, best.id(), SelectorMode::Primary, now)
            }
            SelectorMode::PresetTransit => unreachable!("handled above"),
        }
    }

    /// Switches to `target`/`mode`, routing through [`SelectorMode::PresetTransit`]
    /// first if the hand-off is a large jump from the current target's
    /// last known position.
    fn retarget(&mut self, store: &TrackStore, target: TrackId, mode: SelectorMode, now: f64) -> Decision {
        if Some(target) == self.target && mode == self.mode {
            return Decision {
                target: self.target,
                mode: self.mode,
                switched: false,
            };
        }

        let jump = match (self.target.and_then(|id| store.get(id)), store.get(target)) {
            (Some(old), Some(new)) => geometry::euclidean(old.last_position(), new.last_position()),
            _ => 0.0,
        };

        if jump > LARGE_JUMP_THRESHOLD {
            return self.begin_transit(target, mode, now);
        }
        self.enter(Some(target), mode, now)
    }
}
