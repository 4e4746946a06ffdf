//! Scenario identifiers for the deterministic test harness.
//!
//! One variant per concrete end-to-end behaviour the simulator exercises.

/// A named scenario the runner knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// S1: a single static object whose box is smaller than the zoom
    /// target ratio — zoom should converge toward the target.
    ZoomConvergence,

    /// S2: two similarly-scored objects — alternation should switch
    /// primary/secondary on the configured dwell cadence.
    AlternationTiming,

    /// S3: a tracked object stops being detected — after `object_timeout`
    /// the track is pruned and the session issues a single stop.
    ObjectLost,

    /// S4: a fast-moving object — the predicted position should lead the
    /// raw observed position in the direction of travel.
    PredictionLead,

    /// S5: more detections arrive in one frame than `max_objects` allows
    /// — the excess are dropped and counted, not tracked.
    OverCapacityDrop,

    /// S6: `emergency_stop` is called mid-track — the dispatcher must
    /// stop immediately and issue no further commands.
    EmergencyStop,
}

impl ScenarioId {
    pub fn all() -> [ScenarioId; 6] {
        [
            ScenarioId::ZoomConvergence,
            ScenarioId::AlternationTiming,
            ScenarioId::ObjectLost,
            ScenarioId::PredictionLead,
            ScenarioId::OverCapacityDrop,
            ScenarioId::EmergencyStop,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ZoomConvergence => "zoom-convergence",
            ScenarioId::AlternationTiming => "alternation-timing",
            ScenarioId::ObjectLost => "object-lost",
            ScenarioId::PredictionLead => "prediction-lead",
            ScenarioId::OverCapacityDrop => "over-capacity-drop",
            ScenarioId::EmergencyStop => "emergency-stop",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioId::all()
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| format!("unknown scenario '{s}', expected one of: {}", names_joined()))
    }
}

fn names_joined() -> String {
    ScenarioId::all()
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(", ")
}
