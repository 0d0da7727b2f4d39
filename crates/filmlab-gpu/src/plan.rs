//! Stage activity masks and the pure per-frame step planner.
//!
//! The stage list is closed and ordered. A frame's active subset is a
//! [`StageMask`]; together with the point the chain resumes from
//! ([`PlanStart`]) it fully determines the sequence of passes, so the
//! orchestrator only rebuilds bind groups when that pair changes.
//!
//! Planning rules:
//! - geometry writes the cached `Geometry` target;
//! - the last pre-film stage writes the cached `PreFilm` target when any
//!   post stage follows;
//! - every other step writes `Output`, or `Scratch` when its input already
//!   is `Output`, so no step reads and writes the same target;
//! - a passthrough copy is appended when the chain ends anywhere but
//!   `Output`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Geometry,
    Master,
    Hsl,
    Curve,
    Detail,
    Film,
    Halation,
}

impl StageKind {
    pub const ALL: [Self; 7] = [
        Self::Geometry,
        Self::Master,
        Self::Hsl,
        Self::Curve,
        Self::Detail,
        Self::Film,
        Self::Halation,
    ];

    /// Stages between geometry and the film simulation.
    pub const PRE_FILM: [Self; 4] = [Self::Master, Self::Hsl, Self::Curve, Self::Detail];

    /// Stages after the pre-film cache point.
    pub const POST_FILM: [Self; 2] = [Self::Film, Self::Halation];

    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::Master => "master",
            Self::Hsl => "hsl",
            Self::Curve => "curve",
            Self::Detail => "detail",
            Self::Film => "film",
            Self::Halation => "halation",
        }
    }
}

/// Bit set over [`StageKind`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StageMask(u8);

impl StageMask {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0x7f);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, kind: StageKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: StageKind) {
        self.0 |= kind.bit();
    }

    pub fn set(&mut self, kind: StageKind, active: bool) {
        if active {
            self.insert(kind);
        } else {
            self.0 &= !kind.bit();
        }
    }

    pub fn with(mut self, kind: StageKind) -> Self {
        self.insert(kind);
        self
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Active stages in pipeline order.
    pub fn iter(self) -> impl Iterator<Item = StageKind> {
        StageKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    /// Only the pre-film stage bits.
    pub fn pre_film(self) -> Self {
        Self(StageKind::PRE_FILM.iter().fold(0, |acc, k| acc | (self.0 & k.bit())))
    }

    pub fn has_post_film(self) -> bool {
        StageKind::POST_FILM.iter().any(|k| self.contains(*k))
    }
}

impl FromIterator<StageKind> for StageMask {
    fn from_iter<I: IntoIterator<Item = StageKind>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for kind in iter {
            mask.insert(kind);
        }
        mask
    }
}

impl fmt::Debug for StageMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(StageKind::label)).finish()
    }
}

/// GPU textures a step can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// Uploaded 8-bit source.
    Source,
    Output,
    Scratch,
    /// Cached geometry result.
    Geometry,
    /// Cached result of the last pre-film stage.
    PreFilm,
    /// Half-resolution halation buffers.
    HalfA,
    HalfB,
}

/// Where a frame's chain resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlanStart {
    /// Run every active stage from the source.
    #[default]
    Source,
    /// Reuse the cached geometry result.
    Geometry,
    /// Reuse the cached pre-film result; only film/halation run.
    PreFilm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOp {
    Stage(StageKind),
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    pub op: StepOp,
    pub input: TargetId,
    pub output: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub steps: Vec<PlanStep>,
    /// This plan refreshes the `Geometry` cache.
    pub geometry_written: bool,
    /// This plan refreshes the `PreFilm` cache.
    pub prefilm_written: bool,
}

/// Lay out the passes for `mask`, resuming at `start`.
pub fn plan_steps(mask: StageMask, start: PlanStart) -> StagePlan {
    let mut steps = Vec::new();
    let mut geometry_written = false;
    let mut prefilm_written = false;

    let mut current = match start {
        PlanStart::Source => TargetId::Source,
        PlanStart::Geometry => TargetId::Geometry,
        PlanStart::PreFilm => TargetId::PreFilm,
    };

    if start == PlanStart::Source && mask.contains(StageKind::Geometry) {
        steps.push(PlanStep {
            op: StepOp::Stage(StageKind::Geometry),
            input: current,
            output: TargetId::Geometry,
        });
        current = TargetId::Geometry;
        geometry_written = true;
    }

    let has_post = mask.has_post_film();
    if start != PlanStart::PreFilm {
        let pre: Vec<StageKind> = mask.pre_film().iter().collect();
        for (i, &kind) in pre.iter().enumerate() {
            let output = if has_post && i + 1 == pre.len() {
                prefilm_written = true;
                TargetId::PreFilm
            } else {
                next_target(current)
            };
            steps.push(PlanStep {
                op: StepOp::Stage(kind),
                input: current,
                output,
            });
            current = output;
        }
    }

    for kind in StageKind::POST_FILM.into_iter().filter(|k| mask.contains(*k)) {
        let output = next_target(current);
        steps.push(PlanStep {
            op: StepOp::Stage(kind),
            input: current,
            output,
        });
        current = output;
    }

    if current != TargetId::Output {
        steps.push(PlanStep {
            op: StepOp::Passthrough,
            input: current,
            output: TargetId::Output,
        });
    }

    StagePlan {
        steps,
        geometry_written,
        prefilm_written,
    }
}

fn next_target(current: TargetId) -> TargetId {
    if current == TargetId::Output {
        TargetId::Scratch
    } else {
        TargetId::Output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ops(plan: &StagePlan) -> Vec<StepOp> {
        plan.steps.iter().map(|s| s.op).collect()
    }

    #[test]
    fn test_empty_mask_is_single_copy() {
        let plan = plan_steps(StageMask::EMPTY, PlanStart::Source);
        assert_eq!(
            plan.steps,
            vec![PlanStep {
                op: StepOp::Passthrough,
                input: TargetId::Source,
                output: TargetId::Output,
            }]
        );
        assert!(!plan.geometry_written && !plan.prefilm_written);
    }

    #[test]
    fn test_full_chain_from_source() {
        let plan = plan_steps(StageMask::ALL, PlanStart::Source);
        let targets: Vec<_> = plan.steps.iter().map(|s| (s.input, s.output)).collect();
        assert_eq!(
            targets,
            vec![
                (TargetId::Source, TargetId::Geometry),
                (TargetId::Geometry, TargetId::Output),
                (TargetId::Output, TargetId::Scratch),
                (TargetId::Scratch, TargetId::Output),
                (TargetId::Output, TargetId::PreFilm),
                (TargetId::PreFilm, TargetId::Output),
                (TargetId::Output, TargetId::Scratch),
                (TargetId::Scratch, TargetId::Output),
            ]
        );
        assert_eq!(plan.steps.last().map(|s| s.op), Some(StepOp::Passthrough));
        assert!(plan.geometry_written && plan.prefilm_written);
    }

    #[test]
    fn test_prefilm_start_runs_only_post_stages() {
        let plan = plan_steps(StageMask::ALL, PlanStart::PreFilm);
        assert_eq!(
            ops(&plan),
            vec![
                StepOp::Stage(StageKind::Film),
                StepOp::Stage(StageKind::Halation),
                StepOp::Passthrough,
            ]
        );
        assert!(!plan.geometry_written && !plan.prefilm_written);
    }

    #[test]
    fn test_geometry_start_skips_geometry_pass() {
        let mask = StageMask::EMPTY.with(StageKind::Geometry).with(StageKind::Master);
        let plan = plan_steps(mask, PlanStart::Geometry);
        assert_eq!(
            plan.steps,
            vec![PlanStep {
                op: StepOp::Stage(StageKind::Master),
                input: TargetId::Geometry,
                output: TargetId::Output,
            }]
        );
    }

    #[test]
    fn test_pre_only_chain_does_not_write_prefilm() {
        let mask = StageMask::EMPTY.with(StageKind::Master).with(StageKind::Curve);
        let plan = plan_steps(mask, PlanStart::Source);
        assert!(!plan.prefilm_written);
        assert!(plan.steps.iter().all(|s| s.output != TargetId::PreFilm));
    }

    #[test]
    fn test_mask_debug_lists_labels() {
        let mask = StageMask::EMPTY.with(StageKind::Film).with(StageKind::Master);
        assert_eq!(format!("{mask:?}"), r#"{"master", "film"}"#);
        assert_eq!(mask.pre_film(), StageMask::EMPTY.with(StageKind::Master));
    }

    fn any_start() -> impl Strategy<Value = PlanStart> {
        prop_oneof![
            Just(PlanStart::Source),
            Just(PlanStart::Geometry),
            Just(PlanStart::PreFilm),
        ]
    }

    proptest! {
        #[test]
        fn prop_plan_never_aliases_and_ends_in_output(bits in 0u8..128, start in any_start()) {
            let plan = plan_steps(StageMask::from_bits(bits), start);
            prop_assert!(!plan.steps.is_empty());
            for step in &plan.steps {
                prop_assert_ne!(step.input, step.output);
            }
            for pair in plan.steps.windows(2) {
                prop_assert_eq!(pair[0].output, pair[1].input);
            }
            prop_assert_eq!(plan.steps.last().map(|s| s.output), Some(TargetId::Output));
        }

        #[test]
        fn prop_active_stages_run_in_order(bits in 0u8..128) {
            let mask = StageMask::from_bits(bits);
            let plan = plan_steps(mask, PlanStart::Source);
            let ran: Vec<StageKind> = plan
                .steps
                .iter()
                .filter_map(|s| match s.op {
                    StepOp::Stage(kind) => Some(kind),
                    StepOp::Passthrough => None,
                })
                .collect();
            prop_assert_eq!(ran, mask.iter().collect::<Vec<_>>());
        }
    }
}
