//! One construction group's pass: anchor, mapping, member binding.
//!
//! Groups run one after another against a shared binding table. Every change
//! a pass makes (anchor binding, member bindings, verdicts) is computed first
//! and committed at the end, so a refined mapping never leaves half of a
//! group evaluated against the previous version.

use std::collections::{BTreeMap, BTreeSet};

use super::result::FrameStats;
use crate::anchor::{anchor_hypotheses, elect_anchor, AnchorCandidate};
use crate::config::{EngineConfig, ResolvedTolerance};
use crate::geometry::{vec2, Vec2};
use crate::grouping::ConstructionGroup;
use crate::mapping::{
    refine_mapping, single_pair, Correspondence, FrameTransform, Hypothesis, RigidMapping,
    SolveError,
};
use crate::piece::{PieceId, TargetId};
use crate::puzzle::Puzzle;
use crate::tracking::MotionTracker;
use crate::validate::{
    bind_members, check_piece, step, BindContext, BindingTable, CheckEvent, FailureReason,
    MemberInput, MemberOutcome, PieceCheck, PieceValidationState, ValidationStatus,
};

/// What a pass concluded about one piece.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Verdict {
    pub(crate) event: CheckEvent,
    pub(crate) check: Option<PieceCheck>,
}

/// Read-only inputs shared by every group pass of a frame.
pub(crate) struct PassContext<'a> {
    pub(crate) puzzle: &'a Puzzle,
    pub(crate) config: &'a EngineConfig,
    pub(crate) tolerance: ResolvedTolerance,
    pub(crate) tracker: &'a MotionTracker,
    /// Validation states at the start of the frame.
    pub(crate) prior: &'a BTreeMap<PieceId, PieceValidationState>,
}

/// Mutable frame state threaded through the group passes.
pub(crate) struct FrameLedger<'a> {
    pub(crate) bindings: &'a mut BindingTable,
    /// Pieces that passed earlier this frame; their bindings are firm.
    pub(crate) passed: BTreeSet<PieceId>,
    pub(crate) verdicts: BTreeMap<PieceId, Verdict>,
    pub(crate) stats: FrameStats,
}

impl FrameLedger<'_> {
    fn verdict(&mut self, piece: PieceId, event: CheckEvent, check: Option<PieceCheck>) {
        if event == CheckEvent::Pass {
            self.passed.insert(piece);
        }
        self.verdicts.insert(piece, Verdict { event, check });
    }

    fn bind(&mut self, piece: PieceId, target: TargetId) {
        let before = self.bindings.target_of(piece);
        if before == Some(target) {
            return;
        }
        if let Some(evicted) = self.bindings.bind(piece, target) {
            tracing::debug!(
                target_id = target.0,
                holder = evicted.0,
                claimant = piece.0,
                "uncorroborated binding preempted"
            );
            self.stats.n_released += 1;
        }
        if before.is_some() {
            self.stats.n_rebinds += 1;
        } else {
            self.stats.n_binds += 1;
        }
    }

    /// Apply member outcomes: release everything that moves first, then bind.
    fn commit(&mut self, outcomes: &[MemberOutcome]) {
        let mut moved: Vec<(PieceId, bool, TargetId)> = Vec::new();
        for o in outcomes {
            let before = self.bindings.target_of(o.piece);
            if before == o.target {
                continue;
            }
            if before.is_some() {
                self.bindings.unbind_piece(o.piece);
            }
            match o.target {
                Some(t) => moved.push((o.piece, before.is_some(), t)),
                None => self.stats.n_released += 1,
            }
        }
        for (piece, had_binding, target) in moved {
            if let Some(evicted) = self.bindings.bind(piece, target) {
                tracing::debug!(
                    target_id = target.0,
                    holder = evicted.0,
                    claimant = piece.0,
                    "binding preempted"
                );
                self.stats.n_released += 1;
            }
            if had_binding {
                self.stats.n_rebinds += 1;
            } else {
                self.stats.n_binds += 1;
            }
        }
    }
}

/// A mapping instantiated and evaluated against a group's members.
struct Evaluation {
    transform: FrameTransform,
    outcomes: Vec<MemberOutcome>,
    support: usize,
    score: f64,
}

enum Search {
    Adopt(Hypothesis),
    /// Distinct hypotheses explain equally many members; holds the members
    /// any of them would pass.
    Ambiguous(BTreeSet<PieceId>),
    Keep,
}

struct Scored {
    hyp: Hypothesis,
    support: usize,
    score: f64,
    assignment: BTreeSet<(PieceId, TargetId)>,
}

impl PassContext<'_> {
    fn status(&self, id: PieceId) -> ValidationStatus {
        self.prior.get(&id).map(|s| s.status).unwrap_or_default()
    }

    /// A holder from another group whose binding a passing piece may take.
    fn is_preemptible(&self, holder: PieceId, passed: &BTreeSet<PieceId>) -> bool {
        self.config.binding.allow_preemption
            && !passed.contains(&holder)
            && self.status(holder).is_uncorroborated()
    }

    /// Targets the group may claim. Bindings of the group's own members are
    /// re-checked by the binder and are not part of the pool.
    fn pool(
        &self,
        group: &ConstructionGroup,
        bindings: &BindingTable,
        passed: &BTreeSet<PieceId>,
        exclude: Option<TargetId>,
    ) -> BTreeSet<TargetId> {
        self.puzzle
            .targets()
            .iter()
            .map(|t| t.id)
            .filter(|&t| Some(t) != exclude)
            .filter(|&t| match bindings.holder_of(t) {
                None => true,
                Some(h) => !group.contains(h) && self.is_preemptible(h, passed),
            })
            .collect()
    }

    fn elect(&self, group: &ConstructionGroup) -> Option<PieceId> {
        let pieces: Vec<_> = group
            .members
            .iter()
            .filter_map(|&m| self.tracker.get(m))
            .collect();
        if pieces.is_empty() {
            return None;
        }
        let centroid =
            pieces.iter().map(|p| vec2(p.obs.position)).sum::<Vec2>() / pieces.len() as f64;
        let candidates: Vec<AnchorCandidate> = pieces
            .iter()
            .map(|p| AnchorCandidate {
                id: p.obs.id,
                validated: self.status(p.obs.id) == ValidationStatus::Validated,
                speed: p.speed,
                dwell: self.tracker.dwell(p.obs.id),
                centrality: (vec2(p.obs.position) - centroid).norm(),
            })
            .collect();
        elect_anchor(&candidates)
    }

    fn evaluate(
        &self,
        group: &ConstructionGroup,
        mapping: &RigidMapping,
        bindings: &BindingTable,
        passed: &BTreeSet<PieceId>,
    ) -> Option<Evaluation> {
        let anchor = self.tracker.get(mapping.anchor)?;
        let transform = mapping.follow_anchor(vec2(anchor.obs.position), anchor.continuous_feature);
        let pool = self.pool(group, bindings, passed, Some(mapping.anchor_target));
        let inputs: Vec<MemberInput<'_>> = group
            .members
            .iter()
            .filter(|&&m| m != mapping.anchor)
            .filter_map(|&m| self.tracker.get(m))
            .map(|p| MemberInput {
                obs: &p.obs,
                bound: bindings
                    .target_of(p.obs.id)
                    .filter(|&t| t != mapping.anchor_target),
            })
            .collect();
        let ctx = BindContext {
            puzzle: self.puzzle,
            transform: &transform,
            tolerance: &self.tolerance,
            rebind_margin: self.config.binding.rebind_margin,
        };
        let outcomes = bind_members(&inputs, &pool, &ctx);
        let (support, score) = outcomes
            .iter()
            .filter(|o| o.event == CheckEvent::Pass)
            .fold((0usize, 0.0), |(n, s), o| {
                (n + 1, s + o.check.map_or(0.0, |c| c.score))
            });
        Some(Evaluation {
            transform,
            outcomes,
            support,
            score,
        })
    }

    /// Try every way the anchor could sit on the puzzle, plus every way an
    /// already validated member could. Without a working mapping every member
    /// may propose itself. Keeps the hypothesis corroborating the most members.
    fn search(
        &self,
        group: &ConstructionGroup,
        anchor: PieceId,
        current: Option<&RigidMapping>,
        current_support: usize,
        ledger: &FrameLedger<'_>,
    ) -> Search {
        let hint = current.map(|m| m.mirror_parity);
        let open_field = current_support == 0;
        let pool = self.pool(group, &*ledger.bindings, &ledger.passed, None);
        let mut hyps = Vec::new();
        for &m in &group.members {
            let Some(p) = self.tracker.get(m) else {
                continue;
            };
            let own = ledger.bindings.target_of(m);
            if m == anchor || open_field {
                let targets = self
                    .puzzle
                    .targets()
                    .iter()
                    .filter(|t| pool.contains(&t.id) || Some(t.id) == own);
                hyps.extend(anchor_hypotheses(&p.obs, targets, hint));
            } else if self.status(m) == ValidationStatus::Validated {
                if let Some(t) = own.and_then(|t| self.puzzle.target(t)) {
                    hyps.extend(anchor_hypotheses(&p.obs, std::iter::once(t), hint));
                }
            }
        }

        let scored: Vec<Scored> = hyps
            .into_iter()
            .filter_map(|hyp| {
                let p = self.tracker.get(hyp.anchor)?;
                let t = self.puzzle.target(hyp.target)?;
                let m = single_pair(&hyp, vec2(p.obs.position), p.continuous_feature, t, 0);
                let eval = self.evaluate(group, &m, &*ledger.bindings, &ledger.passed)?;
                let mut assignment: BTreeSet<(PieceId, TargetId)> = eval
                    .outcomes
                    .iter()
                    .filter(|o| o.event == CheckEvent::Pass)
                    .filter_map(|o| o.target.map(|t| (o.piece, t)))
                    .collect();
                assignment.insert((hyp.anchor, hyp.target));
                Some(Scored {
                    hyp,
                    support: eval.support,
                    score: eval.score,
                    assignment,
                })
            })
            .collect();

        let best = scored.iter().map(|s| s.support).max().unwrap_or(0);
        if best == 0 || best <= current_support {
            return Search::Keep;
        }
        let winners: Vec<&Scored> = scored.iter().filter(|s| s.support == best).collect();
        // Hypotheses placing every piece on the same target are interchangeable
        // (e.g. a triangle's own mirror symmetry).
        let interchangeable = winners
            .iter()
            .all(|w| w.assignment == winners[0].assignment);
        if interchangeable {
            let pick = winners.iter().min_by(|a, b| {
                (b.hyp.anchor == anchor)
                    .cmp(&(a.hyp.anchor == anchor))
                    .then_with(|| a.score.total_cmp(&b.score))
                    .then_with(|| a.hyp.cmp(&b.hyp))
            });
            return match pick {
                Some(w) => Search::Adopt(w.hyp),
                None => Search::Keep,
            };
        }
        Search::Ambiguous(
            winners
                .iter()
                .flat_map(|w| w.assignment.iter().map(|&(p, _)| p))
                .collect(),
        )
    }

    /// Bind the hypothesis' anchor and build its single-pair mapping.
    fn install(
        &self,
        group: &mut ConstructionGroup,
        hyp: &Hypothesis,
        ledger: &mut FrameLedger<'_>,
    ) -> Option<RigidMapping> {
        let piece = self.tracker.get(hyp.anchor)?;
        let target = self.puzzle.target(hyp.target)?;
        ledger.bind(hyp.anchor, hyp.target);
        let version = group.next_version();
        tracing::debug!(
            group = group.id.0,
            anchor = hyp.anchor.0,
            target_id = hyp.target.0,
            parity = hyp.parity,
            turn = hyp.turn,
            version,
            "single-pair mapping"
        );
        Some(single_pair(
            hyp,
            vec2(piece.obs.position),
            piece.continuous_feature,
            target,
            version,
        ))
    }

    /// Mapping for an anchor without corroboration: its own binding, or the
    /// only free target of its shape.
    fn fallback_mapping(
        &self,
        group: &mut ConstructionGroup,
        anchor: PieceId,
        ledger: &mut FrameLedger<'_>,
    ) -> Option<RigidMapping> {
        let piece = self.tracker.get(anchor)?;
        let shape = piece.obs.shape();
        let own = ledger
            .bindings
            .target_of(anchor)
            .and_then(|t| self.puzzle.target(t))
            .filter(|t| t.shape() == shape);
        let target = match own {
            Some(t) => t,
            None => {
                let pool = self.pool(group, &*ledger.bindings, &ledger.passed, None);
                let mut open = self
                    .puzzle
                    .targets_of_shape(shape)
                    .filter(|t| pool.contains(&t.id));
                let only = open.next()?;
                if open.next().is_some() {
                    return None;
                }
                only
            }
        };
        let parity = shape.is_mirrorable() && (piece.obs.is_mirrored ^ target.is_mirrored);
        let hyp = Hypothesis {
            anchor,
            target: target.id,
            parity,
            turn: 0,
        };
        self.install(group, &hyp, ledger)
    }

    /// Anchor plus every passing member that this pass would validate.
    fn correspondences(&self, mapping: &RigidMapping, outcomes: &[MemberOutcome]) -> Vec<Correspondence> {
        let mut pairs = Vec::with_capacity(outcomes.len() + 1);
        if let (Some(a), Some(t)) = (
            self.tracker.get(mapping.anchor),
            self.puzzle.target(mapping.anchor_target),
        ) {
            pairs.push(Correspondence::new(&a.obs, t));
        }
        for o in outcomes.iter().filter(|o| o.event == CheckEvent::Pass) {
            let prior = self.prior.get(&o.piece).cloned().unwrap_or_default();
            if step(&prior, CheckEvent::Pass, &self.config.hysteresis).status
                != ValidationStatus::Validated
            {
                continue;
            }
            let piece = self.tracker.get(o.piece);
            let target = o.target.and_then(|t| self.puzzle.target(t));
            if let (Some(p), Some(t)) = (piece, target) {
                pairs.push(Correspondence::new(&p.obs, t));
            }
        }
        pairs
    }

    fn singleton(
        &self,
        group: &mut ConstructionGroup,
        anchor: PieceId,
        ledger: &mut FrameLedger<'_>,
    ) -> Option<FrameTransform> {
        if group.mapping.is_none() {
            group.mapping = self.fallback_mapping(group, anchor, ledger);
        }
        let piece = self.tracker.get(anchor)?;
        let transform = group
            .mapping
            .as_ref()
            .map(|m| m.follow_anchor(vec2(piece.obs.position), piece.continuous_feature));
        let check = match (&group.mapping, &transform) {
            (Some(m), Some(ft)) => self
                .puzzle
                .target(m.anchor_target)
                .map(|t| check_piece(&piece.obs, t, ft, &self.tolerance)),
            _ => None,
        };
        let event = if self.puzzle.n_targets() == 1 && group.mapping.is_some() {
            // Nothing else could corroborate a one-piece puzzle.
            CheckEvent::Pass
        } else if self.status(anchor) == ValidationStatus::Validated {
            CheckEvent::Fail(FailureReason::WrongPosition)
        } else {
            CheckEvent::Hold
        };
        ledger.verdict(anchor, event, check);
        transform
    }
}

/// Run one group's pass. Returns the transform applied this frame, if the
/// group has a mapping.
pub(crate) fn run_group(
    ctx: &PassContext<'_>,
    group: &mut ConstructionGroup,
    ledger: &mut FrameLedger<'_>,
) -> Option<FrameTransform> {
    if group.anchor.map_or(true, |a| !group.contains(a)) {
        let elected = ctx.elect(group)?;
        set_anchor(group, elected, &mut ledger.stats);
    }
    let anchor = group.anchor?;

    // A mapping is only usable while its anchor still holds the anchor target.
    let stale = group.mapping.as_ref().is_some_and(|m| {
        m.anchor != anchor || ledger.bindings.target_of(anchor) != Some(m.anchor_target)
    });
    if stale {
        tracing::debug!(group = group.id.0, anchor = anchor.0, "anchor lost its target, mapping dropped");
        group.mapping = None;
    }

    if group.members.len() == 1 {
        return ctx.singleton(group, anchor, ledger);
    }

    let current = group
        .mapping
        .take()
        .and_then(|m| {
            let eval = ctx.evaluate(group, &m, &*ledger.bindings, &ledger.passed)?;
            Some((m, eval))
        });
    let current_support = current.as_ref().map_or(0, |(_, e)| e.support);
    let mut mapping = current.map(|(m, _)| m);

    if mapping.is_none() || current_support + 1 < group.members.len() {
        match ctx.search(group, anchor, mapping.as_ref(), current_support, ledger) {
            Search::Adopt(hyp) => {
                if hyp.anchor != anchor {
                    set_anchor(group, hyp.anchor, &mut ledger.stats);
                }
                let installed = ctx.install(group, &hyp, ledger);
                if installed.is_some() {
                    mapping = installed;
                }
            }
            Search::Ambiguous(passers) if mapping.is_none() => {
                tracing::debug!(group = group.id.0, n_passers = passers.len(), "ambiguous anchor hypotheses");
                ledger.stats.n_ambiguous += 1;
                ledger.verdict(anchor, CheckEvent::Ambiguous, None);
                for p in passers.into_iter().filter(|&p| p != anchor) {
                    ledger.verdict(p, CheckEvent::Ambiguous, None);
                }
                return None;
            }
            Search::Ambiguous(_) | Search::Keep => {}
        }
    }
    let anchor = group.anchor?;
    if mapping.is_none() {
        mapping = ctx.fallback_mapping(group, anchor, ledger);
    }
    let mut mapping = mapping?;

    let anchor_piece = ctx.tracker.get(mapping.anchor)?;
    let anchor_pos = vec2(anchor_piece.obs.position);
    let anchor_feature = anchor_piece.continuous_feature;
    let mut eval = ctx.evaluate(group, &mapping, &*ledger.bindings, &ledger.passed)?;

    for _ in 0..ctx.config.solver.max_refine_passes {
        let pairs = ctx.correspondences(&mapping, &eval.outcomes);
        match refine_mapping(
            &mapping,
            &pairs,
            anchor_pos,
            anchor_feature,
            ctx.config.unit_length,
            &ctx.config.solver,
        ) {
            Ok(Some(refit)) => {
                let Some(next) = ctx.evaluate(group, &refit, &*ledger.bindings, &ledger.passed) else {
                    break;
                };
                tracing::info!(
                    group = group.id.0,
                    version = refit.version,
                    pairs = refit.pair_count(),
                    residual = refit.residual_rms,
                    rotation_deg = refit.rotation_delta.to_degrees(),
                    "mapping refined"
                );
                ledger.stats.n_refinements += 1;
                group.mapping_version = group.mapping_version.max(refit.version);
                mapping = refit;
                eval = next;
            }
            Ok(None) => break,
            Err(SolveError::Degenerate { spread }) => {
                tracing::debug!(group = group.id.0, spread, "degenerate refit, keeping mapping");
                ledger.stats.n_degenerate_fits += 1;
                break;
            }
            Err(err) => {
                tracing::debug!(group = group.id.0, %err, "refit rejected");
                break;
            }
        }
    }

    ledger.commit(&eval.outcomes);
    for o in &eval.outcomes {
        if o.event == CheckEvent::Ambiguous {
            ledger.stats.n_ambiguous += 1;
        }
        ledger.verdict(o.piece, o.event, o.check);
    }

    let anchor_check = ctx
        .puzzle
        .target(mapping.anchor_target)
        .map(|t| check_piece(&anchor_piece.obs, t, &eval.transform, &ctx.tolerance));
    let anchor_event = match anchor_check {
        Some(c) if !c.passes() => {
            CheckEvent::Fail(c.failure_reason().unwrap_or(FailureReason::WrongPosition))
        }
        _ if eval.support > 0 => CheckEvent::Pass,
        _ => CheckEvent::Hold,
    };
    ledger.verdict(mapping.anchor, anchor_event, anchor_check);

    tracing::debug!(
        group = group.id.0,
        anchor = mapping.anchor.0,
        version = mapping.version,
        support = eval.support,
        score = eval.score,
        "group evaluated"
    );
    group.mapping = Some(mapping);
    Some(eval.transform)
}

fn set_anchor(group: &mut ConstructionGroup, anchor: PieceId, stats: &mut FrameStats) {
    if group.anchor == Some(anchor) {
        return;
    }
    if let Some(prev) = group.anchor {
        tracing::debug!(group = group.id.0, from = prev.0, to = anchor.0, "anchor changed");
        stats.n_anchor_changes += 1;
    }
    group.anchor = Some(anchor);
    group.mapping = None;
}
