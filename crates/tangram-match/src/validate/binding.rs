//! Instance binding: which target slot each piece occupies.
//!
//! Duplicated kinds (two large and two small triangles) are interchangeable,
//! so a piece is bound to a concrete target only when its mapped pose passes
//! against it, and a target is never bound to two pieces at once.

use std::collections::{BTreeMap, BTreeSet};

use super::check::{check_piece, FailureReason, PieceCheck};
use super::hysteresis::CheckEvent;
use crate::config::ResolvedTolerance;
use crate::mapping::FrameTransform;
use crate::observation::PieceObservation;
use crate::piece::{PieceId, TargetId};
use crate::puzzle::Puzzle;

/// Bidirectional piece <-> target index.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BindingTable {
    by_target: BTreeMap<TargetId, PieceId>,
    by_piece: BTreeMap<PieceId, TargetId>,
}

impl BindingTable {
    /// Bind `piece` to `target`, dropping any previous binding of either.
    ///
    /// Returns the piece that previously held `target`, if it was another one.
    pub(crate) fn bind(&mut self, piece: PieceId, target: TargetId) -> Option<PieceId> {
        self.unbind_piece(piece);
        let evicted = self.by_target.insert(target, piece);
        if let Some(prev) = evicted {
            self.by_piece.remove(&prev);
        }
        self.by_piece.insert(piece, target);
        evicted.filter(|&p| p != piece)
    }

    pub(crate) fn unbind_piece(&mut self, piece: PieceId) -> Option<TargetId> {
        let target = self.by_piece.remove(&piece)?;
        self.by_target.remove(&target);
        Some(target)
    }

    #[inline]
    pub(crate) fn target_of(&self, piece: PieceId) -> Option<TargetId> {
        self.by_piece.get(&piece).copied()
    }

    #[inline]
    pub(crate) fn holder_of(&self, target: TargetId) -> Option<PieceId> {
        self.by_target.get(&target).copied()
    }

    /// Targets with a bound piece.
    pub(crate) fn consumed(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.by_target.keys().copied()
    }
}

/// A member to bind, with its binding at the start of the pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemberInput<'a> {
    pub(crate) obs: &'a PieceObservation,
    pub(crate) bound: Option<TargetId>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    target: TargetId,
    check: PieceCheck,
}

/// Result of binding one member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MemberOutcome {
    pub(crate) piece: PieceId,
    pub(crate) event: CheckEvent,
    /// Binding after this pass.
    pub(crate) target: Option<TargetId>,
    /// Check against the bound target, or against the closest candidate.
    pub(crate) check: Option<PieceCheck>,
    pub(crate) rebound: bool,
    pub(crate) released: bool,
}

/// Shared inputs of one binding pass.
pub(crate) struct BindContext<'a> {
    pub(crate) puzzle: &'a Puzzle,
    pub(crate) transform: &'a FrameTransform,
    pub(crate) tolerance: &'a ResolvedTolerance,
    pub(crate) rebind_margin: f64,
}

/// Two-phase binding of a group's members under one mapping.
///
/// Phase 1 re-checks existing bindings only. Members whose binding fails
/// release their target into `pool`. Phase 2 lets unbound and failed members
/// claim from the pool in order of their best score: a claim needs a unique
/// best candidate (runner-up worse by at least `rebind_margin`), and a failed
/// member only switches when the new target beats its old one by the same
/// margin. A failed member keeps its binding unless someone else claims it.
pub(crate) fn bind_members(
    members: &[MemberInput<'_>],
    pool: &BTreeSet<TargetId>,
    ctx: &BindContext<'_>,
) -> Vec<MemberOutcome> {
    let mut pool = pool.clone();
    let mut outcomes: Vec<Option<MemberOutcome>> = vec![None; members.len()];
    // (member index, failed check against its own binding)
    let mut contenders: Vec<(usize, Option<PieceCheck>)> = Vec::new();

    for (i, m) in members.iter().enumerate() {
        let bound = m
            .bound
            .and_then(|t| ctx.puzzle.target(t))
            .filter(|t| t.shape() == m.obs.shape());
        match bound {
            Some(t) => {
                let check = check_piece(m.obs, t, ctx.transform, ctx.tolerance);
                if check.passes() {
                    outcomes[i] = Some(MemberOutcome {
                        piece: m.obs.id,
                        event: CheckEvent::Pass,
                        target: Some(t.id),
                        check: Some(check),
                        rebound: false,
                        released: false,
                    });
                } else {
                    pool.insert(t.id);
                    contenders.push((i, Some(check)));
                }
            }
            None => contenders.push((i, None)),
        }
    }

    // Candidate lists per contender, passing ones sorted by score.
    let mut ranked: Vec<(usize, Option<PieceCheck>, Vec<Candidate>, Option<Candidate>)> = contenders
        .into_iter()
        .map(|(i, own)| {
            let m = &members[i];
            let mut all: Vec<Candidate> = ctx
                .puzzle
                .targets_of_shape(m.obs.shape())
                .filter(|t| pool.contains(&t.id) && Some(t.id) != m.bound)
                .map(|t| Candidate {
                    target: t.id,
                    check: check_piece(m.obs, t, ctx.transform, ctx.tolerance),
                })
                .collect();
            all.sort_by(|a, b| a.check.score.total_cmp(&b.check.score));
            let closest = all.first().copied();
            let passing: Vec<Candidate> = all.into_iter().filter(|c| c.check.passes()).collect();
            (i, own, passing, closest)
        })
        .collect();
    ranked.sort_by(|a, b| {
        let sa = a.2.first().map_or(f64::INFINITY, |c| c.check.score);
        let sb = b.2.first().map_or(f64::INFINITY, |c| c.check.score);
        sa.total_cmp(&sb)
            .then_with(|| members[a.0].obs.id.cmp(&members[b.0].obs.id))
    });

    let mut claimed: BTreeSet<TargetId> = BTreeSet::new();
    for (i, own, passing, closest) in ranked {
        let m = &members[i];
        let mut open = passing.iter().filter(|c| !claimed.contains(&c.target));
        let best = open.next().copied();
        let runner_up = open.next().copied();

        let fail_event = |own: Option<PieceCheck>| -> CheckEvent {
            let reason = own
                .or(closest.map(|c| c.check))
                .and_then(|c| c.failure_reason())
                .unwrap_or(FailureReason::WrongPieceType);
            CheckEvent::Fail(reason)
        };

        let outcome = match best {
            Some(b)
                if runner_up
                    .is_some_and(|r| r.check.score - b.check.score < ctx.rebind_margin) =>
            {
                MemberOutcome {
                    piece: m.obs.id,
                    event: CheckEvent::Ambiguous,
                    target: m.bound,
                    check: Some(b.check),
                    rebound: false,
                    released: false,
                }
            }
            Some(b)
                if own.map_or(true, |o| b.check.score + ctx.rebind_margin < o.score) =>
            {
                claimed.insert(b.target);
                MemberOutcome {
                    piece: m.obs.id,
                    event: CheckEvent::Pass,
                    target: Some(b.target),
                    check: Some(b.check),
                    rebound: own.is_some(),
                    released: false,
                }
            }
            _ => MemberOutcome {
                piece: m.obs.id,
                event: fail_event(own),
                target: m.bound,
                check: own.or(closest.map(|c| c.check)),
                rebound: false,
                released: false,
            },
        };
        outcomes[i] = Some(outcome);
    }

    // A failed member whose old target was claimed by another loses it.
    let mut out: Vec<MemberOutcome> = outcomes.into_iter().flatten().collect();
    for o in &mut out {
        if o.event != CheckEvent::Pass {
            if let Some(t) = o.target {
                if claimed.contains(&t) {
                    o.target = None;
                    o.released = true;
                }
            }
        }
    }
    out
}
