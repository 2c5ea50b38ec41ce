//! Per-piece motion history across frames.
//!
//! The tracker keeps the latest observation of every piece, when it last
//! moved, and a continuous (unwrapped) feature angle. The unwrapped angle
//! absorbs symmetric re-labelings from vision sources (a square reported at
//! 89° one frame and -1° the next has not turned).

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::geometry::signed_periodic_diff;
use crate::observation::PieceObservation;
use crate::piece::PieceId;

#[derive(Debug, Clone)]
pub(crate) struct TrackedPiece {
    pub(crate) obs: PieceObservation,
    /// Feature angle unwrapped across frames (radians, unbounded).
    pub(crate) continuous_feature: f64,
    pub(crate) speed: f64,
    pub(crate) last_moved: f64,
    pub(crate) missed_frames: u32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MotionTracker {
    pieces: BTreeMap<PieceId, TrackedPiece>,
    now: f64,
}

/// What changed in one tracker update.
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackingUpdate {
    /// Pieces forgotten this frame.
    pub(crate) removed: Vec<PieceId>,
    /// Pieces observed for the first time, or re-identified as another kind.
    /// A flipped piece keeps its track; the mirror check reports the flip.
    pub(crate) appeared: Vec<PieceId>,
}

impl MotionTracker {
    pub(crate) fn update(
        &mut self,
        observations: &[PieceObservation],
        config: &EngineConfig,
    ) -> TrackingUpdate {
        let mut update = TrackingUpdate::default();
        if let Some(t) = observations
            .iter()
            .map(|o| o.timestamp)
            .max_by(|a, b| a.total_cmp(b))
        {
            self.now = t;
        }

        let move_eps = config.grouping.move_epsilon_units * config.unit_length;
        let rot_eps = config.grouping.rotation_epsilon_deg.to_radians();

        let mut seen = Vec::with_capacity(observations.len());
        for obs in observations {
            seen.push(obs.id);
            let reuse = self
                .pieces
                .get(&obs.id)
                .filter(|p| p.obs.piece_type == obs.piece_type);
            let Some(prev) = reuse else {
                if self.pieces.contains_key(&obs.id) {
                    tracing::debug!(id = obs.id.0, "piece re-identified, restarting its track");
                }
                update.appeared.push(obs.id);
                self.pieces.insert(
                    obs.id,
                    TrackedPiece {
                        obs: obs.clone(),
                        continuous_feature: obs.feature_angle(),
                        speed: velocity_norm(obs).unwrap_or(0.0),
                        last_moved: obs.timestamp,
                        missed_frames: 0,
                    },
                );
                continue;
            };

            let period = obs.shape().symmetry_period();
            let dpos = ((obs.position[0] - prev.obs.position[0]).powi(2)
                + (obs.position[1] - prev.obs.position[1]).powi(2))
            .sqrt();
            let dfeat = signed_periodic_diff(obs.feature_angle(), prev.continuous_feature, period);
            let dt = obs.timestamp - prev.obs.timestamp;
            let moved = dpos > move_eps || dfeat.abs() > rot_eps;
            let speed = velocity_norm(obs).unwrap_or(if dt > 0.0 { dpos / dt } else { 0.0 });

            let continuous_feature = prev.continuous_feature + dfeat;
            let last_moved = if moved { obs.timestamp } else { prev.last_moved };
            self.pieces.insert(
                obs.id,
                TrackedPiece {
                    obs: obs.clone(),
                    continuous_feature,
                    speed,
                    last_moved,
                    missed_frames: 0,
                },
            );
        }

        seen.sort_unstable();
        let max_missed = config.tracking.max_missed_frames;
        for (id, piece) in self.pieces.iter_mut() {
            if seen.binary_search(id).is_err() {
                piece.missed_frames += 1;
                piece.speed = 0.0;
                if piece.missed_frames > max_missed {
                    update.removed.push(*id);
                }
            }
        }
        for id in &update.removed {
            self.pieces.remove(id);
        }
        update
    }

    pub(crate) fn get(&self, id: PieceId) -> Option<&TrackedPiece> {
        self.pieces.get(&id)
    }

    pub(crate) fn pieces(&self) -> impl Iterator<Item = (&PieceId, &TrackedPiece)> + '_ {
        self.pieces.iter()
    }

    /// Pieces observed in the latest frame. Pieces inside their missed-frame
    /// grace period are left out.
    pub(crate) fn visible(&self) -> impl Iterator<Item = (&PieceId, &TrackedPiece)> + '_ {
        self.pieces.iter().filter(|(_, p)| p.missed_frames == 0)
    }

    pub(crate) fn now(&self) -> f64 {
        self.now
    }

    /// Seconds since the piece last moved.
    pub(crate) fn dwell(&self, id: PieceId) -> f64 {
        self.pieces
            .get(&id)
            .map(|p| (self.now - p.last_moved).max(0.0))
            .unwrap_or(0.0)
    }

    pub(crate) fn is_recent(&self, id: PieceId, window_secs: f64, focus: Option<PieceId>) -> bool {
        if focus == Some(id) {
            return true;
        }
        self.pieces
            .get(&id)
            .is_some_and(|p| self.now - p.last_moved <= window_secs)
    }
}

fn velocity_norm(obs: &PieceObservation) -> Option<f64> {
    obs.velocity.map(|v| (v[0] * v[0] + v[1] * v[1]).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceType;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn square(id: u32, x: f64, rotation: f64, t: f64) -> PieceObservation {
        PieceObservation::new(PieceId(id), PieceType::Square, [x, 0.0], rotation, false, t)
    }

    #[test]
    fn still_piece_keeps_last_moved_time() {
        let cfg = EngineConfig::default();
        let mut tracker = MotionTracker::default();
        tracker.update(&[square(1, 0.0, 0.0, 0.0)], &cfg);
        tracker.update(&[square(1, 0.1, 0.0, 1.0)], &cfg);
        tracker.update(&[square(1, 0.1, 0.0, 5.0)], &cfg);
        assert_abs_diff_eq!(tracker.dwell(PieceId(1)), 5.0, epsilon = 1e-12);
        assert!(!tracker.is_recent(PieceId(1), 2.0, None));
        assert!(tracker.is_recent(PieceId(1), 2.0, Some(PieceId(1))));
    }

    #[test]
    fn symmetric_relabel_is_not_motion() {
        let cfg = EngineConfig::default();
        let mut tracker = MotionTracker::default();
        tracker.update(&[square(1, 0.0, FRAC_PI_2 - 0.01, 0.0)], &cfg);
        tracker.update(&[square(1, 0.0, -0.01, 3.0)], &cfg);
        let p = tracker.get(PieceId(1)).unwrap();
        assert_abs_diff_eq!(p.continuous_feature, FRAC_PI_2 - 0.01, epsilon = 1e-9);
        assert_abs_diff_eq!(p.last_moved, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn speed_falls_back_to_finite_difference() {
        let cfg = EngineConfig::default();
        let mut tracker = MotionTracker::default();
        tracker.update(&[square(1, 0.0, 0.0, 0.0)], &cfg);
        tracker.update(&[square(1, 10.0, 0.0, 0.5)], &cfg);
        assert_abs_diff_eq!(tracker.get(PieceId(1)).unwrap().speed, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_pieces_are_retained_for_configured_frames() {
        let mut cfg = EngineConfig::default();
        cfg.tracking.max_missed_frames = 1;
        let mut tracker = MotionTracker::default();
        tracker.update(&[square(1, 0.0, 0.0, 0.0), square(2, 90.0, 0.0, 0.0)], &cfg);
        let u = tracker.update(&[square(1, 0.0, 0.0, 0.1)], &cfg);
        assert!(u.removed.is_empty());
        assert_eq!(tracker.pieces().count(), 2);
        let u = tracker.update(&[square(1, 0.0, 0.0, 0.2)], &cfg);
        assert_eq!(u.removed, vec![PieceId(2)]);
        assert_eq!(tracker.pieces().count(), 1);
    }

    #[test]
    fn missed_piece_is_hidden_but_kept() {
        let cfg = EngineConfig::default();
        let mut tracker = MotionTracker::default();
        tracker.update(&[square(1, 0.0, 0.0, 0.0), square(2, 90.0, 0.0, 0.0)], &cfg);
        let u = tracker.update(&[square(1, 0.0, 0.0, 0.1)], &cfg);
        assert!(u.removed.is_empty());
        let visible: Vec<PieceId> = tracker.visible().map(|(&id, _)| id).collect();
        assert_eq!(visible, vec![PieceId(1)]);

        let u = tracker.update(&[square(1, 0.0, 0.0, 0.2), square(2, 90.0, 0.0, 0.2)], &cfg);
        assert!(u.appeared.is_empty());
        assert_eq!(tracker.visible().count(), 2);
    }

    #[test]
    fn mirror_flip_keeps_the_track() {
        let cfg = EngineConfig::default();
        let mut tracker = MotionTracker::default();
        let pg = |mirrored: bool, t: f64| {
            PieceObservation::new(PieceId(3), PieceType::Parallelogram, [0.0, 0.0], 0.4, mirrored, t)
        };
        tracker.update(&[pg(false, 0.0)], &cfg);
        let u = tracker.update(&[pg(true, 2.0)], &cfg);
        assert!(u.appeared.is_empty());
        let p = tracker.get(PieceId(3)).unwrap();
        assert!(p.obs.is_mirrored);
        assert_abs_diff_eq!(p.last_moved, 0.0, epsilon = 1e-12);

        let u = tracker.update(&[PieceObservation::new(
            PieceId(3),
            PieceType::Square,
            [0.0, 0.0],
            0.4,
            false,
            3.0,
        )], &cfg);
        assert_eq!(u.appeared, vec![PieceId(3)]);
    }
}
