/// Inverse golden ratio, `(√5 - 1) / 2`.
const INV_PHI: f64 = 0.618_033_988_749_895;

/// Shrink `[lo, hi]` around the minimum of a unimodal `f`.
///
/// Each step keeps one interior sample, so it costs a single evaluation.
/// Ends once the bracket is narrower than `tol` or `max_evals` is spent, and
/// returns the better interior sample as `(x, f(x))`.
pub(crate) fn golden_section_minimize(
    f: impl Fn(f64) -> f64,
    lo: f64,
    hi: f64,
    tol: f64,
    max_evals: usize,
) -> (f64, f64) {
    let (mut lo, mut hi) = (lo.min(hi), lo.max(hi));
    let x = hi - INV_PHI * (hi - lo);
    let mut left = (x, f(x));
    let x = lo + INV_PHI * (hi - lo);
    let mut right = (x, f(x));

    for _ in 2..max_evals {
        if hi - lo <= tol {
            break;
        }
        if left.1 < right.1 {
            // Minimum is left of `right`.
            hi = right.0;
            right = left;
            let x = hi - INV_PHI * (hi - lo);
            left = (x, f(x));
        } else {
            lo = left.0;
            left = right;
            let x = lo + INV_PHI * (hi - lo);
            right = (x, f(x));
        }
    }

    if left.1 < right.1 {
        left
    } else {
        right
    }
}

/// Minimize a periodic function of an angle on `[-π, π)`.
///
/// A coarse grid with spacing `step` locates the basin, then golden-section
/// search refines inside `[best - step, best + step]`.
pub(crate) fn minimize_angle(
    f: impl Fn(f64) -> f64,
    step: f64,
    tol: f64,
    max_evals: usize,
) -> (f64, f64) {
    use std::f64::consts::{PI, TAU};

    let n = (TAU / step).ceil().max(1.0) as usize;
    let step = TAU / n as f64;
    let mut best = (-PI, f(-PI));
    for i in 1..n {
        let x = -PI + i as f64 * step;
        let fx = f(x);
        if fx < best.1 {
            best = (x, fx);
        }
    }

    let (x, fx) = golden_section_minimize(&f, best.0 - step, best.0 + step, tol, max_evals);
    if fx < best.1 {
        (x, fx)
    } else {
        best
    }
}
