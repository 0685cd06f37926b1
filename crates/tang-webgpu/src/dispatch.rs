//! Fitting dispatch sizes into the per-dimension workgroup limit.

use crate::error::{ProgramError, Result};
use crate::program::DispatchSize;

/// Reshape `dispatch` so no dimension exceeds `max_per_dim`.
///
/// A dispatch already within the limit is returned unchanged. Otherwise the
/// total workgroup count is spread over a square `(s, s, 1)` grid and, if
/// that is still too wide, a cube `(c, c, c)`. The reshaped grid always
/// covers at least as many workgroups as requested; kernels that care
/// guard against the excess.
pub fn normalize_dispatch(dispatch: DispatchSize, max_per_dim: u32) -> Result<DispatchSize> {
    if dispatch.x <= max_per_dim && dispatch.y <= max_per_dim && dispatch.z <= max_per_dim {
        return Ok(dispatch);
    }

    let total = dispatch.total() as f64;
    let side = total.sqrt().ceil();
    if side <= f64::from(max_per_dim) {
        let s = side as u32;
        return Ok(DispatchSize::new(s, s, 1));
    }

    let side = total.cbrt().ceil();
    if side <= f64::from(max_per_dim) {
        let c = side as u32;
        return Ok(DispatchSize::new(c, c, c));
    }

    Err(ProgramError::DispatchTooLarge {
        dispatch: dispatch.as_array(),
        max: max_per_dim,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 65535;

    fn covers(requested: DispatchSize, normalized: DispatchSize, max: u32) {
        assert!(normalized.total() >= requested.total(), "{normalized} < {requested}");
        assert!(normalized.as_array().iter().all(|&d| d <= max && d >= 1));
    }

    #[test]
    fn within_limit_unchanged() {
        for d in [
            DispatchSize::new(2, 1, 1),
            DispatchSize::new(MAX, 1, 1),
            DispatchSize::new(MAX, MAX, MAX),
            DispatchSize::new(1, 1, 1),
        ] {
            assert_eq!(normalize_dispatch(d, MAX).unwrap(), d);
        }
    }

    #[test]
    fn square_when_it_fits() {
        let d = DispatchSize::new(70000, 2, 1);
        let n = normalize_dispatch(d, MAX).unwrap();
        // ceil(sqrt(140000)) = 375
        assert_eq!(n, DispatchSize::new(375, 375, 1));
        covers(d, n, MAX);

        let d = DispatchSize::new(MAX + 1, 1, 1);
        let n = normalize_dispatch(d, MAX).unwrap();
        assert_eq!(n, DispatchSize::new(256, 256, 1));
        covers(d, n, MAX);
    }

    #[test]
    fn cube_when_square_is_too_wide() {
        // 10^10 workgroups: sqrt is 100000 > 65535, cbrt rounds up to 2155.
        let d = DispatchSize::new(100_000, 100_000, 1);
        let n = normalize_dispatch(d, MAX).unwrap();
        assert_eq!(n, DispatchSize::new(2155, 2155, 2155));
        covers(d, n, MAX);
    }

    #[test]
    fn too_large_for_a_cube() {
        let d = DispatchSize::new(1000, 1000, 1000);
        let err = normalize_dispatch(d, 16).unwrap_err();
        assert_eq!(
            err,
            ProgramError::DispatchTooLarge {
                dispatch: [1000, 1000, 1000],
                max: 16,
            }
        );
    }

    #[test]
    fn small_limits() {
        let d = DispatchSize::new(20, 1, 1);
        let n = normalize_dispatch(d, 8).unwrap();
        assert_eq!(n, DispatchSize::new(5, 5, 1));
        covers(d, n, 8);

        let d = DispatchSize::new(100, 3, 1);
        let n = normalize_dispatch(d, 8).unwrap();
        // sqrt(300) -> 18 > 8, cbrt(300) -> 7
        assert_eq!(n, DispatchSize::new(7, 7, 7));
        covers(d, n, 8);
    }
}
