//! 7-stage polyphase IIR half-band filter: 2x decimator and phase aligner.
//!
//! Two chains of first-order all-pass sections run on interleaved sample
//! paths; their sum is a steep half-band low-pass. [`HalfBand::downsample_block`]
//! halves the rate, [`HalfBand::phase_block`] leaves the rate alone but
//! applies the same group delay, so a signal that skipped decimation stays
//! phase-aligned with one that did not.

use crate::filters::HALFBAND_NBR_COEFS;

const ANTI_DENORMAL: f32 = 1e-20;

/// Polyphase half-band IIR state.
///
/// Filter state persists across calls and must be [`cleared`](HalfBand::clear)
/// on any position or content discontinuity.
#[derive(Debug, Clone)]
pub struct HalfBand {
    coefs: [f32; HALFBAND_NBR_COEFS],
    x: [f32; 2],
    y: [f32; HALFBAND_NBR_COEFS],
}

impl HalfBand {
    /// Build from all-pass coefficients, each strictly in (0, 1).
    pub fn new(coefs: &[f64]) -> Self {
        assert_eq!(coefs.len(), HALFBAND_NBR_COEFS);
        let mut arr = [0.0f32; HALFBAND_NBR_COEFS];
        for (dst, &c) in arr.iter_mut().zip(coefs) {
            assert!(c > 0.0 && c < 1.0, "all-pass coefficient out of (0,1)");
            *dst = c as f32;
        }
        Self {
            coefs: arr,
            x: [0.0; 2],
            y: [0.0; HALFBAND_NBR_COEFS],
        }
    }

    /// Reset the filter state, as if the input had been zero forever.
    pub fn clear(&mut self) {
        self.x = [0.0; 2];
        self.y = [0.0; HALFBAND_NBR_COEFS];
    }

    /// Downsample `buf[..n * 2]` by 2 into `buf[..n]`, in place.
    ///
    /// The output carries an implicit 2x gain; compensation is left to the
    /// caller.
    pub fn downsample_block(&mut self, buf: &mut [f32], n: usize) {
        debug_assert!(buf.len() >= n * 2);
        for pos in 0..n {
            let path_1 = buf[pos * 2];
            let path_0 = buf[pos * 2 + 1];
            buf[pos] = self.process_sample(path_0, path_1);
        }
    }

    /// Filter `buf[..n]` in place without changing the rate, matching the
    /// group delay of [`downsample_block`](Self::downsample_block) by
    /// zero-stuffing the skipped path.
    pub fn phase_block(&mut self, buf: &mut [f32], n: usize) {
        debug_assert!(buf.len() >= n);
        for v in buf[..n].iter_mut() {
            *v = self.process_sample(0.0, *v);
        }

        // Flush denormals accumulated on the zero-fed path.
        for i in [0, 2, 4, 6] {
            self.y[i] += ANTI_DENORMAL;
            self.y[i] -= ANTI_DENORMAL;
        }
    }

    /// One filtered output from an input pair; `path_1` is the earlier
    /// sample. Implicit 2x gain (paths are summed, not averaged).
    #[inline]
    fn process_sample(&mut self, path_0: f32, path_1: f32) -> f32 {
        let c = &self.coefs;
        let y = &mut self.y;
        let (mut t0, mut t1) = (self.x[0], self.x[1]);
        self.x = [path_0, path_1];

        let mut p0 = (path_0 - y[0]) * c[0] + t0;
        let mut p1 = (path_1 - y[1]) * c[1] + t1;
        (t0, t1) = (y[0], y[1]);
        (y[0], y[1]) = (p0, p1);

        let n0 = (p0 - y[2]) * c[2] + t0;
        let n1 = (p1 - y[3]) * c[3] + t1;
        (t0, t1) = (y[2], y[3]);
        (y[2], y[3]) = (n0, n1);
        (p0, p1) = (n0, n1);

        let n0 = (p0 - y[4]) * c[4] + t0;
        let n1 = (p1 - y[5]) * c[5] + t1;
        t0 = y[4];
        (y[4], y[5]) = (n0, n1);
        (p0, p1) = (n0, n1);

        let n0 = (p0 - y[6]) * c[6] + t0;
        y[6] = n0;

        n0 + p1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{halfband_coefs, HALFBAND_TRANSITION};
    use std::f32::consts::TAU;

    fn make() -> HalfBand {
        HalfBand::new(&halfband_coefs(HALFBAND_NBR_COEFS, HALFBAND_TRANSITION))
    }

    fn rms(sig: &[f32]) -> f32 {
        (sig.iter().map(|v| v * v).sum::<f32>() / sig.len() as f32).sqrt()
    }

    #[test]
    fn test_zero_in_zero_out() {
        let mut hb = make();
        let mut buf = vec![0.0f32; 512];
        hb.downsample_block(&mut buf, 256);
        assert!(buf[..256].iter().all(|&v| v == 0.0));
        hb.phase_block(&mut buf, 256);
        assert!(buf[..256].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_downsample_passband_gain_two() {
        let mut hb = make();
        let mut buf: Vec<f32> = (0..4096).map(|i| (TAU * 0.02 * i as f32).sin()).collect();
        hb.downsample_block(&mut buf, 2048);
        let gain = rms(&buf[1024..2048]) / (0.5f32).sqrt();
        assert!((gain - 2.0).abs() < 0.01, "gain {}", gain);
    }

    #[test]
    fn test_downsample_stopband_rejection() {
        // 0.3 cycles/sample aliases into the output band and must be gone.
        let mut hb = make();
        let mut buf: Vec<f32> = (0..8192).map(|i| (TAU * 0.3 * i as f32).sin()).collect();
        hb.downsample_block(&mut buf, 4096);
        assert!(rms(&buf[2048..4096]) < 2e-3);
    }

    #[test]
    fn test_phase_block_matches_downsampled_hold() {
        // phase_block(x) should peak its cross-correlation with
        // downsample(2x-hold of x) at zero lag.
        let sig: Vec<f32> = (0..2048).map(|i| (TAU * 0.02 * i as f32).sin()).collect();

        let mut held = Vec::with_capacity(4096);
        for &s in &sig {
            held.push(s);
            held.push(s);
        }
        let mut hb_a = make();
        hb_a.downsample_block(&mut held, 2048);
        let down = &held[..2048];

        let mut aligned = sig.clone();
        let mut hb_b = make();
        hb_b.phase_block(&mut aligned, 2048);

        let corr = |lag: i32| -> f32 {
            (100..1900)
                .map(|i| down[(i + lag.max(0)) as usize] * aligned[(i - lag.min(0)) as usize])
                .sum()
        };
        let zero = corr(0);
        for lag in [-3, -2, -1, 1, 2, 3] {
            assert!(corr(lag) < zero, "lag {} beats zero lag", lag);
        }
    }

    #[test]
    #[should_panic]
    fn test_coef_out_of_range_panics() {
        HalfBand::new(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 1.2]);
    }

    #[test]
    fn test_clear_forgets_history() {
        let mut hb = make();
        let mut buf: Vec<f32> = (0..256).map(|i| (TAU * 0.05 * i as f32).sin()).collect();
        hb.phase_block(&mut buf, 256);
        hb.clear();

        let mut silence = vec![0.0f32; 128];
        hb.phase_block(&mut silence, 128);
        assert!(silence.iter().all(|&v| v == 0.0));
    }
}
