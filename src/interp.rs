//! Fractional-delay FIR interpolation: phase bank and kernel pack.
//!
//! An [`InterpKernel`] holds one precomputed bank of 64 fractional-delay FIR
//! phases. A requested position between two stored phases is approximated by
//! linear interpolation in coefficient space: each phase stores its
//! tap-reversed coefficients plus the per-tap delta to the next phase, so
//! the residual fractional weight folds into the convolution itself.
//!
//! [`InterpPack`] bundles the two kernels a voice needs: a full-band 12-tap
//! kernel for the plain-rate path and a half-band 24-tap kernel (with the
//! decimator's 2x gain pre-compensated) for the oversampled path. One pack is
//! immutable after setup and shared by any number of voices.

use crate::filters;
use std::sync::Arc;

/// log2 of the number of stored phases.
pub const NBR_PHASES_L2: u32 = 6;
/// Number of stored fractional-delay phases per sample interval.
pub const NBR_PHASES: usize = 1 << NBR_PHASES_L2;

/// Tap count of the plain-rate (full-band) kernel.
pub const FIR_LEN_NORM: usize = 12;
/// Tap count of the oversampled (half-band) kernel.
pub const FIR_LEN_OVRSPL: usize = 24;

/// One fractional-delay phase: tap-reversed coefficients and the coefficient
/// delta to the next phase.
#[derive(Debug, Clone)]
struct Phase {
    imp: Vec<f32>,
    dif: Vec<f32>,
}

/// A bank of fractional-delay FIR phases over a fixed power-of-two
/// subdivision of one sample interval.
#[derive(Debug, Clone)]
pub struct InterpKernel {
    phases: Vec<Phase>,
    fir_len: usize,
}

impl InterpKernel {
    /// Build an empty kernel; [`set_impulse`](Self::set_impulse) must run
    /// before [`interpolate`](Self::interpolate).
    pub fn new(fir_len: usize) -> Self {
        assert!(fir_len % 2 == 0, "tap count must be even");
        Self {
            phases: Vec::new(),
            fir_len,
        }
    }

    /// Tap count of one phase.
    pub fn fir_len(&self) -> usize {
        self.fir_len
    }

    /// Valid samples required before a read position.
    pub fn margin_pre(&self) -> usize {
        self.fir_len / 2 - 1
    }

    /// Valid samples required after a read position.
    pub fn margin_post(&self) -> usize {
        self.fir_len / 2 + 1
    }

    /// Reindex an externally supplied impulse table (`fir_len * NBR_PHASES`
    /// centered entries) into the per-phase arrays. Runs once, at setup.
    pub fn set_impulse(&mut self, table: &[f64]) {
        assert_eq!(table.len(), self.fir_len * NBR_PHASES);

        let mut phases = vec![
            Phase {
                imp: vec![0.0; self.fir_len],
                dif: vec![0.0; self.fir_len],
            };
            NBR_PHASES
        ];

        // Walk the flat table backwards so each entry also yields the delta
        // to its successor; the successor of the very last entry is zero.
        let mut next_coef = 0.0f64;
        for fir_pos in (0..self.fir_len).rev() {
            for phase_idx in (0..NBR_PHASES).rev() {
                let coef = table[fir_pos * NBR_PHASES + phase_idx];
                let tap = self.fir_len - 1 - fir_pos;
                let phase = &mut phases[phase_idx];
                phase.imp[tap] = coef as f32;
                phase.dif[tap] = (next_coef - coef) as f32;
                next_coef = coef;
            }
        }
        self.phases = phases;
    }

    /// Interpolate from `data` around index `idx` (a guarded-buffer index)
    /// with 32-bit fractional phase `frac`.
    ///
    /// The caller guarantees `margin_pre()` valid samples before `idx` and
    /// `margin_post()` after — exactly what pyramid guards provide.
    #[inline]
    pub fn interpolate(&self, data: &[f32], idx: usize, frac: u32) -> f32 {
        debug_assert!(!self.phases.is_empty(), "set_impulse before interpolate");

        // Top bits select a stored phase, the rest weight the delta table.
        let phase_idx = (frac >> (32 - NBR_PHASES_L2)) as usize;
        let q = (frac << NBR_PHASES_L2) as f32 * (1.0 / 4294967296.0);
        let phase = &self.phases[phase_idx];

        let start = idx - self.margin_pre();
        let window = &data[start..start + self.fir_len];

        // Paired accumulators keep the two dependency chains independent.
        let mut acc_0 = 0.0f32;
        let mut acc_1 = 0.0f32;
        for i in (0..self.fir_len).step_by(2) {
            acc_0 += (phase.imp[i] + phase.dif[i] * q) * window[i];
            acc_1 += (phase.imp[i + 1] + phase.dif[i + 1] * q) * window[i + 1];
        }
        acc_0 + acc_1
    }
}

/// The kernel pair shared by every voice: plain-rate and oversampled.
#[derive(Debug)]
pub struct InterpPack {
    norm: InterpKernel,
    ovrspl: InterpKernel,
}

impl InterpPack {
    /// Build both kernels from the default windowed-sinc design.
    ///
    /// The oversampled kernel carries a 0.5 gain so the decimator's implicit
    /// 2x gain cancels out.
    pub fn new() -> Self {
        let mut norm = InterpKernel::new(FIR_LEN_NORM);
        norm.set_impulse(&filters::interp_impulse(FIR_LEN_NORM, NBR_PHASES, 1.0, 1.0));

        let mut ovrspl = InterpKernel::new(FIR_LEN_OVRSPL);
        ovrspl.set_impulse(&filters::interp_impulse(
            FIR_LEN_OVRSPL,
            NBR_PHASES,
            0.5,
            0.5,
        ));

        Self { norm, ovrspl }
    }

    /// Shared, immutable pack.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Full-band kernel for the plain-rate path.
    #[inline]
    pub fn norm(&self) -> &InterpKernel {
        &self.norm
    }

    /// Half-band kernel for the 2x-oversampled path.
    #[inline]
    pub fn ovrspl(&self) -> &InterpKernel {
        &self.ovrspl
    }

    /// Guard samples a pyramid must provide before nominal sample 0.
    pub fn guard_pre(&self) -> usize {
        self.ovrspl.margin_pre() + 1
    }

    /// Guard samples a pyramid must provide after its nominal end.
    pub fn guard_post(&self) -> usize {
        self.ovrspl.margin_post() + 1
    }
}

impl Default for InterpPack {
    fn default() -> Self {
        Self::new()
    }
}
