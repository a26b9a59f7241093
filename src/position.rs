//! Fixed-point playback position and pitch units.

/// Bits of pitch resolution per octave. A pitch of `1 << BITS_PER_OCT`
/// doubles the playback rate.
pub const BITS_PER_OCT: u32 = 16;

/// Length of the level crossfade, in output samples.
pub const FADE_LEN: usize = 64;

/// 64-bit fixed-point playback position: high 32 bits are the integer sample
/// index, low 32 bits the fractional phase.
///
/// Positions are signed so that rescaling between pyramid levels is a plain
/// arithmetic shift, but valid playback positions are always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PlaybackPos(pub i64);

impl PlaybackPos {
    /// Position at an integer sample index, zero fractional phase.
    #[inline]
    pub fn from_int(index: i64) -> Self {
        Self(index << 32)
    }

    /// Integer sample index (floor).
    #[inline]
    pub fn int(self) -> i64 {
        self.0 >> 32
    }

    /// Fractional phase as a 32-bit fixed-point value.
    #[inline]
    pub fn frac(self) -> u32 {
        self.0 as u32
    }

    /// Rescale a level-0 position to `level` units.
    #[inline]
    pub fn to_level(self, level: usize) -> Self {
        Self(self.0 >> level)
    }

    /// Rescale a position in `level` units back to level-0 units.
    #[inline]
    pub fn to_level_zero(self, level: usize) -> Self {
        Self(self.0 << level)
    }

    /// Advance by a fixed-point step.
    #[inline]
    pub fn advance(&mut self, step: i64) {
        self.0 += step;
    }
}

/// Fixed-point (32.32) advance step for a pitch expressed relative to the
/// active level, in `BITS_PER_OCT` units.
///
/// `rel_pitch == 0` yields one sample per output sample; each additional
/// `1 << BITS_PER_OCT` doubles the step.
pub fn step_for_rel_pitch(rel_pitch: i32) -> i64 {
    let oct = rel_pitch >> BITS_PER_OCT;
    let frac = (rel_pitch & ((1 << BITS_PER_OCT) - 1)) as f64;
    // Mantissa in [2^32, 2^33).
    let mant = ((frac / 65536.0).exp2() * 4294967296.0).round() as i64;
    if oct >= 0 {
        mant << oct
    } else {
        mant >> -oct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_frac_split() {
        let p = PlaybackPos((123 << 32) | 0x8000_0000);
        assert_eq!(p.int(), 123);
        assert_eq!(p.frac(), 0x8000_0000);
    }

    #[test]
    fn test_level_rescale_round_trip() {
        let p = PlaybackPos::from_int(4096);
        let down = p.to_level(3);
        assert_eq!(down.int(), 512);
        assert_eq!(down.to_level_zero(3), p);
    }

    #[test]
    fn test_unity_step() {
        assert_eq!(step_for_rel_pitch(0), 1 << 32);
    }

    #[test]
    fn test_octave_steps() {
        assert_eq!(step_for_rel_pitch(1 << 16), 2 << 32);
        assert_eq!(step_for_rel_pitch(-(1 << 16)), 1 << 31);
    }

    #[test]
    fn test_fractional_step_monotonic() {
        let mut last = 0;
        for pitch in (-65536..65536).step_by(4096) {
            let s = step_for_rel_pitch(pitch);
            assert!(s > last);
            last = s;
        }
    }
}
