//! Per-voice resampler: one lane of arbitrary-ratio, aliasing-free playback.
//!
//! A [`Resampler`] binds a shared [`InterpPack`], a shared [`MipMap`] and a
//! private half-band filter. For a given pitch it reads the coarsest pyramid
//! level whose per-sample advance stays near or below one native sample.
//! Non-negative pitches render at twice the output rate through the 24-tap
//! kernel and fold back down through the decimator; negative pitches render
//! at rate through the 12-tap kernel and pass the phase aligner instead, so
//! group delay never jumps when the path switches.
//!
//! Whenever the selected level changes — an octave boundary is crossed or a
//! new pyramid is bound — the lane crossfades linearly from a snapshot of
//! the old state over [`FADE_LEN`] output samples. The fade-out slot keeps
//! its own `Arc` on the retiring pyramid, so hot-swapped data stays alive
//! exactly as long as it is still audible.

use crate::filters::{halfband_coefs, HALFBAND_NBR_COEFS, HALFBAND_TRANSITION};
use crate::halfband::HalfBand;
use crate::interp::{InterpKernel, InterpPack};
use crate::mipmap::MipMap;
use crate::position::{step_for_rel_pitch, PlaybackPos, BITS_PER_OCT, FADE_LEN};
use std::sync::Arc;

/// Generation scratch length; one chunk renders at most half this many
/// output samples.
const BUF_LEN: usize = 128;

/// Playback state of one crossfade slot.
#[derive(Debug, Clone, Default)]
struct VoiceSlot {
    mip: Option<Arc<MipMap>>,
    /// Position in the slot's own level address space.
    pos: PlaybackPos,
    step: i64,
    level: usize,
    ovrspl: bool,
}

/// Gain treatment for one rendered chunk.
enum Blend {
    Plain,
    Ramp { vol: f32, step: f32 },
    RampAdd { vol: f32, step: f32 },
}

/// One resampling lane.
pub struct Resampler {
    interp: Arc<InterpPack>,
    /// Latest bound pyramid; the current slot converges on it via a fade.
    mip: Option<Arc<MipMap>>,
    halfband: HalfBand,
    cur: VoiceSlot,
    old: VoiceSlot,
    buf: Vec<f32>,
    pitch: i32,
    pitch_set: bool,
    fading: bool,
    fade_pos: usize,
}

impl Resampler {
    /// New lane with the default decimator/aligner coefficients.
    pub fn new(interp: Arc<InterpPack>) -> Self {
        Self::with_coefs(
            interp,
            &halfband_coefs(HALFBAND_NBR_COEFS, HALFBAND_TRANSITION),
        )
    }

    /// New lane with caller-supplied polyphase all-pass coefficients.
    pub fn with_coefs(interp: Arc<InterpPack>, coefs: &[f64]) -> Self {
        Self {
            interp,
            mip: None,
            halfband: HalfBand::new(coefs),
            cur: VoiceSlot::default(),
            old: VoiceSlot::default(),
            buf: vec![0.0; BUF_LEN],
            pitch: 0,
            pitch_set: false,
            fading: false,
            fade_pos: 0,
        }
    }

    /// Bind a shared pyramid.
    ///
    /// The first bind initializes the lane; later binds arm a hot-swap
    /// crossfade on the next [`produce_block`](Self::produce_block), with
    /// the fade-out slot holding the retiring pyramid alive.
    pub fn set_sample(&mut self, mip: Arc<MipMap>) {
        if self.mip.is_none() {
            self.cur.mip = Some(mip.clone());
        }
        self.mip = Some(mip);
        if self.pitch_set {
            // Revalidate against the new level count.
            self.set_pitch(self.pitch);
        }
    }

    /// Unbind; the lane must be rebound and repitched before further use.
    pub fn remove_sample(&mut self) {
        self.mip = None;
        self.cur = VoiceSlot::default();
        self.old = VoiceSlot::default();
        self.pitch_set = false;
        self.fading = false;
        self.fade_pos = 0;
    }

    /// Whether a pyramid is currently bound.
    pub fn has_sample(&self) -> bool {
        self.mip.is_some()
    }

    /// Identity of the bound pyramid, for hot-swap detection.
    pub fn sample(&self) -> Option<&Arc<MipMap>> {
        self.mip.as_ref()
    }

    /// Set the playback pitch in `1 << BITS_PER_OCT` units per octave;
    /// 0 is unity rate. A pitch whose target level differs from the active
    /// one arms a crossfade, begun on the next produced block.
    pub fn set_pitch(&mut self, pitch: i32) {
        let mip = self.mip.as_ref().expect("set_pitch before set_sample");
        assert!(
            (pitch >> BITS_PER_OCT) < mip.level_count() as i32,
            "pitch beyond pyramid range"
        );
        self.pitch = pitch;

        if !self.pitch_set {
            self.pitch_set = true;
            self.cur.level = self.target_level();
        }

        // Both slots follow the new pitch immediately; a level change is
        // picked up by the fade machinery on the next produced block.
        self.compute_step_cur();
        if self.fading {
            self.compute_step_old();
        }
    }

    /// Current pitch.
    pub fn pitch(&self) -> i32 {
        self.pitch
    }

    /// Set the playback position, in level-0 units.
    pub fn set_playback_pos(&mut self, pos: PlaybackPos) {
        self.cur.pos = pos.to_level(self.cur.level);
    }

    /// Current playback position, in level-0 units.
    pub fn playback_pos(&self) -> PlaybackPos {
        self.cur.pos.to_level_zero(self.cur.level)
    }

    /// Reset filter history and fade state. Required on any non-continuous
    /// position jump; also snaps the lane straight onto the latest bound
    /// pyramid without a fade.
    pub fn clear_buffers(&mut self) {
        self.halfband.clear();
        self.fading = false;
        self.fade_pos = 0;
        self.old = VoiceSlot::default();

        if let Some(mip) = &self.mip {
            let stale = self
                .cur
                .mip
                .as_ref()
                .map_or(true, |cur| !Arc::ptr_eq(cur, mip));
            if stale {
                let pos0 = self.playback_pos();
                self.cur.mip = Some(mip.clone());
                if self.pitch_set {
                    self.cur.level = self.target_level();
                    self.cur.pos = pos0.to_level(self.cur.level);
                    self.compute_step_cur();
                }
            }
        }
    }

    /// Generate `dest.len()` output samples, advancing the playback
    /// position by the pitch-derived step and running the level crossfade
    /// state machine.
    ///
    /// Real-time safe: no locking, no allocation.
    pub fn produce_block(&mut self, dest: &mut [f32]) {
        assert!(self.pitch_set, "produce_block before set_pitch");
        assert!(self.mip.is_some(), "produce_block before set_sample");

        let mut done = 0;
        while done < dest.len() {
            if !self.fading && self.fade_pending() {
                self.begin_fade();
            }
            let mut work = (dest.len() - done).min(BUF_LEN / 2);
            if self.fading {
                work = work.min(FADE_LEN - self.fade_pos);
                self.render_fade_chunk(work);
                self.fade_pos += work;
                if self.fade_pos >= FADE_LEN {
                    self.fading = false;
                    self.fade_pos = 0;
                    self.old.mip = None;
                }
            } else {
                self.render_plain_chunk(work);
            }
            dest[done..done + work].copy_from_slice(&self.buf[..work]);
            done += work;
        }
    }

    /// Whether the lane still has to fade towards the latest bound pyramid
    /// or a new target level. A change arriving mid-fade waits here until
    /// the running fade completes, so the retiring slot is never cut short.
    fn fade_pending(&self) -> bool {
        let bound = self.mip.as_ref().expect("no sample bound");
        let swap = self
            .cur
            .mip
            .as_ref()
            .map_or(true, |cur| !Arc::ptr_eq(cur, bound));
        swap || self.target_level() != self.cur.level
    }

    /// Coarsest level that keeps the in-level step near or below one native
    /// sample: clamp(floor(log2(rate)), 0, levels-1).
    fn target_level(&self) -> usize {
        let mip = self.mip.as_ref().expect("no sample bound");
        let raw = self.pitch >> BITS_PER_OCT;
        raw.clamp(0, mip.level_count() as i32 - 1) as usize
    }

    fn compute_step_cur(&mut self) {
        let (step, ovrspl) = step_for(self.pitch, self.cur.level);
        self.cur.step = step;
        self.cur.ovrspl = ovrspl;
    }

    fn compute_step_old(&mut self) {
        let (step, ovrspl) = step_for(self.pitch, self.old.level);
        self.old.step = step;
        self.old.ovrspl = ovrspl;
    }

    /// Snapshot the current slot for fade-out and rebind the current slot to
    /// the target pyramid and level at the equivalent position.
    fn begin_fade(&mut self) {
        self.old = self.cur.clone();

        let pos0 = self.cur.pos.to_level_zero(self.cur.level);
        self.cur.mip = self.mip.clone();
        self.cur.level = self.target_level();
        self.cur.pos = pos0.to_level(self.cur.level);
        self.compute_step_cur();
        self.compute_step_old();

        self.fading = true;
        self.fade_pos = 0;
    }

    /// Render one non-fading chunk of `work` output samples into
    /// `self.buf[..work]`.
    fn render_plain_chunk(&mut self, work: usize) {
        if self.cur.ovrspl {
            render_slot(
                self.interp.ovrspl(),
                &mut self.cur,
                &mut self.buf[..work * 2],
                Blend::Plain,
            );
            self.halfband.downsample_block(&mut self.buf, work);
        } else {
            render_slot(
                self.interp.norm(),
                &mut self.cur,
                &mut self.buf[..work],
                Blend::Plain,
            );
            self.halfband.phase_block(&mut self.buf, work);
        }
    }

    /// Render one fading chunk: both slots at the generation rate with
    /// opposite linear ramps, summed before the shared filter so the pair
    /// stays phase-coherent.
    fn render_fade_chunk(&mut self, work: usize) {
        let ovrspl = self.cur.ovrspl;
        let gen_len = if ovrspl { work * 2 } else { work };
        let vol_step = 1.0 / (FADE_LEN * if ovrspl { 2 } else { 1 }) as f32;
        let vol = self.fade_pos as f32 / FADE_LEN as f32;

        let kernel = if ovrspl {
            self.interp.ovrspl()
        } else {
            self.interp.norm()
        };
        render_slot(
            kernel,
            &mut self.cur,
            &mut self.buf[..gen_len],
            Blend::Ramp {
                vol,
                step: vol_step,
            },
        );
        render_slot(
            kernel,
            &mut self.old,
            &mut self.buf[..gen_len],
            Blend::RampAdd {
                vol: 1.0 - vol,
                step: -vol_step,
            },
        );

        if ovrspl {
            self.halfband.downsample_block(&mut self.buf, work);
        } else {
            self.halfband.phase_block(&mut self.buf, work);
        }
    }
}

/// In-level pitch-derived step and oversampling flag.
///
/// Non-negative pitches generate at 2x and are decimated back, which halves
/// the step; the in-level generation step then stays below one native
/// sample, bounding interpolator error and aliasing.
fn step_for(pitch: i32, level: usize) -> (i64, bool) {
    let ovrspl = pitch >= 0;
    let mut rel = pitch - ((level as i32) << BITS_PER_OCT);
    if ovrspl {
        rel -= 1 << BITS_PER_OCT;
    }
    (step_for_rel_pitch(rel), ovrspl)
}

/// Render `out.len()` generation-rate samples from one slot.
fn render_slot(kernel: &InterpKernel, slot: &mut VoiceSlot, out: &mut [f32], blend: Blend) {
    let mip = slot.mip.as_ref().expect("slot has no pyramid");
    let data = mip.level_data(slot.level);
    let pre = mip.guard_pre();
    let mut pos = slot.pos;
    let step = slot.step;

    match blend {
        Blend::Plain => {
            for v in out.iter_mut() {
                *v = kernel.interpolate(data, pre + pos.int() as usize, pos.frac());
                pos.advance(step);
            }
        }
        Blend::Ramp { mut vol, step: vs } => {
            for v in out.iter_mut() {
                *v = vol * kernel.interpolate(data, pre + pos.int() as usize, pos.frac());
                vol += vs;
                pos.advance(step);
            }
        }
        Blend::RampAdd { mut vol, step: vs } => {
            for v in out.iter_mut() {
                *v += vol * kernel.interpolate(data, pre + pos.int() as usize, pos.frac());
                vol += vs;
                pos.advance(step);
            }
        }
    }
    slot.pos = pos;
}
