//! Sample pyramid: declared shape, incremental fill, immutable result.
//!
//! A [`MipMapBuilder`] is declared with the sample shape, fed level-0 data in
//! one or more chunks, and consumed by [`MipMapBuilder::build`], which
//! derives every coarser level and yields the read-only [`MipMap`]. Built
//! pyramids are shared behind `Arc` and never mutated; content updates
//! replace the whole pyramid.

use tracing::debug;

/// Declared pyramid shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipMapSpec {
    /// Level-0 sample length.
    pub len: usize,
    /// Guard samples required before each level's nominal range.
    pub guard_pre: usize,
    /// Guard samples required after each level's nominal range.
    pub guard_post: usize,
    /// Number of mip levels, level 0 included.
    pub levels: usize,
}

/// One mip level: a guarded sample buffer.
#[derive(Debug, Clone)]
struct Level {
    data: Vec<f32>,
    len: usize,
}

/// Immutable multi-resolution sample pyramid.
///
/// Level 0 holds the original mono data; level k is a half-band-filtered,
/// 2x-decimated copy of level k-1. Every level carries `guard_pre` /
/// `guard_post` valid samples outside its nominal range so windowed reads
/// near the edges stay in bounds.
#[derive(Debug)]
pub struct MipMap {
    levels: Vec<Level>,
    len: usize,
    guard_pre: usize,
    guard_post: usize,
}

impl MipMap {
    /// Length of the original sample.
    pub fn sample_len(&self) -> usize {
        self.len
    }

    /// Number of mip levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Nominal length of level `k`: `ceil(len / 2^k)`.
    pub fn level_len(&self, level: usize) -> usize {
        assert!(level < self.levels.len());
        self.levels[level].len
    }

    /// Guard length before each level's nominal start.
    pub fn guard_pre(&self) -> usize {
        self.guard_pre
    }

    /// Guard length after each level's nominal end.
    pub fn guard_post(&self) -> usize {
        self.guard_post
    }

    /// Raw guarded buffer of level `k`; index `guard_pre()` is nominal
    /// sample 0.
    pub fn level_data(&self, level: usize) -> &[f32] {
        assert!(level < self.levels.len());
        &self.levels[level].data
    }
}

/// Incremental pyramid builder.
pub struct MipMapBuilder {
    level0: Vec<f32>,
    spec: MipMapSpec,
    guard_pre: usize,
    guard_post: usize,
    /// Center-first half of the symmetric decimation FIR.
    filter: Vec<f64>,
    filled: usize,
}

impl MipMapBuilder {
    /// Declare a pyramid.
    ///
    /// `fir` is an odd-length, centered, symmetric half-band kernel. Guard
    /// lengths are forced up to the two-sided filter support so the level
    /// build never reads out of bounds. A zero-length spec is a harmless
    /// no-op: the builder is complete immediately.
    pub fn new(spec: MipMapSpec, fir: &[f64]) -> Self {
        assert!(spec.levels > 0, "pyramid needs at least one level");
        assert!(fir.len() % 2 == 1, "decimation FIR length must be odd");

        let half = (fir.len() - 1) / 2;
        let support = half * 2;
        let guard_pre = spec.guard_pre.max(support);
        let guard_post = spec.guard_post.max(support);

        let filter = fir[half..].to_vec();
        let level0 = vec![0.0; guard_pre + spec.len + guard_post];

        Self {
            level0,
            spec,
            guard_pre,
            guard_post,
            filter,
            filled: 0,
        }
    }

    /// Append level-0 data. Returns `true` while more data is still needed.
    pub fn fill(&mut self, data: &[f32]) -> bool {
        assert!(
            data.len() <= self.remaining(),
            "fill overruns declared length"
        );
        let offset = self.guard_pre + self.filled;
        self.level0[offset..offset + data.len()].copy_from_slice(data);
        self.filled += data.len();
        !self.is_complete()
    }

    /// Discard filled content and start over, keeping the declared shape
    /// and the allocation.
    pub fn clear(&mut self) {
        self.level0.iter_mut().for_each(|v| *v = 0.0);
        self.filled = 0;
    }

    /// Whether the declared length is fully filled.
    pub fn is_complete(&self) -> bool {
        self.filled == self.spec.len
    }

    /// Samples still needed to complete level 0.
    pub fn remaining(&self) -> usize {
        self.spec.len - self.filled
    }

    /// Derive levels 1..n and freeze the pyramid. The filter storage is
    /// released with the builder.
    pub fn build(self) -> MipMap {
        assert!(self.is_complete(), "pyramid built before fill completed");

        let spec = self.spec;
        let mut levels = Vec::with_capacity(spec.levels);
        levels.push(Level {
            data: self.level0,
            len: spec.len,
        });

        for lvl in 1..spec.levels {
            let len = level_len_for(spec.len, lvl);
            let mut data = vec![0.0f32; self.guard_pre + len + self.guard_post];
            decimate_level(
                &levels[lvl - 1].data,
                &mut data,
                len,
                self.guard_pre,
                &self.filter,
            );
            levels.push(Level { data, len });
        }

        debug!(
            len = spec.len,
            levels = spec.levels,
            guard_pre = self.guard_pre,
            "mip pyramid built"
        );

        MipMap {
            levels,
            len: spec.len,
            guard_pre: self.guard_pre,
            guard_post: self.guard_post,
        }
    }
}

fn level_len_for(len: usize, level: usize) -> usize {
    let scale = 1usize << level;
    (len + scale - 1) >> level
}

/// Half-band filter + decimate-by-2 from `src` into `dst`.
///
/// Output runs a quarter of the filter support past both nominal boundaries
/// so downstream readers get real data in guard territory.
fn decimate_level(src: &[f32], dst: &mut [f32], dst_len: usize, guard_pre: usize, filter: &[f64]) {
    let half = filter.len() - 1;
    let quarter = (half / 2) as isize;

    for pos in -quarter..dst_len as isize + quarter {
        let src_pos = guard_pre as isize + pos * 2;
        let dst_pos = (guard_pre as isize + pos) as usize;
        dst[dst_pos] = filter_sample(src, src_pos as usize, filter);
    }
}

fn filter_sample(src: &[f32], pos: usize, filter: &[f64]) -> f32 {
    let half = filter.len() - 1;
    debug_assert!(pos >= half && pos + half < src.len());

    let mut sum = src[pos] as f64 * filter[0];
    for i in 1..=half {
        sum += (src[pos - i] + src[pos + i]) as f64 * filter[i];
    }
    sum as f32
}
