//! Mip-mapped wavetable resampling with lock-free pyramid hot-swap.
//!
//! Plays arbitrary-rate, aliasing-free audio out of a multi-resolution
//! sample pyramid: each mip level is a half-band-filtered, 2x-decimated copy
//! of the previous one, and a per-voice resampler picks the level matching
//! its pitch, interpolates with a polyphase FIR bank and crossfades across
//! octave boundaries. A background pipeline rebuilds pyramids off the audio
//! thread and publishes them with a single atomic swap.
//!
//! # Features
//!
//! - **Pyramid builder**: incremental fill, guard-extended levels, immutable
//!   shared result
//! - **Interpolation**: 12-tap and 24-tap fractional-delay FIR phase banks
//!   with linear inter-phase blending
//! - **Half-band stage**: polyphase all-pass 2x decimator and matching
//!   phase aligner, so group delay holds across path switches
//! - **Voice resampler**: 32.32 fixed-point position, octave crossfades,
//!   real-time-safe `produce_block`
//! - **Rebuild pipeline**: debounced background builds, lock-free publish
//!
//! # Example
//!
//! ```ignore
//! use mipwave::{
//!     filters, InterpPack, MipMapBuilder, MipMapSpec, PlaybackPos, Resampler,
//! };
//!
//! let fir = filters::mip_map_fir(filters::MIP_MAP_FIR_LEN);
//! let spec = MipMapSpec { len: table.len(), guard_pre: 0, guard_post: 0, levels: 8 };
//! let mut builder = MipMapBuilder::new(spec, &fir);
//! builder.fill(&table);
//! let mip = std::sync::Arc::new(builder.build());
//!
//! let mut voice = Resampler::new(InterpPack::shared());
//! voice.set_sample(mip);
//! voice.set_pitch(1 << mipwave::BITS_PER_OCT); // one octave up
//! voice.set_playback_pos(PlaybackPos::from_int(0));
//! voice.produce_block(&mut out);
//! ```

// Error types
pub mod error;
pub use error::{Error, Result};

// Per-voice playback (most common usage)
mod voice;
pub use voice::Resampler;

// Background rebuild pipeline
mod rebuild;
pub use rebuild::{MipRebuilder, RebuildConfig};

// Building blocks
pub mod filters;
pub mod halfband;
pub mod interp;
pub mod mipmap;
pub mod position;

pub use halfband::HalfBand;
pub use interp::{InterpKernel, InterpPack};
pub use mipmap::{MipMap, MipMapBuilder, MipMapSpec};
pub use position::{PlaybackPos, BITS_PER_OCT, FADE_LEN};
