//! End-to-end tests: pyramid pipeline feeding real-time voices, hot-swap
//! behavior under concurrency, and chunking invariance of the audio path.

use mipwave::{
    filters, InterpPack, MipMapBuilder, MipMapSpec, MipRebuilder, PlaybackPos, RebuildConfig,
    Resampler, BITS_PER_OCT, FADE_LEN,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn spec(len: usize, levels: usize) -> MipMapSpec {
    MipMapSpec {
        len,
        guard_pre: 0,
        guard_post: 0,
        levels,
    }
}

fn fast_config(len: usize, levels: usize) -> RebuildConfig {
    let mut c = RebuildConfig::new(spec(len, levels), filters::mip_map_fir(filters::MIP_MAP_FIR_LEN));
    c.debounce = Duration::from_millis(5);
    c.poll = Duration::from_millis(1);
    c
}

fn wait_for_builds(p: &MipRebuilder, n: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while p.build_count() < n {
        assert!(Instant::now() < deadline, "pipeline never built");
        thread::sleep(Duration::from_millis(1));
    }
}

fn build_mip(data: &[f32], levels: usize) -> Arc<mipwave::MipMap> {
    let fir = filters::mip_map_fir(filters::MIP_MAP_FIR_LEN);
    let mut b = MipMapBuilder::new(spec(data.len(), levels), &fir);
    b.fill(data);
    Arc::new(b.build())
}

fn rms(sig: &[f32]) -> f32 {
    (sig.iter().map(|v| v * v).sum::<f32>() / sig.len() as f32).sqrt()
}

#[test]
fn test_pipeline_feeds_voice_end_to_end() {
    init_tracing();
    let table: Vec<f32> = (0..8192).map(|i| (TAU * 0.03 * i as f32).sin()).collect();
    let pipeline = MipRebuilder::start(fast_config(8192, 8)).unwrap();
    pipeline.submit(&table).unwrap();
    pipeline.build_now().unwrap();
    wait_for_builds(&pipeline, 1);

    let mut voice = Resampler::new(InterpPack::shared());
    voice.set_sample(pipeline.published().unwrap());
    voice.set_pitch(0);
    voice.set_playback_pos(PlaybackPos::from_int(200));

    let mut out = vec![0.0f32; 2048];
    voice.produce_block(&mut out);
    let amp = rms(&out[256..]) / (0.5f32).sqrt();
    assert!((amp - 1.0).abs() < 1e-2, "unity playback amplitude {amp}");
}

#[test]
fn test_published_pyramid_never_partial_under_concurrent_commits() {
    init_tracing();
    let pipeline = Arc::new(MipRebuilder::start(fast_config(4096, 6)).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = pipeline.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut seen = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    if let Some(mip) = pipeline.published() {
                        // A published pyramid is always fully built.
                        assert_eq!(mip.level_count(), 6);
                        for level in 0..6 {
                            assert_eq!(mip.level_data(level).len(), mip.level_len(level) + mip.guard_pre() + mip.guard_post());
                        }
                        seen += 1;
                    }
                    thread::yield_now();
                }
                seen
            })
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..40 {
        let table: Vec<f32> = (0..4096).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
        pipeline.submit(&table).unwrap();
        thread::sleep(Duration::from_millis(2));
    }
    wait_for_builds(&pipeline, 1);

    stop.store(true, Ordering::Relaxed);
    for r in readers {
        assert!(r.join().unwrap() > 0, "reader never saw a pyramid");
    }
    assert!(pipeline.build_count() >= 1);
}

#[test]
fn test_voice_survives_repeated_hot_swaps() {
    init_tracing();
    let pipeline = Arc::new(MipRebuilder::start(fast_config(8192, 8)).unwrap());
    pipeline.submit(&vec![0.0; 8192]).unwrap();
    pipeline.build_now().unwrap();
    wait_for_builds(&pipeline, 1);

    let stop = Arc::new(AtomicBool::new(false));
    let audio = {
        let pipeline = pipeline.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut voice = Resampler::new(InterpPack::shared());
            voice.set_sample(pipeline.published().unwrap());
            voice.set_pitch(1 << BITS_PER_OCT);
            voice.set_playback_pos(PlaybackPos::from_int(100));
            let mut rng = StdRng::seed_from_u64(11);
            let mut out = vec![0.0f32; 64];

            while !stop.load(Ordering::Relaxed) {
                // Rebind whenever a newer pyramid was published.
                let published = pipeline.published().unwrap();
                let stale = voice
                    .sample()
                    .map_or(true, |cur| !Arc::ptr_eq(cur, &published));
                if stale {
                    voice.set_sample(published);
                }
                if rng.gen_bool(0.05) {
                    voice.set_pitch(rng.gen_range(-(1 << BITS_PER_OCT)..2 << BITS_PER_OCT));
                }
                if voice.playback_pos().int() > 6000 {
                    voice.set_playback_pos(PlaybackPos::from_int(100));
                    voice.clear_buffers();
                }
                voice.produce_block(&mut out);
                for v in &out {
                    assert!(v.is_finite() && v.abs() < 4.0, "runaway sample {v}");
                }
            }
        })
    };

    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..30 {
        let f = rng.gen_range(0.005..0.05);
        let table: Vec<f32> = (0..8192).map(|i| (TAU * f * i as f32).sin()).collect();
        pipeline.submit(&table).unwrap();
        pipeline.build_now().unwrap();
        thread::sleep(Duration::from_millis(3));
    }

    thread::sleep(Duration::from_millis(50));
    stop.store(true, Ordering::Relaxed);
    audio.join().expect("audio thread panicked");
}

#[test]
fn test_hot_swap_crossfades_between_tables() {
    // Two DC tables make the fade trajectory directly observable.
    let first = build_mip(&vec![0.25f32; 4096], 4);
    let second = build_mip(&vec![0.75f32; 4096], 4);

    let mut voice = Resampler::new(InterpPack::shared());
    voice.set_sample(first);
    voice.set_pitch(0);
    voice.set_playback_pos(PlaybackPos::from_int(100));
    let mut warm = vec![0.0f32; 512];
    voice.produce_block(&mut warm);
    assert!((warm[511] - 0.25).abs() < 1e-3);

    voice.set_sample(second);
    let mut fade = vec![0.0f32; FADE_LEN];
    voice.produce_block(&mut fade);
    for v in &fade {
        assert!(*v > 0.2 && *v < 0.8, "fade left source bounds: {v}");
    }

    let mut after = vec![0.0f32; 256];
    voice.produce_block(&mut after);
    assert!((after[255] - 0.75).abs() < 1e-3, "fade never settled: {}", after[255]);
}

#[test]
fn test_output_is_invariant_to_block_size() {
    let table: Vec<f32> = (0..8192).map(|i| (TAU * 0.02 * i as f32).sin()).collect();
    let mip = build_mip(&table, 6);

    let mut one = Resampler::new(InterpPack::shared());
    one.set_sample(mip.clone());
    one.set_pitch(9000);
    one.set_playback_pos(PlaybackPos::from_int(150));
    let mut whole = vec![0.0f32; 1024];
    one.produce_block(&mut whole);

    let mut many = Resampler::new(InterpPack::shared());
    many.set_sample(mip);
    many.set_pitch(9000);
    many.set_playback_pos(PlaybackPos::from_int(150));
    let mut pieces = vec![0.0f32; 1024];
    let mut done = 0;
    for chunk in [1usize, 7, 64, 100, 300, 552] {
        many.produce_block(&mut pieces[done..done + chunk]);
        done += chunk;
    }

    assert_eq!(whole, pieces, "block size changed the rendered audio");
}

#[test]
fn test_retired_pyramid_outlives_publish_while_fading() {
    let pipeline = MipRebuilder::start(fast_config(4096, 4)).unwrap();
    pipeline.submit(&vec![0.5; 4096]).unwrap();
    pipeline.build_now().unwrap();
    wait_for_builds(&pipeline, 1);
    let first = pipeline.published().unwrap();

    let mut voice = Resampler::new(InterpPack::shared());
    voice.set_sample(first.clone());
    voice.set_pitch(0);
    voice.set_playback_pos(PlaybackPos::from_int(64));
    let mut out = vec![0.0f32; 128];
    voice.produce_block(&mut out);

    pipeline.submit(&vec![-0.5; 4096]).unwrap();
    pipeline.build_now().unwrap();
    wait_for_builds(&pipeline, 2);
    voice.set_sample(pipeline.published().unwrap());
    drop(first); // the voice's fade-out slot keeps its own reference

    let mut fade = vec![0.0f32; FADE_LEN / 2];
    voice.produce_block(&mut fade);
    // Mid-fade output still draws on the retired table.
    assert!(fade[0] > 0.3, "retired content vanished early: {}", fade[0]);
}
