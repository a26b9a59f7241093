//! Setup-time filter coefficient design.
//!
//! Everything here runs once, when a pyramid builder or interpolation pack is
//! created. Nothing in this module is called from the audio path.

use std::f64::consts::PI;

/// Default tap count for the mip-map half-band FIR.
pub const MIP_MAP_FIR_LEN: usize = 81;

/// Number of coefficients of the polyphase half-band IIR.
pub const HALFBAND_NBR_COEFS: usize = 7;

/// Default transition bandwidth for [`halfband_coefs`], as a fraction of the
/// input sample rate.
pub const HALFBAND_TRANSITION: f64 = 0.01;

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// 4-term Blackman-Harris window, evaluated at `n` of `len` points.
fn blackman_harris(n: usize, len: usize) -> f64 {
    let x = 2.0 * PI * n as f64 / (len - 1) as f64;
    0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos() - 0.01168 * (3.0 * x).cos()
}

/// Odd-length, centered, symmetric half-band FIR for 2x decimation
/// (windowed sinc, cutoff at a quarter of the input rate, DC gain 1).
///
/// This is the kernel the pyramid builder applies between mip levels.
pub fn mip_map_fir(taps: usize) -> Vec<f64> {
    assert!(taps % 2 == 1, "half-band FIR length must be odd");
    let half = (taps - 1) / 2;
    let mut h: Vec<f64> = (0..taps)
        .map(|i| {
            let t = i as f64 - half as f64;
            0.5 * sinc(0.5 * t) * blackman_harris(i, taps)
        })
        .collect();
    let sum: f64 = h.iter().sum();
    for v in h.iter_mut() {
        *v /= sum;
    }
    h
}

/// Fractional-delay interpolation impulse: the continuous windowed-sinc
/// kernel sampled at `phases` points per tap interval.
///
/// The table is centered, `fir_len * phases` entries long. `cutoff` is in
/// cycles per source sample (1.0 = full band); `gain` scales the whole
/// kernel.
pub fn interp_impulse(fir_len: usize, phases: usize, cutoff: f64, gain: f64) -> Vec<f64> {
    assert!(fir_len % 2 == 0, "tap count must be even");
    assert!(phases.is_power_of_two());
    let len = fir_len * phases;
    (0..len)
        .map(|i| {
            let t = (i as f64 - (len / 2) as f64) / phases as f64;
            gain * cutoff * sinc(cutoff * t) * blackman_harris(i, len)
        })
        .collect()
}

/// All-pass coefficients for an `n`-stage polyphase half-band IIR, strictly
/// ascending within (0, 1).
///
/// Classic minimax design through the elliptic q-series: the transition
/// parameter is the width of the band around a quarter of the input rate, as
/// a fraction of that rate.
pub fn halfband_coefs(n: usize, transition: f64) -> Vec<f64> {
    assert!(n > 0);
    assert!(transition > 0.0 && transition < 0.25);

    let mut k = ((1.0 - transition * 4.0) * PI / 4.0).tan();
    k *= k;
    let kksqrt = (1.0 - k * k).powf(0.25);
    let e = 0.5 * (1.0 - kksqrt) / (1.0 + kksqrt);
    let e2 = e * e;
    let e4 = e2 * e2;
    let q = e * (1.0 + e4 * (2.0 + e4 * (15.0 + 150.0 * e4)));

    let order = n * 2 + 1;
    (0..n)
        .map(|index| {
            let c = (index + 1) as f64;
            let num = acc_num(q, order, c) * q.powf(0.25);
            let den = acc_den(q, order, c) + 0.5;
            let ww = num / den;
            let wwsq = ww * ww;
            let x = ((1.0 - wwsq * k) * (1.0 - wwsq / k)).sqrt() / (1.0 + wwsq);
            (1.0 - x) / (1.0 + x)
        })
        .collect()
}

fn acc_num(q: f64, order: usize, c: f64) -> f64 {
    let mut acc = 0.0;
    let mut sign = 1.0;
    for i in 0.. {
        let term = q.powi((i * (i + 1)) as i32)
            * ((i * 2 + 1) as f64 * c * PI / order as f64).sin()
            * sign;
        acc += term;
        if term.abs() < 1e-100 {
            break;
        }
        sign = -sign;
    }
    acc
}

fn acc_den(q: f64, order: usize, c: f64) -> f64 {
    let mut acc = 0.0;
    let mut sign = -1.0;
    for i in 1.. {
        let term = q.powi((i * i) as i32) * ((i * 2) as f64 * c * PI / order as f64).cos() * sign;
        acc += term;
        if term.abs() < 1e-100 {
            break;
        }
        sign = -sign;
    }
    acc
}
