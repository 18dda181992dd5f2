// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-place iterative radix-2 FFT and the Blackman-Harris window shared by
//! the spectrum engine and the FIR designer.

use std::f64::consts::PI;

use num_complex::Complex;

use crate::error::DspError;

const BH_A0: f64 = 0.35875;
const BH_A1: f64 = 0.48829;
const BH_A2: f64 = 0.14128;
const BH_A3: f64 = 0.01168;

/// Symmetric 4-term Blackman-Harris window of `len` points.
pub fn blackman_harris(len: usize) -> Vec<f64> {
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let m = (len - 1) as f64;
            (0..len)
                .map(|i| {
                    let x = 2.0 * PI * i as f64 / m;
                    BH_A0 - BH_A1 * x.cos() + BH_A2 * (2.0 * x).cos() - BH_A3 * (3.0 * x).cos()
                })
                .collect()
        }
    }
}

/// Forward decimation-in-time FFT of a fixed power-of-two size.
#[derive(Debug, Clone)]
pub struct Fft {
    size: usize,
    log2: u32,
    /// `exp(-2πik/N)` for `k in 0..N/2`.
    twiddles: Vec<Complex<f32>>,
}

impl Fft {
    pub fn new(size: usize) -> Result<Self, DspError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(DspError::FftSize(size));
        }
        let twiddles = (0..size / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / size as f64;
                Complex::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        Ok(Self {
            size,
            log2: size.trailing_zeros(),
            twiddles,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Transform `buf` in place. `buf.len()` must equal [`Fft::size`].
    pub fn process(&self, buf: &mut [Complex<f32>]) {
        debug_assert_eq!(buf.len(), self.size, "FFT buffer length mismatch");
        let n = self.size;
        if n < 2 {
            return;
        }

        // Bit-reversal permutation.
        let shift = usize::BITS - self.log2;
        for i in 0..n {
            let j = i.reverse_bits() >> shift;
            if j > i {
                buf.swap(i, j);
            }
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let stride = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let w = self.twiddles[k * stride];
                    let a = buf[start + k];
                    let b = buf[start + k + half] * w;
                    buf[start + k] = a + b;
                    buf[start + k + half] = a - b;
                }
            }
            len <<= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn assert_approx_eq(a: f32, b: f32, tol: f32, label: &str) {
        assert!(
            (a - b).abs() <= tol,
            "{}: expected {} ≈ {} (tol {})",
            label,
            a,
            b,
            tol
        );
    }

    fn pseudo_random(len: usize) -> Vec<Complex<f32>> {
        let mut state = 0x1234_5678_u32;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
        };
        (0..len).map(|_| Complex::new(next(), next())).collect()
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert_eq!(Fft::new(0).unwrap_err(), DspError::FftSize(0));
        assert_eq!(Fft::new(1000).unwrap_err(), DspError::FftSize(1000));
        assert!(Fft::new(1).is_ok());
        assert!(Fft::new(2048).is_ok());
    }

    #[test]
    fn impulse_gives_flat_spectrum() {
        let fft = Fft::new(16).unwrap();
        let mut buf = vec![Complex::new(0.0_f32, 0.0); 16];
        buf[0] = Complex::new(1.0, 0.0);
        fft.process(&mut buf);
        for (idx, bin) in buf.iter().enumerate() {
            assert_approx_eq(bin.re, 1.0, 1e-6, &format!("bin {idx} re"));
            assert_approx_eq(bin.im, 0.0, 1e-6, &format!("bin {idx} im"));
        }
    }

    #[test]
    fn matches_reference_transform() {
        for &size in &[2usize, 8, 64, 1024] {
            let input = pseudo_random(size);

            let mut ours = input.clone();
            Fft::new(size).unwrap().process(&mut ours);

            let mut reference: Vec<rustfft::num_complex::Complex<f32>> = input
                .iter()
                .map(|c| rustfft::num_complex::Complex::new(c.re, c.im))
                .collect();
            FftPlanner::<f32>::new()
                .plan_fft_forward(size)
                .process(&mut reference);

            let tol = 1e-4 * size as f32;
            for (idx, (a, b)) in ours.iter().zip(reference.iter()).enumerate() {
                assert_approx_eq(a.re, b.re, tol, &format!("n={size} bin {idx} re"));
                assert_approx_eq(a.im, b.im, tol, &format!("n={size} bin {idx} im"));
            }
        }
    }

    #[test]
    fn blackman_harris_is_symmetric_and_peaks_at_centre() {
        let w = blackman_harris(33);
        assert_eq!(w.len(), 33);
        for i in 0..w.len() {
            assert!((w[i] - w[w.len() - 1 - i]).abs() < 1e-12, "asymmetric at {i}");
        }
        assert!((w[16] - 1.0).abs() < 1e-9);
        assert!(w[0] < 1e-4);
        assert_eq!(blackman_harris(1), vec![1.0]);
        assert!(blackman_harris(0).is_empty());
    }
}
