//! Clamped, never-repeating perturbation for dynamic fingerprint surfaces.
//!
//! Hash-based fingerprinting caches a digest of canvas pixels or audio
//! samples and compares it across visits. The generator here defeats that
//! by guaranteeing that two reads of an unchanged source never produce a
//! bit-identical output, while every channel stays within a small bounded
//! delta of the original so the perceptual difference is invisible.
//!
//! The in-page JS wrappers apply the same scheme; this is the reference
//! model, used by the mock context and by the numeric-bound tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Stateful noise source scoped to one browsing context.
#[derive(Debug)]
pub struct NoiseGenerator {
    amplitude: u8,
    reads: u64,
    last_digest: Option<u64>,
    rng: StdRng,
}

impl NoiseGenerator {
    /// Generator with entropy-derived state and the given per-channel
    /// amplitude bound.
    pub fn new(amplitude: u8) -> Self {
        Self::seeded(amplitude, rand::random())
    }

    /// Deterministic generator for reproducible tests.
    pub fn seeded(amplitude: u8, seed: u64) -> Self {
        Self {
            amplitude,
            reads: 0,
            last_digest: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn amplitude(&self) -> u8 {
        self.amplitude
    }

    /// Number of perturbed reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Perturbs a pixel buffer in place.
    ///
    /// Every channel moves by at most `amplitude` and stays in 0..=255.
    /// If the perturbed buffer happens to collide with the previous read's
    /// output, one channel is nudged by a single step chosen so the total
    /// delta still respects the amplitude bound.
    pub fn perturb_pixels(&mut self, pixels: &mut [u8]) {
        if pixels.is_empty() {
            return;
        }
        self.reads = self.reads.wrapping_add(1);
        let amp = i16::from(self.amplitude);

        let mut deltas = vec![0i16; pixels.len()];
        for (px, delta) in pixels.iter_mut().zip(deltas.iter_mut()) {
            let d = self.rng.gen_range(-amp..=amp);
            let original = i16::from(*px);
            let value = (original + d).clamp(0, 255);
            *delta = value - original;
            *px = value as u8;
        }

        let digest = digest_bytes(pixels);
        if Some(digest) == self.last_digest {
            let idx = (self.reads as usize) % pixels.len();
            if deltas[idx] >= amp {
                pixels[idx] -= 1;
            } else if deltas[idx] <= -amp {
                pixels[idx] += 1;
            } else if pixels[idx] == u8::MAX {
                pixels[idx] -= 1;
            } else {
                pixels[idx] += 1;
            }
        }
        self.last_digest = Some(digest_bytes(pixels));
    }

    /// Perturbs audio samples in place with the given amplitude, clamped
    /// to the legal [-1, 1] sample range.
    ///
    /// The repeat guard moves one sample by half the amplitude, in the
    /// direction that keeps that sample's total delta within the bound.
    pub fn perturb_samples(&mut self, samples: &mut [f32], amplitude: f64) {
        if samples.is_empty() {
            return;
        }
        self.reads = self.reads.wrapping_add(1);
        let amp = amplitude as f32;
        let step = amp * 0.5;
        let idx = (self.reads as usize) % samples.len();

        let mut delta_at_idx = 0.0f32;
        for (i, sample) in samples.iter_mut().enumerate() {
            let d = self.rng.gen_range(-amp..=amp);
            let value = (*sample + d).clamp(-1.0, 1.0);
            if i == idx {
                delta_at_idx = value - *sample;
            }
            *sample = value;
        }

        let digest = digest_samples(samples);
        if Some(digest) == self.last_digest {
            if delta_at_idx >= step || samples[idx] + step > 1.0 {
                samples[idx] -= step;
            } else {
                samples[idx] += step;
            }
        }
        self.last_digest = Some(digest_samples(samples));
    }
}

fn digest_bytes(bytes: &[u8]) -> u64 {
    // FNV-1a; cheap and collision-free enough for the repeat guard.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn digest_samples(samples: &[f32]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &s in samples {
        hash ^= u64::from(s.to_bits());
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
