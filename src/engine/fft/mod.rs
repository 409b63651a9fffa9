use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Accumulates mono samples into fixed-size analysis windows and emits a
/// linear magnitude spectrum each time a window fills.
///
/// All buffers are allocated up front; feeding samples does not allocate.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    buffer: Vec<f32>,
    filled: usize,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    sample_rate: u32,
}

impl SpectrumAnalyzer {
    /// `fft_size` must be a power of two (validated by the engine config).
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            window: hann_window(fft_size),
            buffer: vec![0.0; fft_size],
            filled: 0,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0.0; fft_size / 2],
            sample_rate: 0,
        }
    }

    /// Feeds mono samples, invoking `on_spectrum` with `fft_size / 2`
    /// magnitudes for every completed window. A sample-rate change drops
    /// the partial window, since its samples no longer share a timebase.
    pub fn push_samples(
        &mut self,
        sample_rate: u32,
        samples: &[f32],
        mut on_spectrum: impl FnMut(&[f32]),
    ) {
        if sample_rate != self.sample_rate {
            if self.sample_rate != 0 {
                log::debug!(
                    "input rate changed {} Hz -> {} Hz, dropping partial window",
                    self.sample_rate,
                    sample_rate
                );
            }
            self.sample_rate = sample_rate;
            self.filled = 0;
        }

        for &sample in samples {
            self.buffer[self.filled] = sample;
            self.filled += 1;
            if self.filled == self.fft_size {
                self.compute_magnitudes();
                self.filled = 0;
                on_spectrum(&self.magnitudes);
            }
        }
    }

    /// Discards the partial window.
    pub fn reset(&mut self) {
        self.filled = 0;
    }

    fn compute_magnitudes(&mut self) {
        for i in 0..self.fft_size {
            self.scratch[i] = Complex::new(self.buffer[i] * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(self.scratch.iter()) {
            *magnitude = bin.norm();
        }
    }
}

/// Averages interleaved frames down to mono, appending to `out`.
/// A trailing incomplete frame is ignored.
pub fn mix_to_mono(interleaved: &[f32], channel_count: usize, out: &mut Vec<f32>) {
    if channel_count <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks_exact(channel_count) {
        out.push(frame.iter().sum::<f32>() / channel_count as f32);
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44_100;

    fn sine(freq: f32, count: usize) -> Vec<f32> {
        (0..count)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    #[test]
    fn emits_one_spectrum_per_full_window() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mut windows = 0;
        analyzer.push_samples(RATE, &vec![0.1; 256 * 3 + 100], |_| windows += 1);
        assert_eq!(windows, 3);

        // The leftover 100 samples complete on the next call.
        analyzer.push_samples(RATE, &vec![0.1; 156], |_| windows += 1);
        assert_eq!(windows, 4);
    }

    #[test]
    fn spectrum_has_half_window_bins() {
        let mut analyzer = SpectrumAnalyzer::new(512);
        let mut len = 0;
        analyzer.push_samples(RATE, &vec![0.0; 512], |spectrum| len = spectrum.len());
        assert_eq!(len, 256);
    }

    #[test]
    fn bin_aligned_tone_peaks_at_its_bin() {
        let size = 1024;
        let bin = 64;
        let freq = bin as f32 * RATE as f32 / size as f32;

        let mut analyzer = SpectrumAnalyzer::new(size);
        let mut peak = 0;
        analyzer.push_samples(RATE, &sine(freq, size), |spectrum| {
            peak = spectrum
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
        });
        assert_eq!(peak, bin);
    }

    #[test]
    fn silence_yields_near_zero_magnitudes() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mut max = f32::MAX;
        analyzer.push_samples(RATE, &vec![0.0; 256], |spectrum| {
            max = spectrum.iter().cloned().fold(0.0, f32::max);
        });
        assert!(max < 1e-6);
    }

    #[test]
    fn rate_change_drops_partial_window() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mut windows = 0;
        analyzer.push_samples(44_100, &vec![0.1; 200], |_| windows += 1);
        // 200 samples buffered; the rate change discards them.
        analyzer.push_samples(48_000, &vec![0.1; 200], |_| windows += 1);
        assert_eq!(windows, 0);
        analyzer.push_samples(48_000, &vec![0.1; 56], |_| windows += 1);
        assert_eq!(windows, 1);
    }

    #[test]
    fn reset_discards_partial_window() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mut windows = 0;
        analyzer.push_samples(RATE, &vec![0.1; 255], |_| windows += 1);
        analyzer.reset();
        analyzer.push_samples(RATE, &vec![0.1; 255], |_| windows += 1);
        assert_eq!(windows, 0);
    }

    #[test]
    fn stereo_mixdown_averages_channel_pairs() {
        let mut mono = Vec::new();
        mix_to_mono(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut mono);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn mono_input_passes_through() {
        let mut mono = Vec::new();
        mix_to_mono(&[0.1, 0.2, 0.3], 1, &mut mono);
        assert_eq!(mono, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn trailing_partial_frame_is_ignored() {
        let mut mono = Vec::new();
        mix_to_mono(&[1.0, 1.0, 0.2], 2, &mut mono);
        assert_eq!(mono, vec![1.0]);
    }
}
