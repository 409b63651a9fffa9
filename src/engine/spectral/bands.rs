/// Standard 1/3-octave band centers, 20 Hz to 20 kHz.
pub const FREQUENCY_BANDS: [f32; BAND_COUNT] = [
    20.0, 25.0, 32.0, 40.0, 50.0, 63.0, 80.0, 100.0, 125.0, 160.0, 200.0, 250.0, 315.0, 400.0,
    500.0, 630.0, 800.0, 1000.0, 1250.0, 1600.0, 2000.0, 2500.0, 3150.0, 4000.0, 5000.0, 6300.0,
    8000.0, 10000.0, 12500.0, 16000.0, 20000.0,
];

pub const BAND_COUNT: usize = 31;

pub const DEFAULT_SMOOTHING: f32 = 0.7;

const MIN_DB: f32 = -60.0;
const MAX_DB: f32 = 0.0;

// Edges for the outermost bands, where no neighbor exists to take a
// geometric mean with.
const LOW_EDGE_HZ: f32 = 16.0;
const HIGH_EDGE_HZ: f32 = 22_000.0;

/// Folds a linear magnitude spectrum into 31 per-band loudness values,
/// normalized to 0.0..=1.0 over a -60..0 dB range.
pub struct BandMapper {
    fft_size: usize,
}

impl BandMapper {
    pub fn new(fft_size: usize) -> Self {
        Self { fft_size }
    }

    pub fn map(&self, magnitudes: &[f32], sample_rate: u32) -> [f32; BAND_COUNT] {
        let mut levels = [0.0f32; BAND_COUNT];
        if magnitudes.is_empty() || sample_rate == 0 {
            return levels;
        }

        let resolution = sample_rate as f32 / self.fft_size as f32;

        for (band, level) in levels.iter_mut().enumerate() {
            let center = FREQUENCY_BANDS[band];
            // Band edges sit at the geometric mean of neighboring centers.
            let low = if band == 0 {
                LOW_EDGE_HZ
            } else {
                (center * FREQUENCY_BANDS[band - 1]).sqrt()
            };
            let high = if band == BAND_COUNT - 1 {
                HIGH_EDGE_HZ
            } else {
                (center * FREQUENCY_BANDS[band + 1]).sqrt()
            };

            let low_bin = ((low / resolution) as usize).min(magnitudes.len() - 1);
            let high_bin = ((high / resolution) as usize).min(magnitudes.len() - 1);

            let mut sum = 0.0f32;
            let mut count = 0usize;
            for &magnitude in &magnitudes[low_bin..=high_bin] {
                sum += magnitude;
                count += 1;
            }
            let average = if count > 0 { sum / count as f32 } else { 0.0 };

            let db = if average > 0.0 {
                20.0 * average.log10()
            } else {
                MIN_DB
            };
            *level = ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0);
        }

        levels
    }
}

/// Exponential smoothing across analysis windows so band meters decay
/// instead of flickering.
pub struct BandSmoother {
    factor: f32,
    state: [f32; BAND_COUNT],
}

impl BandSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            state: [0.0; BAND_COUNT],
        }
    }

    pub fn smooth(&mut self, levels: &[f32; BAND_COUNT]) -> [f32; BAND_COUNT] {
        for (state, &level) in self.state.iter_mut().zip(levels.iter()) {
            *state = *state * self.factor + level * (1.0 - self.factor);
        }
        self.state
    }

    pub fn reset(&mut self) {
        self.state = [0.0; BAND_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_maps_to_zero() {
        let mapper = BandMapper::new(1024);
        let levels = mapper.map(&[0.0; 512], 44_100);
        assert!(levels.iter().all(|&l| l == 0.0));
    }

    #[test]
    fn full_scale_spectrum_saturates_bands() {
        let mapper = BandMapper::new(1024);
        // Magnitude 1.0 in every bin is 0 dB, the top of the range.
        let levels = mapper.map(&[1.0; 512], 44_100);
        assert!(levels.iter().all(|&l| (l - 1.0).abs() < 1e-6));
    }

    #[test]
    fn levels_stay_in_unit_range() {
        let mapper = BandMapper::new(1024);
        let magnitudes: Vec<f32> = (0..512).map(|i| (i as f32 * 0.11).sin().abs() * 40.0).collect();
        let levels = mapper.map(&magnitudes, 48_000);
        assert!(levels.iter().all(|&l| (0.0..=1.0).contains(&l)));
    }

    #[test]
    fn empty_spectrum_is_silent() {
        let mapper = BandMapper::new(1024);
        let levels = mapper.map(&[], 44_100);
        assert!(levels.iter().all(|&l| l == 0.0));
    }

    #[test]
    fn low_band_reacts_to_low_frequency_energy() {
        let mapper = BandMapper::new(1024);
        let mut magnitudes = vec![0.0f32; 512];
        // ~43 Hz per bin at 44.1 kHz, so bins 0 and 1 cover the bottom bands.
        magnitudes[0] = 1.0;
        magnitudes[1] = 1.0;
        let levels = mapper.map(&magnitudes, 44_100);
        assert!(levels[..5].iter().any(|&l| l > 0.0));
        assert!(levels[BAND_COUNT - 1] == 0.0);
    }

    #[test]
    fn smoother_converges_toward_input() {
        let mut smoother = BandSmoother::new(0.5);
        let target = [1.0f32; BAND_COUNT];
        let mut current = [0.0f32; BAND_COUNT];
        for _ in 0..20 {
            current = smoother.smooth(&target);
        }
        assert!(current.iter().all(|&l| l > 0.99));

        smoother.reset();
        let after_reset = smoother.smooth(&[0.0; BAND_COUNT]);
        assert!(after_reset.iter().all(|&l| l == 0.0));
    }
}
