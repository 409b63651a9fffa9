use crate::engine::error::VizError;
use crate::engine::spectral::bands;

/// Configuration for the visualizer engine.
///
/// All values are fixed for the lifetime of the engine; there is no
/// runtime reconfiguration beyond the enable/disable toggle.
#[derive(Debug, Clone)]
pub struct VizConfig {
    /// Analysis window length in mono samples. Must be a power of two.
    pub fft_size: usize,
    /// Maximum number of spectrum slots handed to energy sinks. Frames
    /// shorter than this are delivered truncated, never padded.
    pub spectrum_capacity: usize,
    /// Scale applied to each clamped magnitude before fan-out.
    pub gain: f32,
    /// Exponential smoothing factor for band loudness, 0.0 (none) to
    /// just under 1.0 (heavy).
    pub band_smoothing: f32,
    /// Capacity of the tap-to-analysis ring buffer, in mono samples.
    pub buffer_capacity: usize,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            spectrum_capacity: 4096,
            gain: 2.0,
            band_smoothing: bands::DEFAULT_SMOOTHING,
            buffer_capacity: 44_100,
        }
    }
}

impl VizConfig {
    pub(crate) fn validate(&self) -> Result<(), VizError> {
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(VizError::InvalidConfig(format!(
                "fft_size must be a nonzero power of two, got {}",
                self.fft_size
            )));
        }
        if self.buffer_capacity < self.fft_size {
            return Err(VizError::InvalidConfig(format!(
                "buffer_capacity ({}) must hold at least one analysis window ({})",
                self.buffer_capacity, self.fft_size
            )));
        }
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(VizError::InvalidConfig(format!(
                "gain must be finite and non-negative, got {}",
                self.gain
            )));
        }
        if !(0.0..1.0).contains(&self.band_smoothing) {
            return Err(VizError::InvalidConfig(format!(
                "band_smoothing must be in [0, 1), got {}",
                self.band_smoothing
            )));
        }
        Ok(())
    }
}
