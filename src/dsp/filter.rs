// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz};

const MIN_CUTOFF_HZ: f32 = 10.0;
const MIN_Q: f32 = 0.1;

/// One channel of a resonant low-pass filter.
///
/// Coefficients are recomputed once per chunk by the voice; the filter keeps its
/// previous coefficients if a requested setting cannot be realized.
pub struct ResonantLowPass {
    filter: DirectForm2Transposed<f32>,
    sample_rate: f32,
    cutoff: f32,
    resonance: f32,
}

impl ResonantLowPass {
    pub fn new(sample_rate: f32) -> Self {
        // Pass-through until the first parameter update.
        let identity = Coefficients {
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        };
        Self {
            filter: DirectForm2Transposed::<f32>::new(identity),
            sample_rate,
            cutoff: 0.0,
            resonance: 0.0,
        }
    }

    /// Sets the cutoff in Hz and the resonance as a linear Q.
    pub fn set_parameters(&mut self, cutoff: f32, resonance: f32) {
        let nyquist_limit = self.sample_rate * 0.49;
        let cutoff = if cutoff.is_finite() {
            cutoff.clamp(MIN_CUTOFF_HZ, nyquist_limit.max(MIN_CUTOFF_HZ))
        } else {
            nyquist_limit
        };
        let resonance = resonance.max(MIN_Q);

        if cutoff == self.cutoff && resonance == self.resonance {
            return;
        }

        if let Ok(coefficients) = Coefficients::<f32>::from_params(
            biquad::Type::LowPass,
            self.sample_rate.hz(),
            cutoff.hz(),
            resonance,
        ) {
            self.filter.update_coefficients(coefficients);
            self.cutoff = cutoff;
            self.resonance = resonance;
        }
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.filter.run(input)
    }

    pub fn reset(&mut self) {
        self.filter.reset_state();
    }
}

impl std::fmt::Debug for ResonantLowPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResonantLowPass")
            .field("sample_rate", &self.sample_rate)
            .field("cutoff", &self.cutoff)
            .field("resonance", &self.resonance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_before_configured() {
        let mut filter = ResonantLowPass::new(44100.0);
        assert_eq!(filter.process(0.5), 0.5);
    }

    #[test]
    fn test_attenuates_high_frequencies() {
        let sample_rate = 44100.0;
        let mut filter = ResonantLowPass::new(sample_rate);
        filter.set_parameters(200.0, 0.707);

        // Alternating samples sit at Nyquist.
        let mut peak: f32 = 0.0;
        for i in 0..4410 {
            let input = if i % 2 == 0 { 1.0 } else { -1.0 };
            let output = filter.process(input);
            if i > 2000 {
                peak = peak.max(output.abs());
            }
        }
        assert!(peak < 0.01, "peak was {}", peak);
    }

    #[test]
    fn test_cutoff_is_clamped() {
        let mut filter = ResonantLowPass::new(1000.0);
        filter.set_parameters(1_000_000.0, 0.0);
        assert!((filter.cutoff() - 490.0).abs() < 1e-3);

        filter.set_parameters(-5.0, 0.5);
        assert_eq!(filter.cutoff(), MIN_CUTOFF_HZ);

        filter.set_parameters(f32::NAN, 0.5);
        assert!((filter.cutoff() - 490.0).abs() < 1e-3);
    }
}
