//! Gain-weighted mixing of capture sources into one mono stream.

use crate::audio::source::SourceKind;

/// Result of mixing one cycle's worth of source buffers.
#[derive(Debug, Clone, Default)]
pub struct MixOutput {
    /// Mixed mono samples, clamped to [-1, 1].
    pub samples: Vec<f32>,
    /// Post-gain energy contributed by the primary source.
    pub primary_energy: f32,
    /// Post-gain energy contributed by the secondary source.
    pub secondary_energy: f32,
}

impl MixOutput {
    /// True when the secondary source carried most of the mixed energy.
    pub fn secondary_dominant(&self) -> bool {
        self.secondary_energy > self.primary_energy && self.secondary_energy > 0.0
    }
}

/// Mixes N source buffers into mono with independent per-source gains.
#[derive(Debug, Clone)]
pub struct Mixer {
    primary_gain: f32,
    secondary_gain: f32,
}

impl Mixer {
    pub fn new(primary_gain: f32, secondary_gain: f32) -> Self {
        Self {
            primary_gain,
            secondary_gain,
        }
    }

    fn gain_for(&self, kind: SourceKind) -> f32 {
        match kind {
            SourceKind::Primary => self.primary_gain,
            SourceKind::Secondary => self.secondary_gain,
        }
    }

    /// Sums gain-weighted buffers sample-by-sample.
    ///
    /// Buffers may have unequal lengths (sources drain independently); the
    /// output spans the longest one, shorter sources simply fall silent.
    pub fn mix(&self, inputs: &[(SourceKind, Vec<f32>)]) -> MixOutput {
        let len = inputs.iter().map(|(_, buf)| buf.len()).max().unwrap_or(0);
        let mut samples = vec![0.0f32; len];
        let mut primary_energy = 0.0f32;
        let mut secondary_energy = 0.0f32;

        for (kind, buffer) in inputs {
            let gain = self.gain_for(*kind);
            if gain == 0.0 {
                continue;
            }
            let mut energy = 0.0f32;
            for (i, &sample) in buffer.iter().enumerate() {
                let weighted = sample * gain;
                samples[i] += weighted;
                energy += weighted * weighted;
            }
            match kind {
                SourceKind::Primary => primary_energy += energy,
                SourceKind::Secondary => secondary_energy += energy,
            }
        }

        for sample in &mut samples {
            *sample = sample.clamp(-1.0, 1.0);
        }

        MixOutput {
            samples,
            primary_energy,
            secondary_energy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_source_applies_gain() {
        let mixer = Mixer::new(0.5, 0.6);
        let out = mixer.mix(&[(SourceKind::Primary, vec![1.0, -1.0, 0.4])]);
        assert_eq!(out.samples, vec![0.5, -0.5, 0.2]);
        assert!(out.primary_energy > 0.0);
        assert_eq!(out.secondary_energy, 0.0);
    }

    #[test]
    fn two_sources_sum_with_weights() {
        let mixer = Mixer::new(1.0, 0.5);
        let out = mixer.mix(&[
            (SourceKind::Primary, vec![0.2, 0.2]),
            (SourceKind::Secondary, vec![0.4, 0.4]),
        ]);
        assert!((out.samples[0] - 0.4).abs() < 1e-6);
        assert!((out.samples[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn unequal_lengths_pad_with_silence() {
        let mixer = Mixer::new(1.0, 1.0);
        let out = mixer.mix(&[
            (SourceKind::Primary, vec![0.1, 0.1, 0.1]),
            (SourceKind::Secondary, vec![0.2]),
        ]);
        assert_eq!(out.samples.len(), 3);
        assert!((out.samples[0] - 0.3).abs() < 1e-6);
        assert!((out.samples[2] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn output_is_clamped() {
        let mixer = Mixer::new(1.0, 1.0);
        let out = mixer.mix(&[
            (SourceKind::Primary, vec![0.9]),
            (SourceKind::Secondary, vec![0.9]),
        ]);
        assert_eq!(out.samples, vec![1.0]);
    }

    #[test]
    fn no_sources_yields_empty_mix() {
        let mixer = Mixer::new(1.0, 0.6);
        let out = mixer.mix(&[]);
        assert!(out.samples.is_empty());
        assert!(!out.secondary_dominant());
    }

    #[test]
    fn secondary_dominance_detected() {
        let mixer = Mixer::new(1.0, 1.0);
        let out = mixer.mix(&[
            (SourceKind::Primary, vec![0.01; 100]),
            (SourceKind::Secondary, vec![0.5; 100]),
        ]);
        assert!(out.secondary_dominant());
    }

    #[test]
    fn zero_gain_source_contributes_nothing() {
        let mixer = Mixer::new(1.0, 0.0);
        let out = mixer.mix(&[
            (SourceKind::Primary, vec![0.1]),
            (SourceKind::Secondary, vec![0.9]),
        ]);
        assert!((out.samples[0] - 0.1).abs() < 1e-6);
        assert_eq!(out.secondary_energy, 0.0);
    }
}
