use serde::{Deserialize, Serialize};

use crate::AudioArc;

/// Number of buckets computed for an uploaded asset.
pub const DEFAULT_PEAK_COUNT: usize = 200;

/// Downsampled amplitude envelope used to draw a waveform without decoding the asset.
///
/// Each value is the maximum absolute sample magnitude of one equal-duration bucket of
/// the first channel, clamped to `[0, 1]` and rounded to three decimals. The envelope is
/// computed once at upload and never re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct PeakEnvelope {
    peaks: Vec<f32>,
}

impl PeakEnvelope {
    /// Build an envelope from the first channel of decoded audio.
    ///
    /// ```
    /// use bandhub_transport::{AudioArc, PeakEnvelope};
    ///
    /// let audio = AudioArc::new(vec![0.5, -1.0, 0.25, 0.0], 8000, 2);
    /// let envelope = PeakEnvelope::from_audio_arc(&audio, 2);
    /// assert_eq!(envelope.peaks(), &[0.5, 0.25]);
    /// ```
    pub fn from_audio_arc(audio: &AudioArc, count: usize) -> Self {
        let first_channel: Vec<f32> = if audio.is_empty() {
            Vec::new()
        } else {
            audio.channel(0).collect()
        };
        Self::from_mono(&first_channel, count)
    }

    /// Build an envelope from mono samples.
    ///
    /// Bucket `i` covers `[i * len / count, (i + 1) * len / count)`, so every sample lands in
    /// exactly one bucket. Buckets that receive no samples (input shorter than `count`) are 0.
    pub fn from_mono(samples: &[f32], count: usize) -> Self {
        let len = samples.len();
        let mut peaks = Vec::with_capacity(count);

        for bucket in 0..count {
            let start = bucket * len / count;
            let end = (bucket + 1) * len / count;

            let max = samples[start..end]
                .iter()
                .filter(|s| s.is_finite())
                .fold(0.0f32, |acc, s| acc.max(s.abs()));

            peaks.push(round_peak(max));
        }

        Self { peaks }
    }

    pub fn peaks(&self) -> &[f32] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Peak value under a relative position in `[0, 1]` of the asset.
    pub fn peak_at(&self, relative: f64) -> Option<f32> {
        if self.peaks.is_empty() || !relative.is_finite() {
            return None;
        }
        let relative = relative.clamp(0.0, 1.0);
        let index = ((relative * self.peaks.len() as f64) as usize).min(self.peaks.len() - 1);
        Some(self.peaks[index])
    }
}

fn round_peak(value: f32) -> f32 {
    (value.min(1.0) * 1000.0).round() / 1000.0
}

impl TryFrom<Vec<f32>> for PeakEnvelope {
    type Error = String;

    fn try_from(peaks: Vec<f32>) -> Result<Self, Self::Error> {
        if let Some(bad) = peaks
            .iter()
            .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
        {
            return Err(format!("peak value {bad} is outside [0, 1]"));
        }
        Ok(Self { peaks })
    }
}

impl From<PeakEnvelope> for Vec<f32> {
    fn from(envelope: PeakEnvelope) -> Self {
        envelope.peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_has_requested_length() {
        let samples: Vec<f32> = (0..10_000).map(|i| ((i as f32) * 0.01).sin()).collect();
        let envelope = PeakEnvelope::from_mono(&samples, DEFAULT_PEAK_COUNT);

        assert_eq!(envelope.len(), DEFAULT_PEAK_COUNT);
        assert!(envelope.peaks().iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_envelope_uses_first_channel_only() {
        // Left is quiet, right is loud
        let audio = AudioArc::new(vec![0.1, 0.9, -0.2, -0.9, 0.1, 0.9, 0.05, 0.9], 8000, 2);
        let envelope = PeakEnvelope::from_audio_arc(&audio, 2);

        assert_eq!(envelope.peaks(), &[0.2, 0.1]);
    }

    #[test]
    fn test_envelope_rounds_to_three_decimals() {
        let envelope = PeakEnvelope::from_mono(&[0.123456, -0.98765], 2);
        assert_eq!(envelope.peaks(), &[0.123, 0.988]);
    }

    #[test]
    fn test_envelope_clamps_overs() {
        let envelope = PeakEnvelope::from_mono(&[1.7, -2.0], 1);
        assert_eq!(envelope.peaks(), &[1.0]);
    }

    #[test]
    fn test_short_input_yields_zero_buckets() {
        let envelope = PeakEnvelope::from_mono(&[0.5, 0.75], 4);

        assert_eq!(envelope.len(), 4);
        assert_eq!(envelope.peaks().iter().filter(|p| **p == 0.0).count(), 2);
        assert!(envelope.peaks().contains(&0.5));
        assert!(envelope.peaks().contains(&0.75));
    }

    #[test]
    fn test_empty_audio() {
        let audio = AudioArc::new(vec![], 44100, 2);
        let envelope = PeakEnvelope::from_audio_arc(&audio, 8);
        assert_eq!(envelope.peaks(), &[0.0; 8]);
    }

    #[test]
    fn test_remainder_samples_are_covered() {
        // 7 samples into 3 buckets: [0,2) [2,4) [4,7)
        let envelope = PeakEnvelope::from_mono(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.6], 3);
        assert_eq!(envelope.peaks(), &[0.0, 0.0, 0.6]);
    }

    #[test]
    fn test_peak_at() {
        let envelope = PeakEnvelope::from_mono(&[0.1, 0.2, 0.3, 0.4], 4);
        assert_eq!(envelope.peak_at(0.0), Some(0.1));
        assert_eq!(envelope.peak_at(0.6), Some(0.3));
        assert_eq!(envelope.peak_at(1.0), Some(0.4));
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        let ok: PeakEnvelope = serde_json::from_str("[0.0, 0.5, 1.0]").expect("valid");
        assert_eq!(ok.len(), 3);

        let bad = serde_json::from_str::<PeakEnvelope>("[0.5, -0.1]");
        assert!(bad.is_err());
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let envelope = PeakEnvelope::from_mono(&[0.5, 0.25], 2);
        let json = serde_json::to_string(&envelope).expect("serialize");
        assert_eq!(json, "[0.5,0.25]");
    }
}
