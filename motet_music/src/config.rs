// Tunable parameters for analysis and generation.
//
// `MotetConfig` groups the knobs of each pipeline stage into a nested
// parameter struct. Every threshold that depends on timing is expressed as a
// divisor of the file's resolution (ticks per quarter) rather than a raw tick
// count, so the same config behaves consistently at 96, 480 or 960 ticks per
// quarter.
//
// The defaults reproduce the reference behavior: 1/32-quarter snap windows,
// a 10% rhythmic mismatch allowance, order-2 Markov context, family ids in
// steps of 100. Configs are plain JSON; any field left out of the file takes
// its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MotetConfig {
    pub segment: SegmentParams,
    pub phrase: PhraseParams,
    pub markov: MarkovParams,
    pub compose: ComposeParams,
}

impl MotetConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AnalysisResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Measure segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Durations within `resolution / quantize_divisor` ticks of an eighth,
    /// quarter or half note snap to it.
    pub quantize_divisor: u32,
    /// A note ending within `resolution / boundary_divisor` ticks of the
    /// measure boundary is clamped to the measure instead of tied over.
    pub boundary_divisor: u32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            quantize_divisor: 32,
            boundary_divisor: 32,
        }
    }
}

impl SegmentParams {
    pub fn quantize_tolerance(&self, resolution: u16) -> u64 {
        u64::from(resolution) / u64::from(self.quantize_divisor.max(1))
    }

    pub fn boundary_tolerance(&self, resolution: u16) -> u64 {
        u64::from(resolution) / u64::from(self.boundary_divisor.max(1))
    }
}

/// Phrase identification and the two folding passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseParams {
    /// Distance between successive family ids.
    pub family_step: u32,
    /// Largest fraction of mismatched alignment steps still accepted as a
    /// rhythmic derivation.
    pub rhythmic_mismatch_ratio: f64,
    /// Fold runs of one-off phrases with similar note lengths.
    pub simplify: bool,
    /// Fold adjacent pairs that recur elsewhere in the piece.
    pub combine: bool,
}

impl Default for PhraseParams {
    fn default() -> Self {
        Self {
            family_step: 100,
            rhythmic_mismatch_ratio: 0.10,
            simplify: true,
            combine: true,
        }
    }
}

/// Markov pitch chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkovParams {
    /// Context length k.
    pub order: usize,
    /// Dead ends tolerated per seed before starting over.
    pub max_backtracks: usize,
    /// Fresh seeds tried before giving up.
    pub max_reseeds: usize,
}

impl Default for MarkovParams {
    fn default() -> Self {
        Self {
            order: 2,
            max_backtracks: 10_000,
            max_reseeds: 16,
        }
    }
}

/// Where chords are sampled within a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HarmonicRhythm {
    /// Once, on the downbeat.
    #[default]
    PerMeasure,
    /// At every onset of the support line with the fewest notes.
    PerSupportOnset,
}

/// Song synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeParams {
    /// Length of the generated song in measures.
    pub measures: usize,
    /// Random candidates compared when picking each next measure's rhythm.
    pub candidate_measures: usize,
    /// Chord-progression windows tried before keeping the best.
    pub chord_attempts: usize,
    pub harmonic_rhythm: HarmonicRhythm,
}

impl Default for ComposeParams {
    fn default() -> Self {
        Self {
            measures: 16,
            candidate_measures: 4,
            chord_attempts: 8,
            harmonic_rhythm: HarmonicRhythm::PerMeasure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tolerances_scale_with_resolution() {
        let p = SegmentParams::default();
        assert_eq!(p.quantize_tolerance(96), 3);
        assert_eq!(p.quantize_tolerance(480), 15);
        assert_eq!(p.boundary_tolerance(96), 3);
    }

    #[test]
    fn zero_divisor_does_not_panic() {
        let p = SegmentParams {
            quantize_divisor: 0,
            boundary_divisor: 0,
        };
        assert_eq!(p.quantize_tolerance(96), 96);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: MotetConfig =
            serde_json::from_str(r#"{ "markov": { "order": 3 }, "compose": { "measures": 8 } }"#)
                .unwrap();
        assert_eq!(cfg.markov.order, 3);
        assert_eq!(cfg.markov.max_reseeds, 16);
        assert_eq!(cfg.compose.measures, 8);
        assert_eq!(cfg.phrase, PhraseParams::default());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motet.json");
        let mut cfg = MotetConfig::default();
        cfg.compose.harmonic_rhythm = HarmonicRhythm::PerSupportOnset;
        cfg.save(&path).unwrap();
        assert_eq!(MotetConfig::load(&path).unwrap(), cfg);
    }
}
