// One piece's analysis, start to finish.
//
// `analyze` takes a decoded file and runs the whole pipeline: pick the
// melody and support tracks, segment into measures, sample chords, identify
// phrases and train the pitch chain. Everything it builds lives in the
// returned `PieceAnalysis`; nothing is cached between pieces.
//
// Track roles: the first track with notes is the melody, every later track
// with notes is a support. Tracks without notes (the tempo map of a
// format-1 file, for instance) only contribute piece-level metadata.

use log::info;
use motet_smf::{SmfFile, Tempo, TimeSignature, Track};
use serde::{Deserialize, Serialize};

use crate::config::MotetConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::harmony::{Chord, roman_numeral};
use crate::identify::identify_phrases;
use crate::key::Key;
use crate::markov::{PitchChain, build_pitch_chain, pitch_history};
use crate::measure::Measure;
use crate::phrase::Phrase;
use crate::segment::segment_with_meter;

/// Piece-level settings read from meta events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceInfo {
    pub key: Key,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub resolution: u16,
}

impl PieceInfo {
    /// Earliest key, tempo and time signature in the file. Defaults are C
    /// major, 120 BPM and 4/4.
    pub fn of(file: &SmfFile) -> Self {
        Self {
            key: file.key_signature().map(Key::from).unwrap_or_default(),
            tempo: file.tempo().unwrap_or_default(),
            time_signature: file.time_signature().unwrap_or_default(),
            resolution: file.resolution,
        }
    }

    pub fn ticks_per_measure(&self) -> u64 {
        u64::from(self.time_signature.ticks_per_measure(self.resolution))
    }
}

/// How a track sounds, for re-voicing generated material on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackProfile {
    /// First program change, or 0.
    pub instrument: u8,
    /// Channel of the first note, or 0.
    pub channel: u8,
    /// Mean note-on velocity, or 64.
    pub velocity: u8,
    /// Lowest C at or below the mean pitch, or 60.
    pub octave_base: u8,
}

impl TrackProfile {
    pub fn of(track: &Track) -> Self {
        let starts: Vec<_> = track
            .events
            .iter()
            .filter(|e| e.is_note_start())
            .collect();
        let channel = starts.first().and_then(|e| e.channel()).unwrap_or(0);
        let velocity = mean_u8(starts.iter().filter_map(|e| e.velocity())).unwrap_or(64);
        let octave_base = mean_u8(starts.iter().filter_map(|e| e.key())).map_or(60, |p| p - p % 12);
        Self {
            instrument: track.first_program().unwrap_or(0),
            channel,
            velocity,
            octave_base,
        }
    }
}

pub(crate) fn mean_u8(values: impl Iterator<Item = u8>) -> Option<u8> {
    let (count, total) = values.fold((0u32, 0u32), |(c, t), v| (c + 1, t + u32::from(v)));
    (count > 0).then(|| (total / count) as u8)
}

/// Everything learned from one piece.
#[derive(Debug, Clone)]
pub struct PieceAnalysis {
    pub info: PieceInfo,
    /// Melody first, then supports, as indices into the source file.
    pub track_indices: Vec<usize>,
    /// Same order as `track_indices`.
    pub profiles: Vec<TrackProfile>,
    pub measures: Vec<Measure>,
    /// Chords per measure, in `config.compose.harmonic_rhythm`.
    pub chords: Vec<Vec<Chord>>,
    pub phrases: Vec<Phrase>,
    pub chain: PitchChain,
}

impl PieceAnalysis {
    /// Roman numerals for every sampled chord.
    pub fn roman_numerals(&self) -> Vec<Vec<String>> {
        self.chords
            .iter()
            .map(|per_measure| {
                per_measure
                    .iter()
                    .map(|c| roman_numeral(c, &self.info.key))
                    .collect()
            })
            .collect()
    }

    pub fn support_count(&self) -> usize {
        self.track_indices.len().saturating_sub(1)
    }
}

/// Run the analysis pipeline over `file`.
pub fn analyze(file: &SmfFile, config: &MotetConfig) -> AnalysisResult<PieceAnalysis> {
    let info = PieceInfo::of(file);
    let track_indices: Vec<usize> = file
        .tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.events.iter().any(|e| e.is_note_start()))
        .map(|(i, _)| i)
        .collect();
    let Some((&primary, supports)) = track_indices.split_first() else {
        return Err(AnalysisError::EmptyCorpus("no track has notes"));
    };

    let melody = &file.tracks[primary];
    let support_tracks: Vec<&Track> = supports.iter().map(|&i| &file.tracks[i]).collect();
    // Format-1 files keep their time signatures on a note-less first track.
    let meter: Vec<&Track> = file.tracks.iter().collect();
    let measures = segment_with_meter(
        melody,
        &support_tracks,
        &meter,
        info.ticks_per_measure(),
        info.resolution,
        &config.segment,
    );

    let chords: Vec<Vec<Chord>> = measures
        .iter()
        .map(|m| m.chords(&info.key, config.compose.harmonic_rhythm))
        .collect();

    let mut phrases = identify_phrases(&measures, &config.phrase);
    for phrase in &mut phrases {
        phrase.attach_chords(&chords);
    }

    let chain = build_pitch_chain(&pitch_history(melody), config.markov.order);
    let profiles = track_indices
        .iter()
        .map(|&i| TrackProfile::of(&file.tracks[i]))
        .collect();

    info!(
        "analyzed piece: {} measures, {} phrases, {} supports, key {:?}",
        measures.len(),
        phrases.len(),
        supports.len(),
        info.key
    );
    Ok(PieceAnalysis {
        info,
        track_indices,
        profiles,
        measures,
        chords,
        phrases,
        chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use motet_smf::KeySignature;
    use pretty_assertions::assert_eq;

    #[test]
    fn profile_of_track() {
        let mut t = Track::new();
        t.change_instrument(0, 3, 40);
        t.add_note(0, 96, 3, 62, 80);
        t.add_note(96, 96, 3, 70, 100);
        let p = TrackProfile::of(&t);
        assert_eq!(
            p,
            TrackProfile {
                instrument: 40,
                channel: 3,
                velocity: 90,
                octave_base: 60,
            }
        );
    }

    #[test]
    fn profile_defaults() {
        let p = TrackProfile::of(&Track::new());
        assert_eq!(p.instrument, 0);
        assert_eq!(p.velocity, 64);
        assert_eq!(p.octave_base, 60);
    }

    #[test]
    fn piece_info_defaults_and_overrides() {
        let mut file = SmfFile::new(96);
        file.tracks.push(Track::new());
        let info = PieceInfo::of(&file);
        assert_eq!(info.key, Key::major(0));
        assert_eq!(info.tempo.bpm(), 120);
        assert_eq!(info.ticks_per_measure(), 384);

        let mut conductor = Track::new();
        conductor.add_meta(0, TimeSignature::new(3, 4));
        conductor.add_meta(
            0,
            KeySignature {
                sharps: -1,
                minor: true,
            },
        );
        file.tracks[0] = conductor;
        let info = PieceInfo::of(&file);
        assert_eq!(info.key, Key::minor(-1));
        assert_eq!(info.ticks_per_measure(), 288);
    }

    #[test]
    fn analyze_needs_notes() {
        let mut file = SmfFile::new(96);
        file.tracks.push(Track::new());
        let err = analyze(&file, &MotetConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyCorpus(_)));
    }

    #[test]
    fn meter_change_on_conductor_track() {
        let mut file = SmfFile::new(96);
        let mut conductor = Track::new();
        conductor.add_meta(0, TimeSignature::new(4, 4));
        conductor.add_meta(384, TimeSignature::new(3, 4));
        let mut melody = Track::new();
        for i in 0..7u64 {
            melody.add_note(i * 96, 96, 0, 60 + i as u8, 90);
        }
        file.tracks.extend([conductor, melody]);

        let analysis = analyze(&file, &MotetConfig::default()).unwrap();
        let lengths: Vec<u64> = analysis.measures.iter().map(|m| m.length).collect();
        assert_eq!(lengths, vec![384, 288]);
    }

    #[test]
    fn conductor_track_is_not_a_voice() {
        let mut file = SmfFile::new(96);
        let mut conductor = Track::new();
        conductor.add_meta(0, Tempo::from_bpm(90));
        let mut melody = Track::new();
        let mut bass = Track::new();
        for m in 0..2u64 {
            for (i, p) in [60, 64, 67, 72].into_iter().enumerate() {
                melody.add_note(m * 384 + i as u64 * 96, 96, 0, p, 90);
            }
            bass.add_note(m * 384, 384, 1, 48, 70);
        }
        file.tracks.extend([conductor, melody, bass]);

        let analysis = analyze(&file, &MotetConfig::default()).unwrap();
        assert_eq!(analysis.track_indices, vec![1, 2]);
        assert_eq!(analysis.support_count(), 1);
        assert_eq!(analysis.info.tempo.bpm(), 90);
        assert_eq!(analysis.measures.len(), 2);
        assert_eq!(analysis.chords.len(), 2);
        assert_eq!(analysis.roman_numerals()[0], vec!["I".to_string()]);
        // Both measures are the same phrase; the pair does not recur so
        // nothing folds.
        let ids: Vec<u32> = analysis.phrases.iter().map(Phrase::id).collect();
        assert_eq!(ids, vec![100, 100]);
        assert_eq!(analysis.phrases[0].body().chords.len(), 1);
    }
}
