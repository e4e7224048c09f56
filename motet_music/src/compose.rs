// Song synthesis from an analyzed piece.
//
// `compose_song` assembles a new piece in four passes:
//
// 1. Rhythm. Measures are drawn from the distinct leaf phrases (or from any
//    measure with notes if the piece produced no phrases). After the first,
//    each measure is the best of a few random candidates: the one whose
//    first-half note speed is closest to the second-half speed of the
//    measure before it.
// 2. Pitch. One Markov walk fills every melody note in order.
// 3. Harmony. The observed downbeat chords are read as a cyclic sequence;
//    several random windows of it are tried and the window whose chords
//    contain the most downbeat melody pitches wins. Downbeat melody notes
//    outside their chord move to the chord's top tone.
// 4. Voicing. Each support track holds one remaining chord tone per
//    measure, in its own register, with tracks shuffled per measure.
//
// `random_segment` is the simpler sibling: it copies a random run of
// measures out of the piece as a new file.

use log::{debug, info};
use motet_prng::RandomSource;
use motet_smf::{Event, EventKind, SmfFile, Track, meta_type};

use crate::config::MotetConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::harmony::Chord;
use crate::key::raise_to_octave;
use crate::measure::Measure;
use crate::note::{Note, sounding};
use crate::phrase::distinct_leaves;
use crate::session::{PieceAnalysis, PieceInfo, TrackProfile, mean_u8};

/// Measures whose rhythms the composer may borrow.
fn rhythm_sources(analysis: &PieceAnalysis) -> Vec<&Measure> {
    let from_leaves: Vec<&Measure> = distinct_leaves(&analysis.phrases)
        .values()
        .filter_map(|body| analysis.measures.get(body.first_measure))
        .filter(|m| m.sounding_count() > 0)
        .collect();
    if !from_leaves.is_empty() {
        return from_leaves;
    }
    analysis
        .measures
        .iter()
        .filter(|m| m.sounding_count() > 0)
        .collect()
}

/// How far apart the end of `prev` and the start of `next` move.
fn speed_gap(prev: &Measure, next: &Measure) -> f64 {
    let tail = prev
        .partial_average_speed(prev.length / 2, false)
        .or_else(|| prev.average_speed());
    let head = next
        .partial_average_speed(next.length / 2, true)
        .or_else(|| next.average_speed());
    match (tail, head) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => f64::INFINITY,
    }
}

fn choose_rhythms<'a>(
    sources: &[&'a Measure],
    count: usize,
    candidates: usize,
    rng: &mut impl RandomSource,
) -> Vec<&'a Measure> {
    let mut chosen: Vec<&Measure> = Vec::with_capacity(count);
    for _ in 0..count {
        let mut best: Option<(&Measure, f64)> = None;
        for _ in 0..candidates.max(1) {
            let Some(i) = rng.index(sources.len()) else {
                return chosen;
            };
            let candidate = sources[i];
            let gap = chosen.last().map_or(0.0, |prev| speed_gap(prev, candidate));
            if best.is_none_or(|(_, g)| gap < g) {
                best = Some((candidate, gap));
            }
            if chosen.is_empty() {
                break;
            }
        }
        if let Some((m, _)) = best {
            chosen.push(m);
        }
    }
    chosen
}

/// Pick the window of observed downbeat chords that agrees most with the
/// melody's downbeats.
fn choose_progression(
    observed: &[Chord],
    downbeats: &[Option<u8>],
    attempts: usize,
    rng: &mut impl RandomSource,
) -> Vec<Chord> {
    if observed.is_empty() {
        return Vec::new();
    }
    let mut best: Option<(usize, usize)> = None;
    for _ in 0..attempts.max(1) {
        let Some(offset) = rng.index(observed.len()) else {
            break;
        };
        let score = downbeats
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                p.is_some_and(|p| observed[(offset + i) % observed.len()].contains_pitch_class(p))
            })
            .count();
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((offset, score));
        }
    }
    let (offset, score) = best.unwrap_or((0, 0));
    debug!("chord window at {offset}: {score}/{} downbeats agree", downbeats.len());
    (0..downbeats.len())
        .map(|i| observed[(offset + i) % observed.len()].clone())
        .collect()
}

/// Track-start events: program change, plus the piece settings on the
/// first track.
fn track_header(track: &mut Track, profile: &TrackProfile, info: Option<&PieceInfo>) {
    if let Some(info) = info {
        track.add_meta(0, info.time_signature);
        track.add_meta(0, info.tempo);
        track.add_meta(0, motet_smf::KeySignature::from(info.key));
    }
    track.change_instrument(0, profile.channel, profile.instrument);
}

/// Compose `config.compose.measures` measures of new material in the style
/// of `analysis`.
pub fn compose_song(
    analysis: &PieceAnalysis,
    config: &MotetConfig,
    rng: &mut impl RandomSource,
) -> AnalysisResult<SmfFile> {
    let params = &config.compose;
    let Some(lead) = analysis.profiles.first().copied() else {
        return Err(AnalysisError::EmptyCorpus("analysis has no tracks"));
    };
    let sources = rhythm_sources(analysis);
    if sources.is_empty() {
        return Err(AnalysisError::EmptyCorpus(
            "no measure has notes to borrow a rhythm from",
        ));
    }
    let rhythms = choose_rhythms(&sources, params.measures, params.candidate_measures, rng);

    // Melody rhythm per measure, pitches filled in below.
    let mut melody: Vec<Vec<Note>> = rhythms
        .iter()
        .map(|m| sounding(&m.notes).copied().collect())
        .collect();
    let total: usize = melody.iter().map(Vec::len).sum();
    let pitches = analysis.chain.generate(total, rng, &config.markov)?.pitches;
    for (note, pitch) in melody.iter_mut().flatten().zip(pitches) {
        note.pitch = Some(pitch);
    }

    let observed: Vec<Chord> = analysis
        .chords
        .iter()
        .filter_map(|per_measure| per_measure.first())
        .filter(|c| !c.is_empty())
        .cloned()
        .collect();
    let downbeats: Vec<Option<u8>> = melody.iter().map(|notes| downbeat_pitch(notes)).collect();
    let progression = choose_progression(&observed, &downbeats, params.chord_attempts, rng);

    for (notes, chord) in melody.iter_mut().zip(&progression) {
        let Some(first) = notes.first_mut().filter(|n| n.start == 0) else {
            continue;
        };
        let (Some(pitch), Some(&top)) = (first.pitch, chord.pitches.last()) else {
            continue;
        };
        if !chord.contains_pitch_class(pitch) {
            first.pitch = Some(raise_to_octave(top, pitch - pitch % 12));
        }
    }

    let info = &analysis.info;
    let mut tracks: Vec<Track> = analysis.profiles.iter().map(|_| Track::new()).collect();
    for (i, (track, profile)) in tracks.iter_mut().zip(&analysis.profiles).enumerate() {
        track_header(track, profile, (i == 0).then_some(info));
    }

    let mut offset = 0u64;
    let support_count = tracks.len() - 1;
    for (m, (measure, notes)) in rhythms.iter().zip(&melody).enumerate() {
        for note in notes {
            if let Some(p) = note.pitch {
                tracks[0].add_note(
                    offset + note.start,
                    note.duration(),
                    lead.channel,
                    p,
                    lead.velocity,
                );
            }
        }

        if let Some(chord) = progression.get(m).filter(|c| !c.is_empty()) {
            let sung = downbeat_pitch(notes);
            let mut tones: Vec<u8> = chord
                .pitches
                .iter()
                .copied()
                .filter(|&t| sung.is_none_or(|s| s % 12 != t % 12))
                .collect();
            if tones.is_empty() {
                tones.clone_from(&chord.pitches);
            }
            let mut order: Vec<usize> = (1..=support_count).collect();
            rng.shuffle(&mut order);
            for (k, &track_index) in order.iter().enumerate() {
                let profile = &analysis.profiles[track_index];
                let tone = tones[k % tones.len()];
                tracks[track_index].add_note(
                    offset,
                    measure.length,
                    profile.channel,
                    raise_to_octave(tone, profile.octave_base),
                    profile.velocity,
                );
            }
        }
        offset += measure.length;
    }

    info!(
        "composed {} measures, {} melody notes, {} tracks",
        rhythms.len(),
        total,
        tracks.len()
    );
    let mut file = SmfFile::new(info.resolution);
    file.tracks = tracks;
    Ok(file)
}

/// Pitch of the melody note on the downbeat, if one starts there.
fn downbeat_pitch(notes: &[Note]) -> Option<u8> {
    notes.first().filter(|n| n.start == 0).and_then(|n| n.pitch)
}

/// Copy `count` consecutive measures starting at a random measure into a
/// new file. Velocities of each track are flattened to that track's mean
/// over the copied run.
pub fn random_segment(
    analysis: &PieceAnalysis,
    count: usize,
    rng: &mut impl RandomSource,
) -> AnalysisResult<SmfFile> {
    let measures = &analysis.measures;
    if measures.is_empty() {
        return Err(AnalysisError::EmptyCorpus("piece has no measures"));
    }
    let count = count.clamp(1, measures.len());
    let first = rng.range_usize(0, measures.len() - count + 1);
    let run = &measures[first..first + count];
    let origin = run[0].start;

    let mut file = SmfFile::new(analysis.info.resolution);
    for (line, profile) in analysis.profiles.iter().enumerate() {
        let mut events: Vec<Event> = run
            .iter()
            .flat_map(|m| {
                let source = if line == 0 {
                    &m.events
                } else {
                    &m.supports[line - 1]
                };
                source
                    .iter()
                    .map(move |e| Event::new(e.time + m.start - origin, e.kind.clone()))
            })
            .filter(|e| !is_header_event(e))
            .collect();

        let starts = events.iter().filter(|e| e.is_note_start());
        if let Some(mean) = mean_u8(starts.filter_map(Event::velocity)) {
            for event in &mut events {
                match &mut event.kind {
                    EventKind::NoteOn { velocity, .. } if *velocity > 0 => *velocity = mean.max(1),
                    _ => {}
                }
            }
        }

        let mut track = Track::new();
        track_header(&mut track, profile, (line == 0).then_some(&analysis.info));
        track.events.extend(events);
        track.sort();
        file.tracks.push(track);
    }
    info!("extracted measures {first}..{} as a new file", first + count);
    Ok(file)
}

/// Events `track_header` writes itself.
fn is_header_event(event: &Event) -> bool {
    match &event.kind {
        EventKind::ProgramChange { .. } => true,
        EventKind::Meta(m) => matches!(
            m.meta_type,
            meta_type::TEMPO | meta_type::TIME_SIGNATURE | meta_type::KEY_SIGNATURE
        ),
        _ => false,
    }
}
