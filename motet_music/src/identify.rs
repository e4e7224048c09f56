// Phrase identification.
//
// Walks the measures of a piece and gives each one a structural id by
// comparing it with the phrases registered so far, newest first:
//
// - exact repeat: same (duration, pitch) sequence and the same support
//   silhouette. Takes the registered id.
// - derivation: same silhouette, and either the same rhythm transposed
//   (pitch derivation) or a different rhythm that a greedy alignment
//   maps onto the registered one with few mismatches (rhythmic
//   derivation). Takes the registered id + 1.
// - otherwise a new family, ids counting up by `family_step`.
//
// Measures with at most one sounding note are left out of the sequence.
//
// Two optional passes then shorten the sequence. `simplify` folds runs of
// one-off phrases with the same duration class into left-leaning
// composites. `combine` looks for an adjacent id pair that occurs again
// later and folds every occurrence into one composite sharing a fresh id,
// repeating until no pair recurs. Both passes build new vectors instead of
// editing in place. Composite ids come from the same counter as family
// ids, so they never collide with a family or a derivation.

use log::{debug, info};

use crate::config::PhraseParams;
use crate::measure::Measure;
use crate::note::Note;
use crate::phrase::{Phrase, PhraseBody};

/// How a phrase relates to a registered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Exact,
    PitchDerivation,
    RhythmicDerivation,
}

/// Compare `candidate` against `registered`.
pub fn relate(
    candidate: &PhraseBody,
    registered: &PhraseBody,
    mismatch_ratio: f64,
) -> Option<Relation> {
    if candidate.silhouette() != registered.silhouette() {
        return None;
    }
    if is_exact(&candidate.notes, &registered.notes) {
        Some(Relation::Exact)
    } else if is_pitch_derivation(&candidate.notes, &registered.notes) {
        Some(Relation::PitchDerivation)
    } else if is_rhythmic_derivation(&candidate.notes, &registered.notes, mismatch_ratio) {
        Some(Relation::RhythmicDerivation)
    } else {
        None
    }
}

fn is_exact(a: &[Note], b: &[Note]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
}

/// Pitches relative to the lowest sounding pitch; rests stay `None`.
fn normalized(notes: &[Note]) -> Vec<Option<u8>> {
    let low = notes.iter().filter_map(|n| n.pitch).min().unwrap_or(0);
    notes.iter().map(|n| n.pitch.map(|p| p - low)).collect()
}

fn durations(notes: &[Note]) -> Vec<u64> {
    notes.iter().map(Note::duration).collect()
}

fn is_pitch_derivation(a: &[Note], b: &[Note]) -> bool {
    a.len() == b.len() && durations(a) == durations(b) && normalized(a) == normalized(b)
}

/// Greedy alignment of two duration sequences.
///
/// Each step consumes the shorter of the two current durations from both
/// sides; a step where they differ is a miss. Anything left over on either
/// side counts as both a step and a miss. Accepts when misses / steps is at
/// most `ratio`.
fn is_rhythmic_derivation(a: &[Note], b: &[Note], ratio: f64) -> bool {
    let da = durations(a);
    let db = durations(b);
    if da == db {
        return false;
    }
    let (mut i, mut j) = (0, 0);
    let (mut ra, mut rb) = (da.first().copied(), db.first().copied());
    let mut steps = 0usize;
    let mut misses = 0usize;
    while let (Some(x), Some(y)) = (ra, rb) {
        steps += 1;
        if x == y {
            i += 1;
            j += 1;
            ra = da.get(i).copied();
            rb = db.get(j).copied();
        } else if x < y {
            misses += 1;
            i += 1;
            ra = da.get(i).copied();
            rb = Some(y - x);
        } else {
            misses += 1;
            j += 1;
            ra = Some(x - y);
            rb = db.get(j).copied();
        }
    }
    let leftover = (da.len() - i.min(da.len())) + (db.len() - j.min(db.len()));
    steps += leftover;
    misses += leftover;
    steps > 0 && misses as f64 / steps as f64 <= ratio
}

/// The growing registry of phrase families for one piece.
pub struct PhraseIdentifier<'p> {
    params: &'p PhraseParams,
    /// `(family id, body)`, oldest first.
    families: Vec<(u32, PhraseBody)>,
    next_id: u32,
}

impl<'p> PhraseIdentifier<'p> {
    pub fn new(params: &'p PhraseParams) -> Self {
        Self {
            params,
            families: Vec::new(),
            next_id: params.family_step.max(2),
        }
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += self.params.family_step.max(2);
        id
    }

    /// Registered families, oldest first.
    pub fn families(&self) -> &[(u32, PhraseBody)] {
        &self.families
    }

    /// Id for `body`, registering a new family when nothing matches.
    pub fn classify(&mut self, body: &PhraseBody) -> u32 {
        let ratio = self.params.rhythmic_mismatch_ratio;
        let found = self
            .families
            .iter()
            .rev()
            .find_map(|(id, reg)| relate(body, reg, ratio).map(|r| (*id, r)));
        match found {
            Some((id, Relation::Exact)) => id,
            Some((id, _)) => id + 1,
            None => {
                let id = self.fresh_id();
                debug!("registered phrase family {id} at measure {}", body.first_measure);
                self.families.push((id, body.clone()));
                id
            }
        }
    }

    /// Identify every measure with more than one sounding note, then run the
    /// enabled folding passes.
    pub fn identify(&mut self, measures: &[Measure]) -> Vec<Phrase> {
        let mut sequence = Vec::new();
        for (index, measure) in measures.iter().enumerate() {
            if measure.sounding_count() <= 1 {
                continue;
            }
            let body = PhraseBody::from_measure(index, measure);
            let id = self.classify(&body);
            sequence.push(Phrase::leaf(id, body));
        }
        info!(
            "{} phrases in {} families from {} measures",
            sequence.len(),
            self.families.len(),
            measures.len()
        );
        if self.params.simplify {
            sequence = self.simplify(sequence);
        }
        if self.params.combine {
            sequence = self.combine(sequence);
        }
        sequence
    }

    /// Fold runs of phrases whose id occurs only once and whose duration
    /// class is shared, left to right.
    pub fn simplify(&mut self, sequence: Vec<Phrase>) -> Vec<Phrase> {
        let ids: Vec<u32> = sequence.iter().map(Phrase::id).collect();
        let singleton = |id: u32| ids.iter().filter(|&&x| x == id).count() == 1;

        let mut out: Vec<Phrase> = Vec::with_capacity(sequence.len());
        // Class of the run currently growing at the end of `out`.
        let mut run: Option<u32> = None;
        for phrase in sequence {
            let class = phrase.body().duration_class();
            if !singleton(phrase.id()) {
                run = None;
                out.push(phrase);
                continue;
            }
            match (run, out.pop()) {
                (Some(c), Some(prev)) if c == class => {
                    let id = self.fresh_id();
                    debug!("simplify: {} + {} -> {id}", prev.label(), phrase.label());
                    out.push(Phrase::composite(id, prev, phrase));
                }
                (_, prev) => {
                    out.extend(prev);
                    run = Some(class);
                    out.push(phrase);
                }
            }
        }
        out
    }

    /// Fold recurring adjacent pairs until none recur.
    pub fn combine(&mut self, mut sequence: Vec<Phrase>) -> Vec<Phrase> {
        while let Some((first, second)) = find_recurring_pair(&sequence) {
            let id = self.fresh_id();
            let template = (
                sequence[first].body().silhouette(),
                sequence[second].body().silhouette(),
            );
            let pair = (sequence[first].id(), sequence[second].id());
            let before = sequence.len();

            let mut out = Vec::with_capacity(sequence.len());
            let mut iter = sequence.into_iter().peekable();
            while let Some(phrase) = iter.next() {
                let opens = phrase.id() == pair.0 && phrase.body().silhouette() == template.0;
                let next = iter.next_if(|n| {
                    opens && n.id() == pair.1 && n.body().silhouette() == template.1
                });
                match next {
                    Some(n) => out.push(Phrase::composite(id, phrase, n)),
                    None => out.push(phrase),
                }
            }
            debug!(
                "combine: ({} + {}) -> {id}, {before} -> {} entries",
                pair.0,
                pair.1,
                out.len()
            );
            sequence = out;
        }
        sequence
    }
}

/// First adjacent pair `(i, i + 1)` whose ids and silhouettes occur again at
/// a later, non-overlapping position.
fn find_recurring_pair(sequence: &[Phrase]) -> Option<(usize, usize)> {
    let key = |i: usize| {
        let p = &sequence[i];
        (p.id(), p.body().silhouette())
    };
    let n = sequence.len();
    (0..n.saturating_sub(1)).find_map(|i| {
        let here = (key(i), key(i + 1));
        ((i + 2)..n.saturating_sub(1))
            .any(|j| (key(j), key(j + 1)) == here)
            .then_some((i, i + 1))
    })
}

/// Identify the phrases of a piece with a fresh registry.
pub fn identify_phrases(measures: &[Measure], params: &PhraseParams) -> Vec<Phrase> {
    PhraseIdentifier::new(params).identify(measures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(notes: &[(u64, u64, Option<u8>)], supports: Vec<bool>) -> PhraseBody {
        PhraseBody {
            notes: notes
                .iter()
                .map(|&(s, e, p)| Note { start: s, stop: e, pitch: p })
                .collect(),
            supports: supports
                .into_iter()
                .map(|sounds| {
                    if sounds {
                        vec![Note::new(0, 384, 48)]
                    } else {
                        vec![Note::rest(0, 384)]
                    }
                })
                .collect(),
            length: 384,
            first_measure: 0,
            measure_span: 1,
            chords: Vec::new(),
        }
    }

    fn four(pitches: [u8; 4]) -> PhraseBody {
        let notes: Vec<_> = pitches
            .iter()
            .enumerate()
            .map(|(i, &p)| (i as u64 * 96, (i as u64 + 1) * 96, Some(p)))
            .collect();
        body(&notes, vec![true])
    }

    fn phrase(id: u32, pitches: [u8; 4]) -> Phrase {
        Phrase::leaf(id, four(pitches))
    }

    #[test]
    fn exact_and_pitch_derivation() {
        let a = four([60, 62, 64, 65]);
        assert_eq!(relate(&a, &a, 0.1), Some(Relation::Exact));
        let up = four([67, 69, 71, 72]);
        assert_eq!(relate(&up, &a, 0.1), Some(Relation::PitchDerivation));
        let other = four([60, 64, 62, 65]);
        assert_eq!(relate(&other, &a, 0.1), None);
    }

    #[test]
    fn silhouette_must_match() {
        let a = four([60, 62, 64, 65]);
        let mut b = a.clone();
        b.supports = vec![vec![Note::rest(0, 384)]];
        assert_eq!(relate(&b, &a, 1.0), None);
    }

    #[test]
    fn rest_positions_matter_for_pitch_derivation() {
        let a = body(
            &[(0, 96, Some(60)), (96, 192, None), (192, 384, Some(64))],
            vec![],
        );
        let b = body(
            &[(0, 96, None), (96, 192, Some(62)), (192, 384, Some(66))],
            vec![],
        );
        assert!(!is_pitch_derivation(&a.notes, &b.notes));
    }

    #[test]
    fn rhythmic_alignment_counts_misses() {
        // 20 equal steps against the same line with one note split in two:
        // one miss over 20 steps.
        let long: Vec<_> = (0..20u64).map(|i| (i * 48, (i + 1) * 48, Some(60))).collect();
        let mut split = long.clone();
        split[5] = (240, 264, Some(60));
        split.insert(6, (264, 288, Some(62)));
        let a = body(&long, vec![]);
        let b = body(&split, vec![]);
        assert!(is_rhythmic_derivation(&b.notes, &a.notes, 0.10));
        assert!(!is_rhythmic_derivation(&b.notes, &a.notes, 0.01));
        // Identical rhythm is never a rhythmic derivation.
        assert!(!is_rhythmic_derivation(&a.notes, &a.notes, 1.0));
    }

    #[test]
    fn short_measures_need_close_rhythm() {
        let a = four([60, 62, 64, 65]);
        let b = body(
            &[(0, 96, Some(60)), (96, 144, Some(61)), (144, 192, Some(62)), (192, 384, Some(64))],
            vec![true],
        );
        assert_eq!(relate(&b, &a, 0.10), None);
    }

    #[test]
    fn classify_assigns_families_and_derivations() {
        let params = PhraseParams::default();
        let mut ident = PhraseIdentifier::new(&params);
        assert_eq!(ident.classify(&four([60, 62, 64, 65])), 100);
        assert_eq!(ident.classify(&four([60, 64, 62, 65])), 200);
        assert_eq!(ident.classify(&four([60, 62, 64, 65])), 100);
        assert_eq!(ident.classify(&four([62, 64, 66, 67])), 101);
        assert_eq!(ident.families().len(), 2);
    }

    #[test]
    fn silhouette_change_starts_new_family() {
        let params = PhraseParams::default();
        let mut ident = PhraseIdentifier::new(&params);
        ident.classify(&four([60, 62, 64, 65]));
        // Same notes, but the support falls silent.
        let mut silent = four([60, 62, 64, 65]);
        silent.supports = vec![vec![Note::rest(0, 384)]];
        assert_eq!(ident.classify(&silent), 200);
        assert_eq!(ident.classify(&silent), 200);
    }

    #[test]
    fn simplify_folds_singleton_runs() {
        let params = PhraseParams::default();
        let mut ident = PhraseIdentifier::new(&params);
        ident.next_id = 1000;
        let seq = vec![
            phrase(100, [60, 62, 64, 65]),
            phrase(200, [60, 64, 62, 65]),
            phrase(300, [60, 65, 62, 64]),
            phrase(400, [62, 60, 64, 65]),
            phrase(400, [62, 60, 64, 65]),
            phrase(500, [64, 60, 62, 65]),
        ];
        let out = ident.simplify(seq);
        let labels: Vec<String> = out.iter().map(Phrase::label).collect();
        assert_eq!(
            labels,
            vec!["((100 + 200) + 300)", "400", "400", "500"]
        );
        assert_eq!(out[0].id(), 1100);
    }

    #[test]
    fn combine_folds_recurring_pairs_to_fixed_point() {
        let params = PhraseParams::default();
        let mut ident = PhraseIdentifier::new(&params);
        ident.next_id = 1000;
        let a = [60, 62, 64, 65];
        let b = [60, 64, 62, 65];
        let c = [60, 65, 62, 64];
        let seq = vec![
            phrase(100, a),
            phrase(200, b),
            phrase(300, c),
            phrase(100, a),
            phrase(200, b),
            phrase(300, c),
        ];
        let out = ident.combine(seq);
        // (100, 200) folds first, then (1000, 300).
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), 1100);
        assert_eq!(out[0].label(), "((100 + 200) + 300)");
        assert_eq!(out[0].child_ids(), vec![100, 200, 300]);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn combine_without_recurrence_is_identity() {
        let params = PhraseParams::default();
        let mut ident = PhraseIdentifier::new(&params);
        let seq = vec![phrase(100, [60, 62, 64, 65]), phrase(200, [60, 64, 62, 65])];
        assert_eq!(ident.combine(seq.clone()), seq);
    }
}
