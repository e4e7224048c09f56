// Phrases and phrase trees.
//
// A phrase is a stretch of melody with its aligned support lines, stored
// with times relative to the phrase start. Leaves come from single
// measures; composites join two phrases end to end. A composite's label
// spells out its shape, `"(100 + (201 + 300))"`, and is the only record of
// which leaves it was built from: `child_ids` reads the leaf ids back out of
// it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::harmony::Chord;
use crate::measure::Measure;
use crate::note::{Note, pad_rests, sounding};

/// Notes and bookkeeping shared by leaves and composites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseBody {
    /// Melody, rest-padded, local times.
    pub notes: Vec<Note>,
    /// One rest-padded line per support track.
    pub supports: Vec<Vec<Note>>,
    pub length: u64,
    /// Index of the first measure covered.
    pub first_measure: usize,
    /// Number of measures from the first to the last covered.
    pub measure_span: usize,
    /// Chords per covered measure, filled in by the analysis session.
    pub chords: Vec<Vec<Chord>>,
}

impl PhraseBody {
    /// Body for measure `index`. Silent support lines become a single rest
    /// spanning the measure.
    pub fn from_measure(index: usize, measure: &Measure) -> Self {
        let supports = measure
            .support_notes
            .iter()
            .map(|line| {
                let padded = pad_rests(line, 0);
                if padded.is_empty() {
                    vec![Note::rest(0, measure.length)]
                } else {
                    padded
                }
            })
            .collect();
        Self {
            notes: pad_rests(&measure.notes, 0),
            supports,
            length: measure.length,
            first_measure: index,
            measure_span: 1,
            chords: Vec::new(),
        }
    }

    /// Which support lines sound at all.
    pub fn silhouette(&self) -> Vec<bool> {
        self.supports
            .iter()
            .map(|line| sounding(line).next().is_some())
            .collect()
    }

    /// Bit length of the mean melody note duration: phrases whose notes are
    /// within a factor of two of each other share a class.
    pub fn duration_class(&self) -> u32 {
        let (count, total) = sounding(&self.notes)
            .fold((0u64, 0u64), |(c, t), n| (c + 1, t + n.duration()));
        if count == 0 {
            return 0;
        }
        (total / count).checked_ilog2().map_or(0, |b| b + 1)
    }

    pub fn sounding_count(&self) -> usize {
        sounding(&self.notes).count()
    }

    /// `a` followed by `b`.
    fn concat(a: &PhraseBody, b: &PhraseBody) -> PhraseBody {
        assert_eq!(
            a.supports.len(),
            b.supports.len(),
            "joined phrases must have the same support tracks"
        );
        let shift = |line: &[Note]| -> Vec<Note> { line.iter().map(|n| n.shifted(a.length)).collect() };
        let mut notes = a.notes.clone();
        notes.extend(shift(b.notes.as_slice()));
        let supports = a
            .supports
            .iter()
            .zip(&b.supports)
            .map(|(x, y)| {
                let mut line = x.clone();
                line.extend(shift(y.as_slice()));
                line
            })
            .collect();
        let last = (b.first_measure + b.measure_span).max(a.first_measure + a.measure_span);
        let mut chords = a.chords.clone();
        chords.extend(b.chords.iter().cloned());
        PhraseBody {
            notes,
            supports,
            length: a.length + b.length,
            first_measure: a.first_measure,
            measure_span: last - a.first_measure,
            chords,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Phrase {
    Leaf {
        id: u32,
        body: PhraseBody,
    },
    Composite {
        id: u32,
        label: String,
        body: PhraseBody,
        children: Box<(Phrase, Phrase)>,
    },
}

impl Phrase {
    pub fn leaf(id: u32, body: PhraseBody) -> Self {
        Phrase::Leaf { id, body }
    }

    /// Join two phrases under `id`.
    ///
    /// Panics if they have different numbers of support lines.
    pub fn composite(id: u32, first: Phrase, second: Phrase) -> Self {
        let body = PhraseBody::concat(first.body(), second.body());
        let label = format!("({} + {})", first.label(), second.label());
        Phrase::Composite {
            id,
            label,
            body,
            children: Box::new((first, second)),
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Phrase::Leaf { id, .. } | Phrase::Composite { id, .. } => *id,
        }
    }

    pub fn body(&self) -> &PhraseBody {
        match self {
            Phrase::Leaf { body, .. } | Phrase::Composite { body, .. } => body,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Phrase::Leaf { .. })
    }

    /// Shape label: the id for a leaf, `(a + b)` for a composite.
    pub fn label(&self) -> String {
        match self {
            Phrase::Leaf { id, .. } => id.to_string(),
            Phrase::Composite { label, .. } => label.clone(),
        }
    }

    /// Leaf ids in order, read from the label.
    pub fn child_ids(&self) -> Vec<u32> {
        match self {
            Phrase::Leaf { id, .. } => vec![*id],
            Phrase::Composite { label, .. } => label
                .split(|c: char| !c.is_ascii_digit())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect(),
        }
    }

    /// Store chords for the measures this phrase covers, recursively.
    pub fn attach_chords(&mut self, per_measure: &[Vec<Chord>]) {
        let attach = |body: &mut PhraseBody| {
            let end = (body.first_measure + body.measure_span).min(per_measure.len());
            body.chords = per_measure
                .get(body.first_measure..end)
                .map(<[Vec<Chord>]>::to_vec)
                .unwrap_or_default();
        };
        match self {
            Phrase::Leaf { body, .. } => attach(body),
            Phrase::Composite { body, children, .. } => {
                attach(body);
                children.0.attach_chords(per_measure);
                children.1.attach_chords(per_measure);
            }
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut BTreeMap<u32, &'a PhraseBody>) {
        match self {
            Phrase::Leaf { id, body } => {
                out.entry(*id).or_insert(body);
            }
            Phrase::Composite { children, .. } => {
                children.0.collect_leaves(out);
                children.1.collect_leaves(out);
            }
        }
    }
}

/// Each distinct leaf phrase once, keyed by id. The first occurrence of an
/// id supplies the body.
pub fn distinct_leaves(phrases: &[Phrase]) -> BTreeMap<u32, &PhraseBody> {
    let mut out = BTreeMap::new();
    for phrase in phrases {
        phrase.collect_leaves(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use motet_smf::Event;
    use pretty_assertions::assert_eq;

    fn body(notes: Vec<Note>, supports: Vec<Vec<Note>>, index: usize) -> PhraseBody {
        PhraseBody {
            notes,
            supports,
            length: 384,
            first_measure: index,
            measure_span: 1,
            chords: Vec::new(),
        }
    }

    #[test]
    fn from_measure_pads_and_fills_silent_supports() {
        let mut m = Measure::new(
            0,
            384,
            vec![Event::note_on(96, 0, 60, 90), Event::note_on(192, 0, 60, 0)],
            false,
        );
        m.add_support(Vec::new());
        let b = PhraseBody::from_measure(3, &m);
        assert_eq!(b.notes, vec![Note::rest(0, 96), Note::new(96, 192, 60)]);
        assert_eq!(b.supports, vec![vec![Note::rest(0, 384)]]);
        assert_eq!(b.silhouette(), vec![false]);
        assert_eq!(b.first_measure, 3);
    }

    #[test]
    fn duration_classes() {
        let quarters = body(vec![Note::new(0, 96, 60), Note::new(96, 192, 62)], vec![], 0);
        let near = body(vec![Note::new(0, 80, 60), Note::new(80, 200, 62)], vec![], 0);
        let eighths = body(vec![Note::new(0, 48, 60), Note::new(48, 96, 62)], vec![], 0);
        assert_eq!(quarters.duration_class(), 7);
        assert_eq!(near.duration_class(), 7);
        assert_eq!(eighths.duration_class(), 6);
        assert_eq!(body(vec![Note::rest(0, 384)], vec![], 0).duration_class(), 0);
    }

    #[test]
    fn composite_concatenates_and_labels() {
        let a = Phrase::leaf(
            100,
            body(vec![Note::new(0, 384, 60)], vec![vec![Note::new(0, 384, 48)]], 0),
        );
        let b = Phrase::leaf(
            201,
            body(vec![Note::new(0, 384, 62)], vec![vec![Note::rest(0, 384)]], 1),
        );
        let c = Phrase::leaf(
            300,
            body(vec![Note::new(0, 384, 64)], vec![vec![Note::new(0, 384, 43)]], 2),
        );
        let inner = Phrase::composite(400, b, c);
        let tree = Phrase::composite(500, a, inner);

        assert_eq!(tree.label(), "(100 + (201 + 300))");
        assert_eq!(tree.child_ids(), vec![100, 201, 300]);
        let body = tree.body();
        assert_eq!(body.length, 1152);
        assert_eq!(body.notes[2], Note::new(768, 1152, 64));
        assert_eq!(body.supports[0].len(), 3);
        assert_eq!(body.supports[0][1], Note::rest(384, 768));
        assert_eq!(body.measure_span, 3);
        assert!(!tree.is_leaf());
    }

    #[test]
    #[should_panic(expected = "same support tracks")]
    fn mismatched_supports_panic() {
        let a = Phrase::leaf(100, body(vec![], vec![vec![]], 0));
        let b = Phrase::leaf(200, body(vec![], vec![], 1));
        let _ = Phrase::composite(300, a, b);
    }

    #[test]
    fn distinct_leaves_dedup_repeats() {
        let leaf = |id, i| Phrase::leaf(id, body(vec![Note::new(0, 96, 60)], vec![], i));
        let phrases = vec![
            Phrase::composite(300, leaf(100, 0), leaf(200, 1)),
            leaf(100, 2),
            leaf(101, 3),
        ];
        let leaves = distinct_leaves(&phrases);
        assert_eq!(leaves.keys().copied().collect::<Vec<_>>(), vec![100, 101, 200]);
        assert_eq!(leaves[&100].first_measure, 0);
    }

    #[test]
    fn chords_attach_by_measure_range() {
        let leaf = |id, i| Phrase::leaf(id, body(vec![], vec![], i));
        let mut tree = Phrase::composite(300, leaf(100, 1), leaf(200, 2));
        let per_measure: Vec<Vec<Chord>> = (0..4)
            .map(|i| vec![Chord { pitches: vec![i] }])
            .collect();
        tree.attach_chords(&per_measure);
        assert_eq!(tree.body().chords.len(), 2);
        assert_eq!(tree.body().chords[0][0].pitches, vec![1]);
        let Phrase::Composite { children, .. } = &tree else {
            unreachable!()
        };
        assert_eq!(children.1.body().chords[0][0].pitches, vec![2]);
    }
}
