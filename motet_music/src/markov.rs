// Order-k Markov chain over pitches.
//
// Built from the note-on pitches of one reference track: every run of k
// pitches is a context, and the pitch after it is counted as a transition.
// Contexts are kept sorted in a flat list so lookups are a binary search
// and the JSON export is stable.
//
// Generation walks the chain with an explicit backtracking stack instead of
// recursion. Each generated position carries a set of pitches already
// tried there. When a context is missing from the table or all of its
// followers have been tried, the walk steps back one position and marks the
// pitch it had chosen there as tried. Two budgets keep this finite:
// `max_backtracks` per seed, after which the walk starts over from a fresh
// random seed, and `max_reseeds`, after which generation fails with the
// longest partial sequence it reached.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::{debug, info};
use motet_prng::{MotetRng, RandomSource};
use motet_smf::Track;
use serde::{Deserialize, Serialize};

use crate::config::MarkovParams;
use crate::error::{AnalysisError, AnalysisResult};

/// One context and the pitches seen after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// The k preceding pitches.
    pub precede: Vec<u8>,
    /// Next pitch -> times observed. Counts are always positive.
    pub follow: BTreeMap<u8, u32>,
}

impl ChainEntry {
    pub fn total(&self) -> u64 {
        self.follow.values().map(|&c| u64::from(c)).sum()
    }

    /// Draw a follower proportionally to its count, skipping `excluded`.
    pub fn sample(&self, rng: &mut impl RandomSource, excluded: &BTreeSet<u8>) -> Option<u8> {
        let candidates: Vec<(u8, u64)> = self
            .follow
            .iter()
            .filter(|(p, _)| !excluded.contains(p))
            .map(|(&p, &c)| (p, u64::from(c)))
            .collect();
        let total: u64 = candidates.iter().map(|&(_, c)| c).sum();
        if total == 0 {
            return None;
        }
        let mut roll = rng.range_u64(0, total);
        for (pitch, count) in candidates {
            if roll < count {
                return Some(pitch);
            }
            roll -= count;
        }
        None
    }
}

/// Transition table for one generation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchChain {
    order: usize,
    entries: Vec<ChainEntry>,
}

/// Output of a successful walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPitches {
    pub pitches: Vec<u8>,
    /// Fresh seeds taken before this walk succeeded.
    pub reseeds: usize,
    /// Dead ends backed out of, summed over all seeds.
    pub backtracks: usize,
}

/// Note-on pitches of a track in time order.
pub fn pitch_history(track: &Track) -> Vec<u8> {
    track
        .sorted_events()
        .into_iter()
        .filter(|e| e.is_note_start())
        .filter_map(|e| e.key())
        .collect()
}

/// Count every order-`order` transition in `history`.
pub fn build_pitch_chain(history: &[u8], order: usize) -> PitchChain {
    let mut table: BTreeMap<&[u8], BTreeMap<u8, u32>> = BTreeMap::new();
    for i in order..history.len() {
        *table
            .entry(&history[i - order..i])
            .or_default()
            .entry(history[i])
            .or_default() += 1;
    }
    let entries: Vec<ChainEntry> = table
        .into_iter()
        .map(|(precede, follow)| ChainEntry {
            precede: precede.to_vec(),
            follow,
        })
        .collect();
    info!(
        "pitch chain: order {order}, {} contexts from {} pitches",
        entries.len(),
        history.len()
    );
    PitchChain { order, entries }
}

impl PitchChain {
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, context: &[u8]) -> Option<&ChainEntry> {
        self.entries
            .binary_search_by(|e| e.precede.as_slice().cmp(context))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Whether `next` was ever observed after `context`.
    pub fn allows(&self, context: &[u8], next: u8) -> bool {
        self.lookup(context)
            .is_some_and(|e| e.follow.contains_key(&next))
    }

    /// Read a table written by `save`. Contexts must be exactly `order`
    /// pitches long and unique, and every count must be positive.
    pub fn load(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut chain: PitchChain = serde_json::from_str(&data)?;
        chain.entries.sort_by(|a, b| a.precede.cmp(&b.precede));
        chain.validate()?;
        Ok(chain)
    }

    fn validate(&self) -> AnalysisResult<()> {
        for e in &self.entries {
            if e.precede.len() != self.order {
                return Err(AnalysisError::InvalidChain(format!(
                    "context {:?} has {} pitches, expected {}",
                    e.precede,
                    e.precede.len(),
                    self.order
                )));
            }
            if e.follow.is_empty() || e.follow.values().any(|&c| c == 0) {
                return Err(AnalysisError::InvalidChain(format!(
                    "context {:?} has an empty or zero follow count",
                    e.precede
                )));
            }
        }
        if let Some(pair) = self
            .entries
            .windows(2)
            .find(|pair| pair[0].precede == pair[1].precede)
        {
            return Err(AnalysisError::InvalidChain(format!(
                "context {:?} appears twice",
                pair[0].precede
            )));
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> AnalysisResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Generate `length` pitches.
    ///
    /// The first `min(order, length)` pitches are the context of a random
    /// entry; every later pitch was observed after the `order` pitches
    /// before it.
    pub fn generate(
        &self,
        length: usize,
        rng: &mut impl RandomSource,
        params: &MarkovParams,
    ) -> AnalysisResult<GeneratedPitches> {
        if self.entries.is_empty() {
            return Err(AnalysisError::EmptyCorpus("pitch chain has no transitions"));
        }
        // Longest sequence any walk has reached.
        let mut best: Vec<u8> = Vec::new();
        let mut backtracks = 0usize;

        for reseed in 0..=params.max_reseeds {
            let Some(i) = rng.index(self.entries.len()) else {
                break;
            };
            let seed_len = self.order.min(length);
            let mut pitches: Vec<u8> = self.entries[i].precede[..seed_len].to_vec();
            if pitches.len() > best.len() {
                best.clone_from(&pitches);
            }
            // tried[j] holds the pitches rejected at position seed_len + j.
            let mut tried: Vec<BTreeSet<u8>> = vec![BTreeSet::new()];
            let mut local_backtracks = 0usize;

            while pitches.len() < length {
                let pos = pitches.len();
                let context = &pitches[pos - self.order..];
                let slot = pos - seed_len;
                let next = self
                    .lookup(context)
                    .and_then(|e| e.sample(rng, &tried[slot]));
                match next {
                    Some(p) => {
                        pitches.push(p);
                        tried.push(BTreeSet::new());
                        if pitches.len() > best.len() {
                            best.clone_from(&pitches);
                        }
                    }
                    None => {
                        local_backtracks += 1;
                        if slot == 0 || local_backtracks > params.max_backtracks {
                            break;
                        }
                        tried.truncate(slot);
                        if let Some(dead) = pitches.pop() {
                            tried[slot - 1].insert(dead);
                        }
                    }
                }
            }

            backtracks += local_backtracks;
            if pitches.len() == length {
                return Ok(GeneratedPitches {
                    pitches,
                    reseeds: reseed,
                    backtracks,
                });
            }
            debug!(
                "markov walk stalled at {}/{length} after {local_backtracks} backtracks, reseeding",
                best.len()
            );
        }

        Err(AnalysisError::GenerationExhausted {
            position: best.len(),
            partial: best,
            attempts: params.max_reseeds + 1,
        })
    }
}

/// Generate `length` pitches from `chain` with default budgets and a
/// generator seeded from `seed`.
pub fn generate_pitches(chain: &PitchChain, length: usize, seed: u64) -> AnalysisResult<Vec<u8>> {
    let mut rng = MotetRng::new(seed);
    chain
        .generate(length, &mut rng, &MarkovParams::default())
        .map(|g| g.pitches)
}
