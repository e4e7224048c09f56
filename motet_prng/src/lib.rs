// Deterministic, portable random source for analysis and generation.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding,
// hand-rolled so output is identical on every platform and toolchain.
//
// Every randomized decision in `motet_music` (measure selection, Markov
// sampling, chord-window choice, voice assignment) takes a
// `&mut impl RandomSource` rather than reaching for a global generator. A
// session seeds one `MotetRng` and threads it through each stage, so a fixed
// seed reproduces the same song byte for byte. Tests can substitute
// `ScriptedSource` to force specific branches.
//
// **Critical constraint: determinism.** The core generator and the integer
// range helpers use no floating point. `next_f64` is provided for callers
// that want a unit-interval draw, but nothing in the sampling paths of the
// music crate depends on it.

use serde::{Deserialize, Serialize};

/// A source of uniformly distributed 64-bit words plus the derived helpers
/// the pipeline needs.
///
/// Implementors only provide `next_u64`; everything else is built on it.
pub trait RandomSource {
    /// Next raw 64-bit word.
    fn next_u64(&mut self) -> u64;

    /// Uniform `f64` in [0, 1), using the upper 53 bits.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias. Panics if `low >= high`.
    fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform `usize` in `[low, high)`. Panics if `low >= high`.
    fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Pick a uniformly random index into a collection of `len` items.
    /// Returns `None` for an empty collection.
    fn index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.range_usize(0, len))
    }

    /// `true` with probability `p`. Values outside [0, 1] saturate.
    fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Fisher-Yates shuffle in place.
    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_usize(0, i + 1);
            items.swap(i, j);
        }
    }
}

/// Xoshiro256++ generator, the workspace's default `RandomSource`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MotetRng {
    s: [u64; 4],
}

impl MotetRng {
    /// Create a generator seeded from a `u64`.
    ///
    /// SplitMix64 expands the seed into the 256-bit state, so two
    /// generators built from the same seed yield identical streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Derive an independent child generator, e.g. one per generation
    /// attempt, without disturbing the parent's stream more than one draw.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }
}

impl RandomSource for MotetRng {
    fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }
}

/// Replays a fixed list of words, cycling when exhausted.
///
/// Intended for tests that need to steer a randomized algorithm down a
/// particular branch. An empty script always yields zero.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    words: Vec<u64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(words: Vec<u64>) -> Self {
        Self { words, cursor: 0 }
    }

    /// How many words have been consumed so far.
    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedSource {
    fn next_u64(&mut self) -> u64 {
        if self.words.is_empty() {
            self.cursor += 1;
            return 0;
        }
        let word = self.words[self.cursor % self.words.len()];
        self.cursor += 1;
        word
    }
}

/// SplitMix64, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
