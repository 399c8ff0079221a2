use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

const WORDS: &[&str] = &[
    "falcon", "ember", "harbor", "comet", "willow", "summit", "quartz", "meadow",
    "drift", "lantern", "cedar", "ripple", "onyx", "breeze", "anchor", "tundra",
];

const COLORS: &[&str] = &[
    "red", "orange", "yellow", "green", "blue", "indigo", "violet",
];

static COLOR_CURSOR: AtomicUsize = AtomicUsize::new(0);

/// Cosmetic display label for a round: `"{counter}. {word}|{color}"`.
///
/// Unique enough for display; nothing depends on it beyond that.
pub fn round_label(counter: u32) -> String {
    let mut rng = rand::thread_rng();
    let word = WORDS.choose(&mut rng).copied().unwrap_or("round");
    let color = COLORS[COLOR_CURSOR.fetch_add(1, Ordering::Relaxed) % COLORS.len()];
    format!("{counter}. {word}|{color}")
}
