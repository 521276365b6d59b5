use std::fmt::{Display, Formatter};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

pub const CACHE_TIME_SECONDS: u32 = 1;

pub const DEFAULT_ADD_SPACES_TEXT: &str = "🌌 I need some space!";
pub const DEFAULT_RANDOMIZE_CASE_TEXT: &str = "The quick brown fox jumps over the lazy dog.";
pub const DEFAULT_TYPO_TEXT: &str = "✏️ feat: add typo";
pub const DEFAULT_ME_TEXT: &str = "doesn't know what to say. 🤐";
pub const DEFAULT_REPEAT_TEXT: &str = "I repeat!";
pub const DEFAULT_REVERSE_TEXT: &str = "上海自来水";
pub const DEFAULT_MIRROR_TEXT: &str = "上海自来水";

const SCRAMBLE_MIN_ROUNDS: usize = 10;
const SCRAMBLE_ROUND_SPAN: usize = 10;
const SCALARS_PER_EXTRA_SWAP: usize = 20;

/// Source of uniform randomness for the seeded transforms.
///
/// Every [`rand::RngCore`] is a `RandomSource`, so hosts pass
/// `rand::thread_rng()` and tests pass a seeded `StdRng`.
pub trait RandomSource {
    /// Uniform integer in `[0, bound)`. `bound` must be non-zero.
    fn below(&mut self, bound: usize) -> usize;

    /// 64 uniform random bits.
    fn next_word(&mut self) -> u64;
}

impl<R> RandomSource for R
where
    R: RngCore,
{
    fn below(&mut self, bound: usize) -> usize {
        self.gen_range(0..bound)
    }

    fn next_word(&mut self) -> u64 {
        self.next_u64()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CardKind {
    AddSpaces,
    RandomizeCase,
    CreateTypos,
    ScrambleLetters,
    GenerateMe,
    Repeat,
    Reverse,
    Mirror,
    ComboSpacesRepeat,
    ComboRandomcaseSpaces,
}

impl CardKind {
    /// Card kinds in answer order. Clients select cards by position, so this
    /// order only ever grows at the end.
    pub const ALL: [Self; 10] = [
        Self::AddSpaces,
        Self::RandomizeCase,
        Self::CreateTypos,
        Self::ScrambleLetters,
        Self::GenerateMe,
        Self::Repeat,
        Self::Reverse,
        Self::Mirror,
        Self::ComboSpacesRepeat,
        Self::ComboRandomcaseSpaces,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddSpaces => "addSpaces",
            Self::RandomizeCase => "randomizeCase",
            Self::CreateTypos => "createTypos",
            Self::ScrambleLetters => "scrambleLetters",
            Self::GenerateMe => "generateMe",
            Self::Repeat => "repeat",
            Self::Reverse => "reverse",
            Self::Mirror => "mirror",
            Self::ComboSpacesRepeat => "comboSpacesRepeat",
            Self::ComboRandomcaseSpaces => "comboRandomcaseSpaces",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::AddSpaces => "🌌 I need some space!",
            Self::RandomizeCase => "🦘 Jumpy Letters",
            Self::CreateTypos => "✏️ feat: add typo",
            Self::ScrambleLetters => "✍️ Scramble Letters",
            Self::GenerateMe => "🤳 What the hell am I doing?",
            Self::Repeat => "🔂 Can you repeat what I just said?",
            Self::Reverse => "🔀 上海自来水",
            Self::Mirror => "🪞 上海自来水来自海上",
            Self::ComboSpacesRepeat => "🛠️ Combo: Spaces + Repeat",
            Self::ComboRandomcaseSpaces => "🛠️ Combo: Random Case + Spaces",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::AddSpaces => "Add extra spaces between each character in the message.",
            Self::RandomizeCase => "Randomly change letter case in the message.",
            Self::CreateTypos => "Randomly change the order of characters in the message.",
            Self::ScrambleLetters => "Recursively add typos.",
            Self::GenerateMe => "Tell everyone what you're doing (/me).",
            Self::Repeat => "Repeat the message three times.",
            Self::Reverse => "Reverse the order of characters in the message.",
            Self::Mirror => "Mirror the message in reverse order.",
            Self::ComboSpacesRepeat => {
                "Add extra spaces between each character. Then repeat the message three times."
            }
            Self::ComboRandomcaseSpaces => {
                "Randomly change letter case. Then add extra spaces between each character."
            }
        }
    }

    /// Compute this card's message text for `input`.
    ///
    /// Combos run the inner transform on the raw query text, so an empty query
    /// picks up the inner transform's default.
    pub fn render<R>(self, input: &QueryInput, rng: &mut R) -> String
    where
        R: RandomSource + ?Sized,
    {
        let text = input.query_text.as_str();
        match self {
            Self::AddSpaces => add_spaces(text),
            Self::RandomizeCase => randomize_case(text, rng),
            Self::CreateTypos => create_typos(text, 1, rng),
            Self::ScrambleLetters => scramble_letters(text, rng),
            Self::GenerateMe => generate_me(&input.sender_first_name, text),
            Self::Repeat => repeat(text),
            Self::Reverse => reverse(text),
            Self::Mirror => mirror(text),
            Self::ComboSpacesRepeat => repeat(&add_spaces(text)),
            Self::ComboRandomcaseSpaces => add_spaces(&randomize_case(text, rng)),
        }
    }
}

impl Display for CardKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct QueryInput {
    pub query_id: String,
    pub sender_first_name: String,
    pub query_text: String,
}

impl QueryInput {
    #[must_use]
    pub fn new(
        query_id: impl Into<String>,
        sender_first_name: impl Into<String>,
        query_text: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            sender_first_name: sender_first_name.into(),
            query_text: query_text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ResultCard {
    pub id: CardKind,
    pub title: String,
    pub description: String,
    pub message_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CardList {
    pub cards: Vec<ResultCard>,
    pub cache_time: u32,
}

impl CardList {
    #[must_use]
    pub fn get(&self, kind: CardKind) -> Option<&ResultCard> {
        self.cards.iter().find(|card| card.id == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultCard> {
        self.cards.iter()
    }
}

impl<'a> IntoIterator for &'a CardList {
    type Item = &'a ResultCard;
    type IntoIter = std::slice::Iter<'a, ResultCard>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Build the answer cards for one inline query, in [`CardKind::ALL`] order.
pub fn assemble<R>(input: &QueryInput, rng: &mut R) -> CardList
where
    R: RandomSource + ?Sized,
{
    let cards = CardKind::ALL
        .into_iter()
        .map(|kind| ResultCard {
            id: kind,
            title: kind.title().to_string(),
            description: kind.description().to_string(),
            message_text: kind.render(input, rng),
        })
        .collect();

    CardList { cards, cache_time: CACHE_TIME_SECONDS }
}

fn or_default<'a>(text: &'a str, default: &'a str) -> &'a str {
    if text.is_empty() {
        default
    } else {
        text
    }
}

/// One space after every ASCII scalar, a space on both sides of everything
/// else. Wide glyphs need the extra padding to look spaced out.
#[must_use]
pub fn add_spaces(text: &str) -> String {
    let text = or_default(text, DEFAULT_ADD_SPACES_TEXT);
    let mut out = String::with_capacity(text.len() * 3);

    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
            out.push(' ');
        } else {
            out.push(' ');
            out.push(ch);
            out.push(' ');
        }
    }

    out.trim().to_string()
}

/// Flip each basic-Latin letter's case with probability one half.
///
/// One 64-bit word from `rng` covers up to 64 letters, least significant bit
/// first.
pub fn randomize_case<R>(text: &str, rng: &mut R) -> String
where
    R: RandomSource + ?Sized,
{
    let text = or_default(text, DEFAULT_RANDOMIZE_CASE_TEXT);
    let mut bits = 0_u64;
    let mut remaining = 0_u32;

    text.chars()
        .map(|ch| {
            if !ch.is_ascii_alphabetic() {
                return ch;
            }

            if remaining == 0 {
                bits = rng.next_word();
                remaining = u64::BITS;
            }

            let flip = bits & 1 == 1;
            bits >>= 1;
            remaining -= 1;

            match (flip, ch.is_ascii_lowercase()) {
                (false, _) => ch,
                (true, true) => ch.to_ascii_uppercase(),
                (true, false) => ch.to_ascii_lowercase(),
            }
        })
        .collect()
}

/// Swap random adjacent scalars `(1 + n / 20) * rounds` times.
///
/// Swaps may undo each other; the result is only guaranteed to be a
/// permutation of the input.
pub fn create_typos<R>(text: &str, rounds: usize, rng: &mut R) -> String
where
    R: RandomSource + ?Sized,
{
    let text = or_default(text, DEFAULT_TYPO_TEXT);
    let mut chars = text.chars().collect::<Vec<_>>();

    if chars.len() < 2 {
        return text.to_string();
    }

    let swaps = (1 + chars.len() / SCALARS_PER_EXTRA_SWAP) * rounds;
    for _ in 0..swaps {
        let pos = rng.below(chars.len() - 1);
        chars.swap(pos, pos + 1);
    }

    chars.into_iter().collect()
}

/// [`create_typos`] with a round count drawn from `10..20`.
pub fn scramble_letters<R>(text: &str, rng: &mut R) -> String
where
    R: RandomSource + ?Sized,
{
    let rounds = SCRAMBLE_MIN_ROUNDS + rng.below(SCRAMBLE_ROUND_SPAN);
    create_typos(text, rounds, rng)
}

/// Scalar-wise reversal. Combining marks are not kept with their base.
#[must_use]
pub fn reverse(text: &str) -> String {
    or_default(text, DEFAULT_REVERSE_TEXT).chars().rev().collect()
}

/// Palindrome around the last scalar: `ABCD` becomes `ABCDCBA`.
#[must_use]
pub fn mirror(text: &str) -> String {
    let text = or_default(text, DEFAULT_MIRROR_TEXT);
    let mut out = String::with_capacity(text.len() * 2);
    out.push_str(text);
    out.extend(text.chars().rev().skip(1));
    out
}

#[must_use]
pub fn repeat(text: &str) -> String {
    let text = or_default(text, DEFAULT_REPEAT_TEXT);
    format!("{text}\n{text}\n{text}")
}

/// IRC-style `/me` action line.
#[must_use]
pub fn generate_me(first_name: &str, text: &str) -> String {
    let text = or_default(text, DEFAULT_ME_TEXT);
    format!("* {first_name} {text}")
}
