// src/matcher.rs

//! Heuristic matching of download-item names against catalog titles.
//!
//! Both sides are normalized first: case-folded, bracketed annotations such as
//! `[Group]`, `(2020)` or `{v2}` removed, volume/chapter markers and a trailing
//! archive extension dropped, and punctuation folded into single spaces.
//!
//! A candidate matches when it contains the whole normalized title, or when at
//! least `ceil(60%)` of the title's words appear in it as substrings. Matching
//! is substring based, so a short title word can hit inside an unrelated longer
//! word; that is accepted.

/// Archive/document extensions stripped from the end of candidate names.
const EXTENSIONS: &[&str] = &["cbz", "cbr", "cb7", "zip", "rar", "7z", "pdf", "epub"];

/// Words that introduce a volume or chapter number.
const MARKERS: &[&str] = &["vol", "volume", "vols", "ch", "chap", "chapter", "chapters"];

/// Glued marker prefixes, e.g. `v05`, `c050`, `vol2`, `ch10`.
const GLUED_MARKERS: &[&str] = &["volume", "vol", "chapter", "chap", "ch", "v", "c"];

/// A catalog title normalized once, ready to be tested against many candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatcher {
    normalized: String,
    words: Vec<String>,
    /// Set when the title is nothing but marker-like words ("C3", "V8");
    /// candidates are then compared without marker stripping.
    keep_markers: bool,
}

impl TitleMatcher {
    pub fn new(title: &str) -> Self {
        let mut normalized = normalize(title);
        let mut keep_markers = false;
        if normalized.is_empty() {
            normalized = fold(title).split_whitespace().collect::<Vec<_>>().join(" ");
            keep_markers = !normalized.is_empty();
        }
        let words = normalized.split_whitespace().map(str::to_owned).collect();
        Self {
            normalized,
            words,
            keep_markers,
        }
    }

    /// The normalized form of the title.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of title words that must be present: `ceil(words * 0.6)`.
    pub fn required_words(&self) -> usize {
        (self.words.len() * 3 + 4) / 5
    }

    /// Decide whether `candidate` plausibly names this title.
    ///
    /// A title that normalizes to nothing never matches.
    pub fn is_match(&self, candidate: &str) -> bool {
        if self.words.is_empty() {
            return false;
        }
        let candidate = self.prepare(candidate);
        if candidate.contains(self.normalized.as_str()) {
            return true;
        }
        self.matched_words(&candidate) >= self.required_words()
    }

    /// Fraction of title words found in `candidate`, in `0.0..=1.0`.
    pub fn coverage(&self, candidate: &str) -> f32 {
        if self.words.is_empty() {
            return 0.0;
        }
        let candidate = self.prepare(candidate);
        self.matched_words(&candidate) as f32 / self.words.len() as f32
    }

    /// Keep only the names that match.
    pub fn filter<'a, I>(&self, candidates: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates.into_iter().filter(|name| self.is_match(name)).collect()
    }

    /// Matching items ordered by descending coverage. Ties keep input order.
    pub fn rank<'a, T, F>(&self, items: &'a [T], name: F) -> Vec<(&'a T, f32)>
    where
        F: Fn(&T) -> &str,
    {
        let mut ranked: Vec<(&'a T, f32)> = items
            .iter()
            .filter(|item| self.is_match(name(item)))
            .map(|item| (item, self.coverage(name(item))))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    fn prepare(&self, candidate: &str) -> String {
        if self.keep_markers {
            fold(candidate)
        } else {
            normalize(candidate)
        }
    }

    fn matched_words(&self, normalized_candidate: &str) -> usize {
        self.words
            .iter()
            .filter(|word| normalized_candidate.contains(word.as_str()))
            .count()
    }
}

/// Does `candidate` plausibly refer to `title`?
pub fn matches(title: &str, candidate: &str) -> bool {
    TitleMatcher::new(title).is_match(candidate)
}

/// Fraction of `title`'s words found in `candidate`.
pub fn coverage(title: &str, candidate: &str) -> f32 {
    TitleMatcher::new(title).coverage(candidate)
}

/// Normalize a title or item name for comparison.
pub fn normalize(input: &str) -> String {
    let folded = fold(input);
    let mut words = Vec::new();
    let mut skipping_number = false;
    for token in folded.split_whitespace() {
        if MARKERS.contains(&token) || is_glued_marker(token) {
            skipping_number = true;
            continue;
        }
        if skipping_number && is_number(token) {
            continue;
        }
        skipping_number = false;
        words.push(token);
    }
    words.join(" ")
}

/// Case-fold, drop bracketed groups and the extension, turn punctuation into spaces.
fn fold(input: &str) -> String {
    // uppercasing first folds expanding forms, e.g. "ß" and "SS" both end up "ss"
    let lowered = input.to_uppercase().to_lowercase();
    let stripped = strip_bracketed(&lowered);
    strip_extension(stripped.trim())
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}

fn strip_bracketed(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        let open = chars[i];
        if let Some(close) = closing_bracket(open) {
            if let Some(end) = find_closing(&chars, i, open, close) {
                i = end + 1;
                continue;
            }
        }
        out.push(open);
        i += 1;
    }
    out
}

fn closing_bracket(c: char) -> Option<char> {
    match c {
        '[' => Some(']'),
        '(' => Some(')'),
        '{' => Some('}'),
        _ => None,
    }
}

fn find_closing(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &c) in chars[start..].iter().enumerate() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(start + offset);
            }
        }
    }
    None
}

fn strip_extension(input: &str) -> &str {
    if let Some((stem, ext)) = input.rsplit_once('.') {
        if EXTENSIONS.contains(&ext) {
            return stem;
        }
    }
    input
}

fn is_glued_marker(token: &str) -> bool {
    GLUED_MARKERS.iter().any(|prefix| {
        token
            .strip_prefix(prefix)
            .is_some_and(|rest| is_number(rest))
    })
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}
