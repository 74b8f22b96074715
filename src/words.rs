//! Identifier splitting and key naming.
//!
//! `HTTPPort` becomes `["HTTP", "Port"]`, `APIKey` becomes `["API", "Key"]`,
//! `Type2` becomes `["Type", "2"]` and `pool_size` becomes `["pool", "size"]`.
//! The split only looks at the Unicode category of each character, never at
//! the locale, so the same identifier always yields the same keys.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Lower,
    Upper,
    Digit,
    /// Alphabetic but caseless (CJK and friends).
    Letter,
    Separator,
}

fn classify(c: char) -> Class {
    if c.is_lowercase() {
        Class::Lower
    } else if c.is_uppercase() {
        Class::Upper
    } else if c.is_numeric() {
        Class::Digit
    } else if c.is_alphabetic() {
        Class::Letter
    } else {
        Class::Separator
    }
}

/// Split an identifier into word tokens.
///
/// A token boundary sits at every change of character class. An uppercase
/// run directly followed by a lowercase run hands its last character over,
/// so acronyms stay whole (`PDFLoader` → `PDF`, `Loader`). Separator
/// characters (`_`, `-`, spaces, punctuation) never appear in the output.
pub fn split_words(ident: &str) -> Vec<String> {
    let mut runs: Vec<(Class, Vec<char>)> = Vec::new();

    for c in ident.chars() {
        let class = classify(c);
        match runs.last_mut() {
            Some((last, run)) if *last == class => run.push(c),
            _ => runs.push((class, vec![c])),
        }
    }

    for i in 1..runs.len() {
        let (head, tail) = runs.split_at_mut(i);
        let (prev_class, prev) = &mut head[i - 1];
        let (class, run) = &mut tail[0];
        // A lone capital empties its run here; empty runs are dropped below.
        if *prev_class == Class::Upper
            && *class == Class::Lower
            && let Some(c) = prev.pop()
        {
            run.insert(0, c);
        }
    }

    runs.into_iter()
        .filter(|(class, run)| *class != Class::Separator && !run.is_empty())
        .map(|(_, run)| run.into_iter().collect())
        .collect()
}

/// Join words into an environment variable name: `["http", "Port"]` → `HTTP_PORT`.
pub fn env_name<S: AsRef<str>>(words: &[S]) -> String {
    join(words).to_uppercase()
}

/// Join words into a flag or file key: `["HTTP", "Port"]` → `http_port`.
pub fn key_name<S: AsRef<str>>(words: &[S]) -> String {
    join(words).to_lowercase()
}

fn join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("_")
}
