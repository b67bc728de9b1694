// Playlist range codec
//
// Converts a sparse selection of 1-based playlist indices into the
// compact comma/dash range syntax the engine consumes, e.g.
// {1,2,3,5,6,7,10} of 10 -> "1-3,5-7,10".

use std::collections::BTreeSet;

use crate::errors::FetchError;

/// Outcome of encoding a selection against a playlist of known size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistRange {
    /// Every item selected: no restriction is passed to the engine.
    Full,
    /// Nothing selected. Invalid for submission; callers must reject it
    /// before a job is built.
    Empty,
    /// Compact 1-based range string, e.g. "1-3,5-7,10".
    Items(String),
}

impl PlaylistRange {
    /// The expression to hand to the engine, if any restriction applies.
    pub fn as_expr(&self) -> Option<&str> {
        match self {
            PlaylistRange::Items(expr) => Some(expr),
            _ => None,
        }
    }
}

/// Encode a set of selected 1-based indices into a playlist range.
///
/// Indices are expected to be a subset of 1..=total. Consecutive runs
/// coalesce into `start-end` tokens; lone indices stay bare.
pub fn encode_selection(selected: &BTreeSet<u32>, total: u32) -> PlaylistRange {
    if selected.is_empty() {
        return PlaylistRange::Empty;
    }
    if selected.len() as u32 == total {
        return PlaylistRange::Full;
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut run: Option<(u32, u32)> = None;

    for idx in selected.iter().copied() {
        run = match run {
            None => Some((idx, idx)),
            Some((start, end)) if idx == end + 1 => Some((start, idx)),
            Some((start, end)) => {
                tokens.push(format_run(start, end));
                Some((idx, idx))
            }
        };
    }
    if let Some((start, end)) = run {
        tokens.push(format_run(start, end));
    }

    PlaylistRange::Items(tokens.join(","))
}

fn format_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

/// Largest number of indices `decode_selection` will expand. Real
/// playlists are orders of magnitude smaller; anything past this is a
/// typo or abuse, not a selection.
const MAX_DECODED_INDICES: u64 = 100_000;

/// Check that a range expression is well-formed without expanding it.
/// This is the pre-submission validator: it runs in time proportional
/// to the expression length, never to the span it covers.
pub fn validate_range_expr(expr: &str) -> Result<(), FetchError> {
    parse_tokens(expr).map(|_| ())
}

/// Decode a range expression back into the set of indices it covers.
///
/// The engine consumes the string form directly; decoding exists for
/// round-trip checks and bounded expansion. Expressions spanning more
/// than `MAX_DECODED_INDICES` indices are rejected instead of
/// materialized.
pub fn decode_selection(expr: &str) -> Result<BTreeSet<u32>, FetchError> {
    let tokens = parse_tokens(expr)?;

    let span: u64 = tokens
        .iter()
        .map(|(start, end)| u64::from(end - start) + 1)
        .sum();
    if span > MAX_DECODED_INDICES {
        return Err(FetchError::Parse(format!(
            "Range covers {} indices (limit {})",
            span, MAX_DECODED_INDICES
        )));
    }

    let mut selected = BTreeSet::new();
    for (start, end) in tokens {
        selected.extend(start..=end);
    }
    Ok(selected)
}

/// Parse an expression into (start, end) pairs without expanding them.
fn parse_tokens(expr: &str) -> Result<Vec<(u32, u32)>, FetchError> {
    let mut tokens = Vec::new();

    for token in expr.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(FetchError::Parse(format!("Empty token in range: {:?}", expr)));
        }

        match token.split_once('-') {
            None => {
                let idx = parse_index(token)?;
                tokens.push((idx, idx));
            }
            Some((start, end)) => {
                let start = parse_index(start)?;
                let end = parse_index(end)?;
                if start > end {
                    return Err(FetchError::Parse(format!("Inverted range: {:?}", token)));
                }
                tokens.push((start, end));
            }
        }
    }

    Ok(tokens)
}

fn parse_index(token: &str) -> Result<u32, FetchError> {
    let idx: u32 = token
        .trim()
        .parse()
        .map_err(|_| FetchError::Parse(format!("Bad playlist index: {:?}", token)))?;
    if idx == 0 {
        return Err(FetchError::Parse("Playlist indices are 1-based".to_string()));
    }
    Ok(idx)
}
