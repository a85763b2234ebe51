//! Pattern matching over byte buffers.
//!
//! A [`Matcher`] is either an exact byte search or a compiled `regex::bytes`
//! expression. Case folding is fixed when the matcher is built: a
//! case-insensitive literal is compiled to an escaped expression so both
//! kinds fold the same way. The whole-word constraint holds for both engines,
//! so callers never need to know which one they hold.
//!
//! Word characters are the ASCII bytes `[0-9A-Za-z_]`. Content is handled as
//! bytes without assuming an encoding, so a byte of a multi-byte UTF-8
//! character is never part of a word.

use regex::bytes::{CaptureLocations, Regex, RegexBuilder};
use std::ops::Range;

/// Matches one byte that is not a word byte, or the end of the buffer.
const WORD_END: &str = r"(\z|(?-u:[^0-9A-Za-z_]))";

/// A compiled pattern.
#[derive(Debug, Clone)]
pub struct Matcher {
    engine: Engine,
    whole_word: bool,
    groups: usize,
}

/// The concrete search engine behind a [`Matcher`].
#[derive(Debug, Clone)]
pub enum Engine {
    /// Exact, case-sensitive substring search.
    Literal { needle: Vec<u8> },
    /// A regular expression. Case folding is part of the compiled expression.
    /// In whole-word mode the expression ends with a capture group after all
    /// user groups that asserts the end boundary; `end_group` is its index.
    Regex { regex: Regex, end_group: Option<usize> },
}

/// One match of a pattern in a buffer.
///
/// `captures[0]` is always the whole match; `captures[i]` is group `i`, or
/// `None` if that group did not take part in the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Option<(usize, usize)>>,
}

impl MatchSpan {
    /// Byte range of capture group `index`, if it participated in the match.
    pub fn group(&self, index: usize) -> Option<Range<usize>> {
        self.captures
            .get(index)
            .copied()
            .flatten()
            .map(|(start, end)| start..end)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Matcher {
    /// Builds an exact-match matcher. No byte of `needle` has special meaning.
    ///
    /// With `ignore_case` the needle is escaped and compiled as an expression,
    /// so it folds exactly like [`Matcher::regex`].
    pub fn literal(needle: impl Into<Vec<u8>>, ignore_case: bool, whole_word: bool) -> Result<Self, regex::Error> {
        let needle = needle.into();
        if ignore_case {
            return Self::compile(&escape_bytes(&needle), true, whole_word);
        }
        Ok(Self {
            engine: Engine::Literal { needle },
            whole_word,
            groups: 0,
        })
    }

    /// Compiles `pattern` as a regular expression.
    pub fn regex(pattern: &str, ignore_case: bool, whole_word: bool) -> Result<Self, regex::Error> {
        Self::compile(pattern, ignore_case, whole_word)
    }

    fn compile(pattern: &str, ignore_case: bool, whole_word: bool) -> Result<Self, regex::Error> {
        // Checked on its own so errors point at the user's pattern.
        let plain = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()?;
        let groups = plain.captures_len() - 1;
        if !whole_word {
            return Ok(Self {
                engine: Engine::Regex {
                    regex: plain,
                    end_group: None,
                },
                whole_word,
                groups,
            });
        }

        let regex = RegexBuilder::new(&format!("(?:{pattern}){WORD_END}"))
            .case_insensitive(ignore_case)
            .build()?;
        Ok(Self {
            engine: Engine::Regex {
                regex,
                end_group: Some(groups + 1),
            },
            whole_word,
            groups,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_whole_word(&self) -> bool {
        self.whole_word
    }

    /// Number of explicit capture groups (not counting the whole match).
    pub fn group_count(&self) -> usize {
        self.groups
    }

    /// Returns all matches in `buffer`, left to right and non-overlapping.
    ///
    /// The full list is materialized because rewriting a buffer needs every
    /// span up front. Scanning resumes at the end of each accepted match; an
    /// empty match advances the scan by one byte, and an empty match directly
    /// at the end of the previous match is skipped.
    ///
    /// In whole-word mode a candidate whose start follows a word byte is
    /// rejected and the scan resumes one byte later; no match starting there
    /// could be accepted. The end boundary is checked by the engine, which
    /// picks the preferred match ending at a boundary.
    pub fn find_all(&self, buffer: &[u8]) -> Vec<MatchSpan> {
        let mut spans = Vec::new();
        let mut locations = match &self.engine {
            Engine::Regex { regex, .. } => Some(regex.capture_locations()),
            Engine::Literal { .. } => None,
        };
        let mut pos = 0;
        let mut last_end: Option<usize> = None;

        while pos <= buffer.len() {
            let Some(span) = self.candidate_at(buffer, pos, locations.as_mut()) else {
                break;
            };

            if self.whole_word && !starts_word(buffer, span.start) {
                pos = span.start + 1;
                continue;
            }
            if span.is_empty() && last_end == Some(span.start) {
                pos = span.start + 1;
                continue;
            }

            pos = if span.is_empty() { span.end + 1 } else { span.end };
            last_end = Some(span.end);
            spans.push(span);
        }

        spans
    }

    /// Returns `true` if `buffer` contains at least one acceptable match.
    pub fn is_match(&self, buffer: &[u8]) -> bool {
        !self.find_all(buffer).is_empty()
    }

    /// Finds the leftmost candidate starting at or after `pos` that satisfies
    /// the end boundary in whole-word mode.
    fn candidate_at(
        &self,
        buffer: &[u8],
        pos: usize,
        locations: Option<&mut CaptureLocations>,
    ) -> Option<MatchSpan> {
        match &self.engine {
            Engine::Literal { needle } => {
                let mut from = pos;
                loop {
                    let start = find_literal(buffer, needle, from)?;
                    let end = start + needle.len();
                    if !self.whole_word || ends_word(buffer, end) {
                        return Some(MatchSpan {
                            start,
                            end,
                            captures: vec![Some((start, end))],
                        });
                    }
                    from = start + 1;
                }
            }
            Engine::Regex { regex, end_group } => {
                let locations = locations?;
                let found = regex.captures_read_at(locations, buffer, pos)?;
                let start = found.start();
                let end = match end_group {
                    Some(group) => locations.get(*group).map_or(found.end(), |(at, _)| at),
                    None => found.end(),
                };
                let mut captures: Vec<_> = (0..=self.groups).map(|i| locations.get(i)).collect();
                captures[0] = Some((start, end));
                Some(MatchSpan {
                    start,
                    end,
                    captures,
                })
            }
        }
    }
}

fn find_literal(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

/// Escapes `needle` for use as an expression matching exactly its bytes.
/// Bytes outside valid UTF-8 become `(?-u:\xHH)`.
fn escape_bytes(needle: &[u8]) -> String {
    let mut pattern = String::with_capacity(needle.len());
    for chunk in needle.utf8_chunks() {
        pattern.push_str(&regex::escape(chunk.valid()));
        for byte in chunk.invalid() {
            pattern.push_str(&format!(r"(?-u:\x{byte:02X})"));
        }
    }
    pattern
}

/// A byte that counts as part of a word for whole-word matching.
pub fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// `true` if the byte before `start` is not a word byte. The buffer start
/// always satisfies the boundary.
fn starts_word(buffer: &[u8], start: usize) -> bool {
    start
        .checked_sub(1)
        .and_then(|i| buffer.get(i))
        .is_none_or(|&b| !is_word_byte(b))
}

/// `true` if the byte at `end` is not a word byte. The buffer end always
/// satisfies the boundary.
fn ends_word(buffer: &[u8], end: usize) -> bool {
    buffer.get(end).is_none_or(|&b| !is_word_byte(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(matcher: &Matcher, buffer: &'a [u8]) -> Vec<&'a [u8]> {
        matcher
            .find_all(buffer)
            .iter()
            .map(|s| &buffer[s.start..s.end])
            .collect()
    }

    #[test]
    fn test_literal_ignores_metacharacters() {
        let matcher = Matcher::literal("fo+o", false, false).unwrap();
        assert_eq!(texts(&matcher, b"fo+o fooo"), vec![b"fo+o".as_slice()]);
        assert!(!matcher.is_match(b"fooo"));
    }

    #[test]
    fn test_regex_interprets_metacharacters() {
        let matcher = Matcher::regex("fo+", false, false).unwrap();
        let spans = matcher.find_all(b"fooo baz fo");
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (0, 4));
        assert_eq!((spans[1].start, spans[1].end), (9, 11));
    }

    #[test]
    fn test_case_folding_is_symmetric() {
        for matcher in [
            Matcher::literal("foo", true, false).unwrap(),
            Matcher::regex("foo", true, false).unwrap(),
        ] {
            assert_eq!(texts(&matcher, b"Foo FOO foo").len(), 3);
        }
        assert!(!Matcher::literal("foo", false, false).unwrap().is_match(b"Foo"));
    }

    #[test]
    fn test_case_folding_is_the_same_for_non_ascii() {
        for (needle, haystack) in [("é", "É é"), ("straße", "STRASSE Straße"), ("Ω", "ω")] {
            let literal = Matcher::literal(needle, true, false).unwrap();
            let regex = Matcher::regex(needle, true, false).unwrap();
            assert_eq!(
                texts(&literal, haystack.as_bytes()),
                texts(&regex, haystack.as_bytes()),
                "{needle}"
            );
        }
        assert_eq!(texts(&Matcher::literal("é", true, false).unwrap(), "É".as_bytes()).len(), 1);
    }

    #[test]
    fn test_case_insensitive_literal_keeps_metacharacters_and_raw_bytes() {
        let matcher = Matcher::literal("A.B", true, false).unwrap();
        assert_eq!(texts(&matcher, b"a.b axb"), vec![b"a.b".as_slice()]);
        assert_eq!(matcher.group_count(), 0);

        let raw = Matcher::literal(b"x\xe9y".to_vec(), true, false).unwrap();
        assert_eq!(texts(&raw, b"X\xe9Y"), vec![b"X\xe9Y".as_slice()]);
        let latin1 = Matcher::literal(vec![b'a', 0xE9], true, false).unwrap();
        assert_eq!(texts(&latin1, &[b'A', 0xE9, b' ']), vec![[b'A', 0xE9].as_slice()]);
    }

    #[test]
    fn test_whole_word_picks_an_alternative_ending_at_a_boundary() {
        let matcher = Matcher::regex("foo|foo_bar", false, true).unwrap();
        assert_eq!(texts(&matcher, b"foo_bar"), vec![b"foo_bar".as_slice()]);
        assert_eq!(texts(&matcher, b"foo foo_bar foo_barx"), vec![b"foo".as_slice(), b"foo_bar"]);

        let lazy = Matcher::regex("a+?", false, true).unwrap();
        assert_eq!(texts(&lazy, b"aaa b"), vec![b"aaa".as_slice()]);
    }

    #[test]
    fn test_whole_word_keeps_user_groups() {
        let matcher = Matcher::regex("(f)(o+)", true, true).unwrap();
        assert_eq!(matcher.group_count(), 2);
        let spans = matcher.find_all(b"xfoo FOO;");
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (5, 8));
        assert_eq!(spans[0].captures.len(), 3);
        assert_eq!(spans[0].group(2), Some(6..8));
    }

    #[test]
    fn test_word_bytes_are_ascii() {
        // A multi-byte letter next to the match is not a word byte.
        for matcher in [
            Matcher::literal("foo", false, true).unwrap(),
            Matcher::regex("foo", false, true).unwrap(),
        ] {
            assert_eq!(matcher.find_all("éfoo fooé".as_bytes()).len(), 2);
            assert!(!matcher.is_match(b"foo9 _foo"));
        }
    }

    #[test]
    fn test_whole_word_applies_to_both_engines() {
        let input = b"foo foo_bar foo2 barfoo foo; foo_ _foo";
        for matcher in [
            Matcher::literal("foo", false, true).unwrap(),
            Matcher::regex("foo", false, true).unwrap(),
        ] {
            let spans = matcher.find_all(input);
            let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
            assert_eq!(starts, vec![0, 24]);
        }
    }

    #[test]
    fn test_whole_word_retries_inside_rejected_candidate() {
        // The candidate at 0 ("aa" followed by "a") fails, the one at 1 succeeds.
        let matcher = Matcher::literal("aa", false, true).unwrap();
        let spans = matcher.find_all(b"aaa aa");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 4);
    }

    #[test]
    fn test_empty_matches_terminate() {
        let matcher = Matcher::regex("a*", false, false).unwrap();
        let spans = matcher.find_all(b"baaac");
        let ranges: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 0), (1, 4), (5, 5)]);

        let empty = Matcher::literal("", false, false).unwrap();
        assert_eq!(empty.find_all(b"ab").len(), 3);
    }

    #[test]
    fn test_captures_are_reported() {
        let matcher = Matcher::regex("id=([0-9]+)(x)?", false, false).unwrap();
        let spans = matcher.find_all(b"id=42");
        assert_eq!(matcher.group_count(), 2);
        assert_eq!(spans[0].group(1), Some(3..5));
        assert_eq!(spans[0].group(2), None);
        assert_eq!(spans[0].group(7), None);
    }

    #[test]
    fn test_spans_are_disjoint_and_increasing() {
        let matcher = Matcher::literal("aa", false, false).unwrap();
        let spans = matcher.find_all(b"aaaaa");
        let ranges: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 2), (2, 4)]);
    }
}
