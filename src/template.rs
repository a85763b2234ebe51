//! Replacement templates and buffer substitution.

use crate::matcher::{MatchSpan, Matcher};
use std::ops::Range;

/// One piece of a compiled replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Copied verbatim.
    Literal(Vec<u8>),
    /// Replaced by capture group `n` (0 is the whole match).
    BackReference(usize),
}

/// A compiled replacement string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `replacement`, treating `marker` followed by digits as a
    /// back-reference, `marker&` as the whole match and `marker marker` as
    /// one literal marker. Any other occurrence of the marker is kept as is.
    pub fn parse(replacement: &[u8], marker: &[u8]) -> Self {
        let mut segments = Vec::new();
        let mut literal = Vec::new();
        let mut i = 0;

        while i < replacement.len() {
            if !marker.is_empty() && replacement[i..].starts_with(marker) {
                let after = i + marker.len();
                let rest = &replacement[after..];
                let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();

                let reference = if digits > 0 {
                    Some((parse_index(&rest[..digits]), digits))
                } else if rest.first() == Some(&b'&') {
                    Some((0, 1))
                } else {
                    None
                };

                if let Some((index, consumed)) = reference {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::BackReference(index));
                    i = after + consumed;
                    continue;
                }
                if rest.starts_with(marker) {
                    literal.extend_from_slice(marker);
                    i = after + marker.len();
                    continue;
                }
            }
            literal.push(replacement[i]);
            i += 1;
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Highest group index referenced, if any.
    pub fn max_group(&self) -> Option<usize> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::BackReference(n) => Some(*n),
                Segment::Literal(_) => None,
            })
            .max()
    }

    /// Appends the expansion of this template for `span` to `out`.
    ///
    /// Groups that did not participate, or that the pattern does not have,
    /// expand to nothing.
    pub fn expand_into(&self, span: &MatchSpan, buffer: &[u8], out: &mut Vec<u8>) {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.extend_from_slice(text),
                Segment::BackReference(index) => {
                    if let Some(range) = span.group(*index) {
                        out.extend_from_slice(&buffer[range]);
                    }
                }
            }
        }
    }

    pub fn expand(&self, span: &MatchSpan, buffer: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        self.expand_into(span, buffer, &mut out);
        out
    }
}

fn parse_index(digits: &[u8]) -> usize {
    digits
        .iter()
        .fold(0usize, |n, d| n.saturating_mul(10).saturating_add(usize::from(d - b'0')))
}

/// A replaced region: `old` in the input buffer, `new` in the output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub old: Range<usize>,
    pub new: Range<usize>,
}

/// The result of substituting every match of one pattern in a buffer.
#[derive(Debug, Clone)]
pub struct Substitution {
    pub output: Vec<u8>,
    pub edits: Vec<Edit>,
}

impl Substitution {
    pub fn matches(&self) -> usize {
        self.edits.len()
    }

    /// Maps ranges of the input buffer onto the output buffer.
    ///
    /// Ranges untouched by any edit are shifted; ranges an edit overlaps are
    /// dropped, and the output range of every edit is added. The result is
    /// sorted and merged.
    pub fn carry_ranges(&self, ranges: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut carried = Vec::with_capacity(ranges.len() + self.edits.len());
        let mut j = 0;
        let mut delta: isize = 0;

        for range in ranges {
            while j < self.edits.len() && self.edits[j].old.end <= range.start {
                let edit = &self.edits[j];
                delta += edit.new.len() as isize - edit.old.len() as isize;
                j += 1;
            }
            let overlapped = self.edits[j..]
                .iter()
                .take_while(|e| e.old.start < range.end)
                .any(|e| range.start < e.old.end);
            if !overlapped {
                let start = (range.start as isize + delta) as usize;
                carried.push(start..start + range.len());
            }
        }

        carried.extend(self.edits.iter().map(|e| e.new.clone()));
        merge_ranges(carried)
    }
}

/// Replaces every match of `matcher` in `buffer` with `template`.
pub fn substitute(matcher: &Matcher, template: &Template, buffer: &[u8]) -> Substitution {
    let spans = matcher.find_all(buffer);
    let mut output = Vec::with_capacity(buffer.len());
    let mut edits = Vec::with_capacity(spans.len());
    let mut copied = 0;

    for span in &spans {
        output.extend_from_slice(&buffer[copied..span.start]);
        let new_start = output.len();
        template.expand_into(span, buffer, &mut output);
        edits.push(Edit {
            old: span.start..span.end,
            new: new_start..output.len(),
        });
        copied = span.end;
    }
    output.extend_from_slice(&buffer[copied..]);

    Substitution { output, edits }
}

fn merge_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start < last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}
