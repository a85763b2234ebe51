use crate::errors::{Error, Result};
use crate::matcher::Matcher;
use crate::template::{Substitution, Template, substitute};
use std::fmt;
use std::ops::Range;
use tracing::warn;

/// Tokens that structure a rule string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSyntax {
    /// Splits a rule into pattern and replacement. Defaults to `=`.
    pub separator: String,
    /// Introduces a back-reference in the replacement. Defaults to `$`.
    pub marker: String,
}

impl Default for RuleSyntax {
    fn default() -> Self {
        Self {
            separator: "=".to_string(),
            marker: "$".to_string(),
        }
    }
}

/// How the pattern half of a rule is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFlags {
    /// Match the pattern as an exact byte string instead of a regex.
    pub literal: bool,
    pub ignore_case: bool,
    /// Only accept matches not surrounded by word characters.
    pub whole_word: bool,
}

/// A compiled pattern/replacement pair.
#[derive(Debug)]
pub struct Rule {
    pattern: String,
    replacement: String,
    flags: RuleFlags,
    matcher: Matcher,
    template: Template,
    warnings: Vec<Error>,
}

impl Rule {
    /// Compiles a `PATTERN<sep>REPLACEMENT` rule string.
    ///
    /// The first separator not preceded by an odd number of backslashes splits
    /// the rule. Escaped separators in either half become plain separators.
    pub fn parse(rule: &str, syntax: &RuleSyntax, flags: RuleFlags) -> Result<Self> {
        let (pattern, replacement) =
            split_rule(rule, &syntax.separator).ok_or_else(|| Error::MalformedRule {
                rule: rule.to_string(),
                separator: syntax.separator.clone(),
            })?;
        Self::from_parts(&pattern, &replacement, &syntax.marker, flags)
    }

    /// Compiles a rule whose halves are already separated.
    ///
    /// C escape sequences are decoded in the replacement, and in the pattern
    /// too when it is literal. A regex pattern is handed to the regex engine
    /// unchanged.
    pub fn from_parts(pattern: &str, replacement: &str, marker: &str, flags: RuleFlags) -> Result<Self> {
        let matcher = if flags.literal {
            Matcher::literal(decode_escapes(pattern), flags.ignore_case, flags.whole_word)
        } else {
            Matcher::regex(pattern, flags.ignore_case, flags.whole_word)
        }
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let template = Template::parse(&decode_escapes(replacement), marker.as_bytes());

        let mut warnings = Vec::new();
        if let Some(index) = template.max_group() {
            if index > matcher.group_count() {
                let warning = Error::BackReferenceOutOfRange {
                    pattern: pattern.to_string(),
                    index,
                    groups: matcher.group_count(),
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            flags,
            matcher,
            template,
            warnings,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn flags(&self) -> RuleFlags {
        self.flags
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Problems found at compile time that do not prevent the rule from running.
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// Substitutes every match of this rule in `buffer`.
    pub fn apply(&self, buffer: &[u8]) -> Substitution {
        substitute(&self.matcher, &self.template, buffer)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ==> {}",
            self.pattern.escape_debug(),
            self.replacement.escape_debug()
        )
    }
}

/// The outcome of running every rule over one buffer.
#[derive(Debug, Clone, Default)]
pub struct Rewrite {
    pub output: Vec<u8>,
    /// Matches per rule, in rule order.
    pub rule_matches: Vec<usize>,
    /// Replaced regions of `output`, when tracking was requested.
    pub highlights: Vec<Range<usize>>,
}

impl Rewrite {
    pub fn matches(&self) -> usize {
        self.rule_matches.iter().sum()
    }
}

/// Applies `rules` in order, each one to the output of the previous.
///
/// With `track_highlights`, the regions produced by replacements are followed
/// through later rules so a preview can mark them in the final text.
pub fn apply_rules(rules: &[Rule], input: &[u8], track_highlights: bool) -> Rewrite {
    let mut output = input.to_vec();
    let mut highlights = Vec::new();
    let mut rule_matches = Vec::with_capacity(rules.len());

    for rule in rules {
        let substitution = rule.apply(&output);
        rule_matches.push(substitution.matches());
        if substitution.matches() == 0 {
            continue;
        }
        if track_highlights {
            highlights = substitution.carry_ranges(&highlights);
        }
        output = substitution.output;
    }

    Rewrite {
        output,
        rule_matches,
        highlights,
    }
}

/// Splits `rule` at the first unescaped `separator` and removes the escapes
/// from separators inside both halves.
pub fn split_rule(rule: &str, separator: &str) -> Option<(String, String)> {
    if separator.is_empty() {
        return None;
    }
    let (at, _) = rule
        .match_indices(separator)
        .find(|(i, _)| !is_escaped(rule, *i))?;
    let lhs = &rule[..at];
    let rhs = &rule[at + separator.len()..];
    Some((
        unescape_separator(lhs, separator),
        unescape_separator(rhs, separator),
    ))
}

/// `true` if the character at byte offset `at` follows an odd run of backslashes.
fn is_escaped(s: &str, at: usize) -> bool {
    s.as_bytes()[..at].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

fn unescape_separator(s: &str, separator: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut copied = 0;
    for (i, _) in s.match_indices(separator) {
        if is_escaped(s, i) {
            out.push_str(&s[copied..i - 1]);
            copied = i;
        }
    }
    out.push_str(&s[copied..]);
    out
}

/// Decodes C escape sequences: `\\ \a \b \f \n \r \t \v`, `\xHH` and `\NNN`.
///
/// Unknown or incomplete sequences are kept verbatim.
pub fn decode_escapes(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let code = bytes[i + 1];
        i += 2;
        match code {
            b'\\' => out.push(b'\\'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'x' => {
                let digits = bytes[i..]
                    .iter()
                    .take(2)
                    .take_while(|b| b.is_ascii_hexdigit())
                    .count();
                if digits == 0 {
                    out.extend_from_slice(b"\\x");
                } else {
                    out.push(radix_value(&bytes[i..i + digits], 16));
                    i += digits;
                }
            }
            b'0'..=b'7' => {
                let digits = 1 + bytes[i..]
                    .iter()
                    .take(2)
                    .take_while(|b| (b'0'..=b'7').contains(*b))
                    .count();
                out.push(radix_value(&bytes[i - 1..i - 1 + digits], 8));
                i += digits - 1;
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    out
}

fn radix_value(digits: &[u8], radix: u32) -> u8 {
    let value = digits
        .iter()
        .filter_map(|&d| char::from(d).to_digit(radix))
        .fold(0u32, |acc, d| acc * radix + d);
    (value & 0xff) as u8
}
