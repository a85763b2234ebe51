use crate::config::{Highlight, PreviewContext};
use crate::errors::Result;
use crate::patterns::{Rewrite, Rule};
use crate::replacer::RunStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

/// Defines the possible formats for the end-of-run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// A short, human-readable text summary.
    #[default]
    Text,
    /// JSON format, suitable for machine processing.
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Renders previews, progress messages and summaries. Never touches the
/// filesystem.
pub struct OutputFormatter {
    format: OutputFormat,
    highlight: Highlight,
    tool_name: String,
    tool_version: String,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, highlight: Highlight) -> Self {
        Self {
            format,
            highlight,
            tool_name: "streplace".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Writes the preview of one rewritten file.
    ///
    /// Replaced regions are wrapped in the bold and normal sequences. With
    /// [`PreviewContext::Lines`], only lines touched by a replacement and
    /// their context are shown, each block preceded by a `--LINE--` marker
    /// unless separators are hidden.
    pub fn write_preview<W: Write>(
        &self,
        writer: &mut W,
        path: &Path,
        rewrite: &Rewrite,
        context: PreviewContext,
    ) -> Result<()> {
        let h = &self.highlight;
        writeln!(
            writer,
            "{}{}{} ({}{}{} matches):",
            h.bold,
            path.display(),
            h.normal,
            h.bold,
            rewrite.matches(),
            h.normal
        )?;

        let text = &rewrite.output;
        let lines = line_ranges(text);
        let mut rendered = Vec::with_capacity(text.len());

        match context {
            PreviewContext::WholeFile => {
                for line in &lines {
                    self.render_line(text, line.clone(), &rewrite.highlights, &mut rendered);
                }
            }
            PreviewContext::Lines { count, separators } => {
                let marked = mark_lines(&lines, &rewrite.highlights, count);
                // The first line always gets a separator, marked or not.
                for (i, line) in lines.iter().enumerate() {
                    if separators && (i == 0 || (marked[i] && !marked[i - 1])) {
                        rendered.extend_from_slice(
                            format!("{}--{}--{}\n", h.thin, i + 1, h.normal).as_bytes(),
                        );
                    }
                    if marked[i] {
                        self.render_line(text, line.clone(), &rewrite.highlights, &mut rendered);
                    }
                }
            }
        }

        writer.write_all(&rendered)?;
        Ok(())
    }

    /// Appends one line of `text` with its highlighted regions and a newline.
    fn render_line(&self, text: &[u8], line: Range<usize>, highlights: &[Range<usize>], out: &mut Vec<u8>) {
        let bold = self.highlight.bold.as_bytes();
        let normal = self.highlight.normal.as_bytes();
        let mut pos = line.start;
        let mut open = false;

        let touching = highlights
            .iter()
            .filter(|r| r.start <= line.end && (r.start >= line.start || r.end > line.start));
        for range in touching {
            if range.start >= line.start {
                out.extend_from_slice(&text[pos..range.start]);
                pos = range.start;
            }
            if !open {
                out.extend_from_slice(bold);
                open = true;
            }
            let end = range.end.min(line.end);
            out.extend_from_slice(&text[pos..end]);
            pos = end;
            if range.end <= line.end {
                out.extend_from_slice(normal);
                open = false;
            }
        }

        out.extend_from_slice(&text[pos..line.end]);
        if open {
            out.extend_from_slice(normal);
        }
        out.push(b'\n');
    }

    /// `Processing PATH (N)`, printed for each file in verbose mode.
    pub fn write_processing<W: Write>(&self, writer: &mut W, path: &Path, matches: usize) -> Result<()> {
        if matches > 0 {
            writeln!(writer, "Processing {} ({})", path.display(), matches)?;
        } else {
            writeln!(writer, "Processing {}", path.display())?;
        }
        Ok(())
    }

    pub fn write_rename<W: Write>(&self, writer: &mut W, from: &Path, to: &Path) -> Result<()> {
        writeln!(writer, "renaming '{}' as '{}'", from.display(), to.display())?;
        Ok(())
    }

    pub fn write_symlink_change<W: Write>(
        &self,
        writer: &mut W,
        link: &Path,
        old: &Path,
        new: &Path,
    ) -> Result<()> {
        writeln!(
            writer,
            "changing symlink '{}' from '{}' to '{}'",
            link.display(),
            old.display(),
            new.display()
        )?;
        Ok(())
    }

    /// Writes the compiled rules with their match counts (`-vv`).
    pub fn write_rule_report<W: Write>(&self, writer: &mut W, rules: &[Rule], stats: &RunStats) -> Result<()> {
        for (i, rule) in rules.iter().enumerate() {
            let matches = stats.rule_matches.get(i).copied().unwrap_or(0);
            writeln!(writer, "  {rule}  ({matches} {})", plural(matches, "match", "matches"))?;
        }
        Ok(())
    }

    /// Writes the end-of-run summary in the configured format.
    pub fn write_summary<W: Write>(&self, writer: &mut W, stats: &RunStats, rules: &[Rule]) -> Result<()> {
        let output = match self.format {
            OutputFormat::Text => self.format_summary(stats),
            OutputFormat::Json => self.format_json(stats, rules)?,
        };
        writer.write_all(output.as_bytes())?;
        Ok(())
    }

    /// `CHANGED/CONSIDERED files changed, M matches total`, followed by the
    /// non-zero secondary counters.
    pub fn format_summary(&self, stats: &RunStats) -> String {
        let mut summary = format!(
            "{}/{} {} changed, {} {} total\n",
            stats.files_changed,
            stats.files_considered,
            plural(stats.files_considered, "file", "files"),
            stats.matches_total,
            plural(stats.matches_total, "match", "matches"),
        );

        let secondary = [
            (stats.renamed, "renamed", "renamed"),
            (stats.symlinks_changed, "symlink changed", "symlinks changed"),
            (stats.ignored, "ignored", "ignored"),
            (stats.errors, "error", "errors"),
        ];
        for (count, one, many) in secondary {
            if count > 0 {
                summary.push_str(&format!("{count} {}\n", plural(count, one, many)));
            }
        }
        summary
    }

    fn format_json(&self, stats: &RunStats, rules: &[Rule]) -> Result<String> {
        #[derive(Serialize)]
        struct JsonOutput<'a> {
            tool: ToolInfo<'a>,
            run_time: DateTime<Utc>,
            #[serde(flatten)]
            stats: &'a RunStats,
            rules: Vec<JsonRule>,
        }

        #[derive(Serialize)]
        struct ToolInfo<'a> {
            name: &'a str,
            version: &'a str,
        }

        #[derive(Serialize)]
        struct JsonRule {
            pattern: String,
            replacement: String,
            matches: usize,
        }

        let output = JsonOutput {
            tool: ToolInfo {
                name: &self.tool_name,
                version: &self.tool_version,
            },
            run_time: Utc::now(),
            stats,
            rules: rules
                .iter()
                .enumerate()
                .map(|(i, rule)| JsonRule {
                    pattern: rule.pattern().to_string(),
                    replacement: rule.replacement().to_string(),
                    matches: stats.rule_matches.get(i).copied().unwrap_or(0),
                })
                .collect(),
        };

        let mut json = serde_json::to_string_pretty(&output)?;
        json.push('\n');
        Ok(json)
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// Content ranges of each line, without the newline. A missing final newline
/// is treated as present; empty text is one empty line.
fn line_ranges(text: &[u8]) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, byte) in text.iter().enumerate() {
        if *byte == b'\n' {
            lines.push(start..i);
            start = i + 1;
        }
    }
    if start < text.len() || lines.is_empty() {
        lines.push(start..text.len());
    }
    lines
}

/// Marks every line a highlight touches, plus `context` lines on each side.
fn mark_lines(lines: &[Range<usize>], highlights: &[Range<usize>], context: usize) -> Vec<bool> {
    let line_of = |pos: usize| lines.partition_point(|l| l.start <= pos).saturating_sub(1);
    let mut marked = vec![false; lines.len()];

    for range in highlights {
        let first = line_of(range.start);
        let last = if range.is_empty() { first } else { line_of(range.end - 1) };
        let from = first.saturating_sub(context);
        let to = (last + context).min(lines.len() - 1);
        for flag in &mut marked[from..=to] {
            *flag = true;
        }
    }
    marked
}
