//! Source file handling: loading files (real or spoofed), mapping byte
//! offsets to lines and columns, and rendering highlighted error spans.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Formatter};
use std::io;
use std::path::Path;

/// A source span, mapping a region of the original source text to line/column
/// coordinates. Attached to every AST node and every source error.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start of the span, from the start of the file
    pub offset: usize,
    /// Length of the span, in bytes
    pub length: usize,
    /// 1-based line of the start of the span
    pub start_line: usize,
    /// 1-based column of the start of the span
    pub start_col: usize,
    /// 1-based line of the end of the span (inclusive)
    pub end_line: usize,
    /// 1-based column of the end of the span (exclusive)
    pub end_col: usize,
}

impl Span {
    /// Get the slice of source code that this span points to.
    pub fn get_source_slice<'a>(&self, src: &'a str) -> &'a str {
        let end = (self.offset + self.length).min(src.len());
        &src[self.offset.min(end)..end]
    }

    /// Build a span covering `[start, end)` byte offsets of the given file.
    pub fn from_offsets(file: &SourceFile, start: usize, end: usize) -> Self {
        let end = end.max(start);
        let (start_line, start_col) = file.line_column(start);
        let (end_line, end_col) = file.line_column(end);
        Span {
            offset: start,
            length: end - start,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

/// A loaded source file, with an index of line start offsets for fast
/// line/column lookups.
#[derive(Clone, Debug)]
pub struct SourceFile {
    /// Name the file was loaded under (possibly spoofed, e.g. `<expression>`)
    pub filename: String,
    /// Name relative to the current directory, used in error headers
    pub relative_filename: String,
    /// The full text of the file
    pub text: String,
    /// Byte offset of the start of each line
    line_offsets: Vec<usize>,
}

impl SourceFile {
    fn index_lines(text: &str) -> Vec<usize> {
        let mut offsets = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                offsets.push(i + 1);
            }
        }
        offsets
    }

    /// Load a file from disk.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let filename = path.display().to_string();
        let relative_filename = std::env::current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(&cwd).ok())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| filename.clone());
        Ok(Self {
            line_offsets: Self::index_lines(&text),
            filename,
            relative_filename,
            text,
        })
    }

    /// Create an in-memory file that was never on disk, e.g. for parsing a
    /// standalone expression string.
    pub fn spoof(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        let text = text.into();
        Self {
            line_offsets: Self::index_lines(&text),
            relative_filename: name.clone(),
            filename: name,
            text,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// 1-based line number containing the given byte offset.
    pub fn line_number(&self, offset: usize) -> usize {
        match self.line_offsets.binary_search(&offset.min(self.text.len())) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// 1-based (line, column) of the given byte offset.
    pub fn line_column(&self, offset: usize) -> (usize, usize) {
        let line = self.line_number(offset);
        let line_start = self.line_offsets[line - 1];
        (line, offset.min(self.text.len()) - line_start + 1)
    }

    /// The text of the given 1-based line, without its newline.
    pub fn get_line(&self, line: usize) -> Option<&str> {
        let start = *self.line_offsets.get(line.checked_sub(1)?)?;
        let end = self
            .line_offsets
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        Some(self.text[start..end].trim_end_matches('\r'))
    }

    /// Byte offset of the start of the line containing `offset`.
    pub fn line_start(&self, offset: usize) -> usize {
        self.line_offsets[self.line_number(offset) - 1]
    }

    fn num_lines(&self) -> usize {
        self.line_offsets.len()
    }

    /// Render the region `[start, end)` with a few lines of context, using
    /// ANSI inverse-video highlighting when `use_color` is set.
    pub fn highlight_error(
        &self,
        start: usize,
        end: usize,
        color: &str,
        context_lines: usize,
        use_color: bool,
    ) -> String {
        let end = end.clamp(start, self.text.len());
        let first_line = self.line_number(start).saturating_sub(context_lines).max(1);
        let last_line = (self.line_number(end) + context_lines).min(self.num_lines());
        let gutter_width = format!("{last_line}").len();

        let mut out = String::new();
        for line_no in first_line..=last_line {
            let line = self.get_line(line_no).unwrap_or("");
            let line_start = self.line_offsets[line_no - 1];
            let line_end = line_start + line.len();

            out.push_str(&format!("{line_no:>gutter_width$} | "));
            if use_color && end > line_start && start < line_end {
                // Split the line around the highlighted region
                let hl_start = start.clamp(line_start, line_end) - line_start;
                let hl_end = end.clamp(line_start, line_end) - line_start;
                out.push_str(&line[..hl_start]);
                out.push_str(color);
                out.push_str(&line[hl_start..hl_end]);
                out.push_str("\x1b[m");
                out.push_str(&line[hl_end..]);
                out.push('\n');
            } else {
                out.push_str(line);
                out.push('\n');
                if end > line_start && start < line_end {
                    let hl_start = start.clamp(line_start, line_end) - line_start;
                    let hl_end = (end.clamp(line_start, line_end) - line_start).max(hl_start + 1);
                    out.push_str(&" ".repeat(gutter_width + 3 + hl_start));
                    out.push_str(&"^".repeat(hl_end - hl_start));
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Whether error output should be colorized: stderr is a TTY and the user
/// hasn't opted out via `NO_COLOR` or `COLOR=0`.
pub fn use_color() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
        && std::env::var_os("NO_COLOR").is_none()
        && std::env::var("COLOR").map(|v| v != "0").unwrap_or(true)
}

/// Write the highlighted source region for a span, for use from error
/// `Display` impls (alternate mode).
pub(crate) fn fmt_src_highlights(
    f: &mut Formatter<'_>,
    span: &Span,
    src: &str,
) -> fmt::Result {
    let file = SourceFile::spoof("<source>", src);
    writeln!(f)?;
    write!(
        f,
        "{}",
        file.highlight_error(span.offset, span.offset + span.length, "\x1b[31;1;7m", 2, false)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_lookups() {
        let f = SourceFile::spoof("<test>", "one\ntwo\nthree\n");
        assert_eq!(f.line_number(0), 1);
        assert_eq!(f.line_number(3), 1);
        assert_eq!(f.line_number(4), 2);
        assert_eq!(f.line_column(5), (2, 2));
        assert_eq!(f.get_line(2), Some("two"));
        assert_eq!(f.get_line(3), Some("three"));
        assert_eq!(f.get_line(5), None);
    }

    #[test]
    fn test_span_from_offsets() {
        let f = SourceFile::spoof("<test>", "abc\ndef");
        let span = Span::from_offsets(&f, 4, 7);
        assert_eq!(span.start_line, 2);
        assert_eq!(span.start_col, 1);
        assert_eq!(span.length, 3);
        assert_eq!(span.get_source_slice(&f.text), "def");
    }

    #[test]
    fn test_highlight_without_color() {
        let f = SourceFile::spoof("<test>", "let x = ??\n");
        let out = f.highlight_error(8, 10, "\x1b[31m", 1, false);
        assert!(out.contains("let x = ??"));
        assert!(out.contains("^^"));
    }
}
