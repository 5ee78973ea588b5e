//! Source locations for chao diagnostics. The semantic passes never create
//! locations themselves: they are produced by whatever front-end hands us a
//! tree, and carried around so that errors can point back at user code.
//! Most types here keep *two* [`Location`]s, a start and an end, wrapped
//! together in a [`SpanTuple`].

use std::cmp::max;
use std::fmt::Display;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Eq, PartialEq, Clone)]
enum Column {
    EndOfLine,
    Precise(NonZeroUsize),
}

/// A precise point in the source. Lines and columns are 1-based.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Location {
    line: NonZeroUsize,
    column: Column,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Location {
        Location {
            // Zero lines or columns do not exist. Panic on them
            line: NonZeroUsize::new(line).unwrap(),
            column: Column::Precise(NonZeroUsize::new(column).unwrap()),
        }
    }

    pub fn whole_line(line: usize) -> Location {
        Location {
            line: NonZeroUsize::new(line).unwrap(),
            column: Column::EndOfLine,
        }
    }

    pub fn line(&self) -> usize {
        self.line.get()
    }

    pub fn column(&self) -> usize {
        match self.column {
            Column::Precise(nz) => nz.get(),
            // A whole-line location starts at its first character
            Column::EndOfLine => 1usize,
        }
    }
}

/// Where the checked program came from: a file path, a raw string, or
/// nothing at all (tests, synthesized builtins). [`Source`] borrows its
/// data; [`SourceOwned`] clones it, which costs for `Input` but lets spans
/// outlive the front-end.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source<'s> {
    Path(&'s Path),
    Input(&'s str),
    Empty,
}

/// Same as [`Source`], but owning the values
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceOwned {
    Path(PathBuf),
    Input(String),
    Empty,
}

impl Source<'_> {
    fn as_source(&self) -> SourceOwned {
        match self {
            Source::Path(p) => SourceOwned::Path(p.into()),
            Source::Input(i) => SourceOwned::Input(String::from(*i)),
            Source::Empty => SourceOwned::Empty,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpanTuple {
    source: SourceOwned,
    start: Location,
    end: Location,
}

impl SpanTuple {
    pub fn with_source_ref(source: Source, start: Location, end: Location) -> SpanTuple {
        SpanTuple::with_source(source.as_source(), start, end)
    }

    /// Span for nodes which never existed in user code: builtin declarations
    /// and synthesized helpers
    pub fn builtin() -> SpanTuple {
        SpanTuple::with_source(SourceOwned::Empty, Location::new(1, 1), Location::new(1, 1))
    }

    pub fn with_source(source: SourceOwned, start: Location, end: Location) -> SpanTuple {
        SpanTuple { source, start, end }
    }

    pub fn start(&self) -> &Location {
        &self.start
    }

    pub fn end(&self) -> &Location {
        &self.end
    }

    pub fn source(&self) -> &SourceOwned {
        &self.source
    }

    /// Amount of surrounding lines emitted when displaying a span in context
    const CONTEXT_LINES: usize = 3;

    /// Build two spans wrapping around `self`: up to [`CONTEXT_LINES`] before
    /// it, and the same amount after. The before context only exists when
    /// enough lines precede the span. The after context is always returned:
    /// overshooting the input is harmless since missing lines simply print
    /// nothing.
    pub fn generate_context(&self) -> (Option<SpanTuple>, SpanTuple) {
        let before_ctx = if self.start().line() > SpanTuple::CONTEXT_LINES + 1 {
            let before_start =
                Location::whole_line(max(self.start().line() - SpanTuple::CONTEXT_LINES, 1));
            let before_end = Location::whole_line(self.start().line() - 1);
            Some(SpanTuple::with_source(
                self.source().clone(),
                before_start,
                before_end,
            ))
        } else {
            None
        };

        let after_start = Location::whole_line(self.end().line() + 1);
        let after_end = Location::whole_line(self.end().line() + SpanTuple::CONTEXT_LINES);
        let after_ctx = SpanTuple::with_source(self.source().clone(), after_start, after_end);

        (before_ctx, after_ctx)
    }

    /// Print the source range covered by this span on stderr. Each line is
    /// prefixed with its number and `separator`; single-line spans get an
    /// underline made of `repetitor` under the offending columns.
    pub fn emit<T1: Display, T2: Display>(&self, separator: T1, repetitor: T2) {
        let rendered = self.render(&separator, &repetitor);
        if !rendered.is_empty() {
            eprintln!("{rendered}");
        }
    }

    fn format_line<T: Display>(&self, separator: &T, offset: usize, line: &str) -> String {
        format!("{:5} {separator} {line}", self.start.line() + offset)
    }

    fn underline<T: Display>(&self, repetitor: &T, line: &str, start_col: usize, end_col: usize) -> String {
        let mut underline = String::new();
        for user_char in line.chars().take(start_col - 1) {
            // Keep hard tabs so the underline stays aligned
            underline.push(if user_char.is_whitespace() { user_char } else { ' ' });
        }

        for _ in start_col..max(end_col, start_col + 1) {
            underline = format!("{underline}{repetitor}");
        }

        format!("        {underline}")
    }

    fn with_path<T1: Display, T2: Display>(
        &self,
        separator: &T1,
        repetitor: &T2,
        path: &Path,
    ) -> String {
        match fs::read_to_string(path) {
            Ok(input) => self.with_input(separator, repetitor, &input),
            // The file vanished between parsing and error emission. Nothing
            // sensible to show anymore
            Err(_) => String::new(),
        }
    }

    fn with_input<T1: Display, T2: Display>(
        &self,
        separator: &T1,
        repetitor: &T2,
        input: &str,
    ) -> String {
        let mut result = String::new();

        if self.start.line() > self.end.line() {
            return result;
        }

        if self.start.line() == self.end.line() && self.start.column() > self.end.column() {
            return result;
        }

        let line_span = self.end.line() - self.start.line();

        for (i, line) in input
            .lines()
            .skip(self.start.line() - 1)
            .take(line_span + 1)
            .enumerate()
        {
            if i > 0 {
                result.push('\n');
            }

            result.push_str(&self.format_line(separator, i, line));

            if line_span == 0 {
                let start_col = self.start.column();
                let end_col = match self.end.column {
                    Column::EndOfLine => line.len(),
                    Column::Precise(nz) => nz.get(),
                };

                result.push('\n');
                result.push_str(&self.underline(repetitor, line, start_col, end_col));
            }
        }

        result
    }

    fn render<T1: Display, T2: Display>(&self, separator: &T1, repetitor: &T2) -> String {
        match self.source() {
            SourceOwned::Path(path) => self.with_path(separator, repetitor, path),
            SourceOwned::Input(input) => self.with_input(separator, repetitor, input),
            SourceOwned::Empty => String::new(),
        }
    }
}
