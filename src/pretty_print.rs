use crate::evaluator::{EvalError, EvalErrorKind};
use crate::parser::{ParseError, ParseErrorKind};
use crate::source::Span;
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::io::{self, Write};
use std::ops::Range;

const SOURCE_ID: &str = "REPL";

// Spans of values read from an earlier input can fall outside this one.
fn label_range(span: Span, input: &str) -> Option<Range<usize>> {
    let len = input.chars().count();
    (!span.is_empty() && span.end <= len).then(|| span.to_range())
}

fn write_report<W: Write>(
    message: String,
    label: Option<(Range<usize>, String)>,
    input: &str,
    color: bool,
    out: W,
) -> io::Result<()> {
    let anchor = label.as_ref().map_or(0..0, |(range, _)| range.clone());
    let mut report = Report::build(ReportKind::Error, (SOURCE_ID, anchor))
        .with_config(Config::default().with_color(color))
        .with_message(message);
    if let Some((range, text)) = label {
        report = report.with_label(Label::new((SOURCE_ID, range)).with_message(text));
    }
    report.finish().write((SOURCE_ID, Source::from(input)), out)
}

impl ParseError {
    pub fn write_report<W: Write>(&self, input: &str, color: bool, out: W) -> io::Result<()> {
        let hint = match self.kind {
            ParseErrorKind::NoInput => "nothing to read here",
            ParseErrorKind::DoubleQuote => "a value can only be quoted once",
            ParseErrorKind::QuotedSpace => "this quote has nothing to quote",
            ParseErrorKind::UnmatchedParenthesis => "this parenthesis has no partner",
        };
        let label = label_range(self.span, input).map(|range| (range, hint.to_string()));
        write_report(format!("Parse error: {}", self.kind), label, input, color, out)
    }

    /// Prints a colored report to stderr.
    pub fn pretty_print(&self, input: &str) {
        if let Err(e) = self.write_report(input, true, io::stderr()) {
            tracing::warn!(error = %e, "failed to render parse error");
        }
    }
}

impl EvalError {
    pub fn write_report<W: Write>(&self, input: &str, color: bool, out: W) -> io::Result<()> {
        let hint = match (&self.message, self.kind) {
            (Some(message), _) => message.clone(),
            (None, EvalErrorKind::Undefined) => {
                format!("`{}` is not defined in the current scope", self.value)
            }
            (None, EvalErrorKind::NotAFunction) => {
                format!("a {} cannot be called", self.value.kind.type_name())
            }
            (None, kind) => kind.to_string(),
        };
        let label = label_range(self.value.span, input).map(|range| (range, hint));
        write_report(
            format!("Evaluation error: {} `{}`", self.kind, self.value),
            label,
            input,
            color,
            out,
        )
    }

    /// Prints a colored report to stderr.
    pub fn pretty_print(&self, input: &str) {
        if let Err(e) = self.write_report(input, true, io::stderr()) {
            tracing::warn!(error = %e, "failed to render evaluation error");
        }
    }
}
