//! The kernel-output seam.
//!
//! `puts`, `p`, and `print` are the only ways an interpreted program can
//! produce observable output, and their formatting rules live here: `puts`
//! flattens arrays and writes one line per element, `p` writes each
//! argument's `inspect` and hands the argument back, `print` emits raw
//! chunks with no terminator. A [`PrintWriter`] receives the already
//! formatted records and only decides where they go, so tests capture
//! program output by swapping the writer, not by scraping stdout.

use std::{borrow::Cow, rc::Rc};

use crate::value::Value;

/// Destination for the records the kernel printing methods produce.
pub trait PrintWriter {
    /// One full output line from `puts` or `p`, without its terminator.
    /// The implementation supplies the newline.
    fn write_line(&mut self, line: Cow<'_, str>);

    /// A raw chunk from `print`. Nothing is appended.
    fn write_chunk(&mut self, chunk: Cow<'_, str>);
}

/// Writes `puts` output: one line per argument, arrays flattened a level at
/// a time, nil as a blank line, and a single blank line when called with no
/// arguments. A string that already ends in a newline is not given another.
pub(crate) fn puts_values(args: &[Value], writer: &mut impl PrintWriter) {
    if args.is_empty() {
        writer.write_line("".into());
        return;
    }
    for value in args {
        puts_one(value, writer);
    }
}

fn puts_one(value: &Value, writer: &mut impl PrintWriter) {
    match value {
        Value::Array(items) => {
            for item in items.iter() {
                puts_one(item, writer);
            }
        }
        Value::Nil => writer.write_line("".into()),
        Value::Str(s) => {
            let line = s.strip_suffix('\n').unwrap_or(s);
            writer.write_line(line.into());
        }
        other => writer.write_line(other.to_string().into()),
    }
}

/// Writes `p` output, one `inspect` line per argument, and returns what the
/// call itself evaluates to: nil for no arguments, the argument itself for
/// one, all of them as an array otherwise.
pub(crate) fn p_values(args: &[Value], writer: &mut impl PrintWriter) -> Value {
    for value in args {
        writer.write_line(value.inspect().into());
    }
    match args {
        [] => Value::Nil,
        [single] => single.clone(),
        many => Value::Array(Rc::new(many.to_vec())),
    }
}

/// Writes `print` output: each argument's `to_s`, back to back.
pub(crate) fn print_values(args: &[Value], writer: &mut impl PrintWriter) {
    for value in args {
        writer.write_chunk(value.to_string().into());
    }
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn write_line(&mut self, line: Cow<'_, str>) {
        println!("{line}");
    }

    fn write_chunk(&mut self, chunk: Cow<'_, str>) {
        print!("{chunk}");
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing program output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    /// Creates a new empty `CollectStringPrint`.
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn write_line(&mut self, line: Cow<'_, str>) {
        self.0.push_str(&line);
        self.0.push('\n');
    }

    fn write_chunk(&mut self, chunk: Cow<'_, str>) {
        self.0.push_str(&chunk);
    }
}

/// `PrintWriter` that ignores all output.
///
/// Useful for suppressing program output during benchmarking.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write_line(&mut self, _line: Cow<'_, str>) {}

    fn write_chunk(&mut self, _chunk: Cow<'_, str>) {}
}
