//! Consumers of lazy row, batch and page sequences.

use std::fmt::Display;
use std::io::{self, Write};

use serde::Serialize;

use crate::error::StreamError;

/// A consumer of produced items.
///
/// `finish` is called once on natural end of the sequence; `abort` once when
/// the sequence ends with an error.
pub trait Sink<T> {
    fn accept(&mut self, item: T) -> Result<(), StreamError>;

    fn finish(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    fn abort(&mut self, _error: &StreamError) {}
}

impl<T> Sink<T> for Vec<T> {
    fn accept(&mut self, item: T) -> Result<(), StreamError> {
        self.push(item);
        Ok(())
    }
}

/// Sink adapter over a closure.
pub struct FnSink<F>(F);

pub fn from_fn<F>(f: F) -> FnSink<F> {
    FnSink(f)
}

impl<T, F> Sink<T> for FnSink<F>
where
    F: FnMut(T) -> Result<(), StreamError>,
{
    fn accept(&mut self, item: T) -> Result<(), StreamError> {
        (self.0)(item)
    }
}

/// Line output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}

/// Writes one item per line, as `Display` text or a JSON document.
pub struct LineSink<W> {
    out: W,
    format: OutputFormat,
    written: usize,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<T, W> Sink<T> for LineSink<W>
where
    T: Serialize + Display,
    W: Write,
{
    fn accept(&mut self, item: T) -> Result<(), StreamError> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{item}")?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, &item).map_err(io::Error::from)?;
                self.out.write_all(b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        self.out.flush()?;
        Ok(())
    }

    fn abort(&mut self, _error: &StreamError) {
        let _ = self.out.flush();
    }
}

/// Pull every item of `items` into `sink`.
///
/// Stops at the first error from either side; the source iterator is dropped
/// (releasing its cursor) before the error is returned.
pub fn drain<T, I, S>(items: I, sink: &mut S) -> Result<usize, StreamError>
where
    I: IntoIterator<Item = Result<T, StreamError>>,
    S: Sink<T> + ?Sized,
{
    let mut count = 0;
    for item in items {
        if let Err(e) = item.and_then(|item| sink.accept(item)) {
            sink.abort(&e);
            return Err(e);
        }
        count += 1;
    }
    sink.finish()?;
    Ok(count)
}
