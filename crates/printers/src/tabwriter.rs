//! Column-aligning sink.
//!
//! Bytes are buffered until [`Write::flush`]; tab-separated cells on consecutive lines are
//! then padded to a common width per column. The last cell of a line is never padded.
//! Flushing once per printed item keeps buffering bounded to that item.

use std::io::{self, Write};

const MIN_WIDTH: usize = 10;
const PADDING: usize = 3;

pub struct TabWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    min_width: usize,
    padding: usize,
}

impl<W: Write> TabWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_layout(inner, MIN_WIDTH, PADDING)
    }

    pub fn with_layout(inner: W, min_width: usize, padding: usize) -> Self {
        Self { inner, buf: Vec::new(), min_width, padding }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Bytes written since the last flush.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Flush and hand back the wrapped writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for TabWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let aligned = align(&self.buf, self.min_width, self.padding);
            self.buf.clear();
            self.inner.write_all(&aligned)?;
        }
        self.inner.flush()
    }
}

/// Display width of a cell: characters for UTF-8 text, bytes otherwise.
fn cell_width(cell: &[u8]) -> usize {
    std::str::from_utf8(cell).map(|s| s.chars().count()).unwrap_or(cell.len())
}

fn align(text: &[u8], min_width: usize, padding: usize) -> Vec<u8> {
    let mut lines: Vec<&[u8]> = text.split(|b| *b == b'\n').collect();
    // `split` yields a trailing empty line after a final newline
    let trailing_newline = lines.last().map(|l| l.is_empty()).unwrap_or(false);
    if trailing_newline {
        lines.pop();
    }

    let rows: Vec<Vec<&[u8]>> = lines.iter().map(|l| l.split(|b| *b == b'\t').collect()).collect();
    let mut out = Vec::with_capacity(text.len() + 64);
    let mut i = 0;
    while i < rows.len() {
        if rows[i].len() < 2 {
            out.extend_from_slice(lines[i]);
            out.push(b'\n');
            i += 1;
            continue;
        }
        // a block is a run of consecutive lines that contain at least one tab
        let start = i;
        while i < rows.len() && rows[i].len() >= 2 {
            i += 1;
        }
        let block = &rows[start..i];
        let mut widths: Vec<usize> = Vec::new();
        for row in block {
            for (col, cell) in row[..row.len() - 1].iter().enumerate() {
                let w = cell_width(cell);
                if widths.len() <= col {
                    widths.push(0);
                }
                widths[col] = widths[col].max(w);
            }
        }
        for row in block {
            let last = row.len() - 1;
            for (col, cell) in row.iter().enumerate() {
                out.extend_from_slice(cell);
                if col < last {
                    let width = (widths[col] + padding).max(min_width);
                    let pad = width.saturating_sub(cell_width(cell));
                    out.resize(out.len() + pad, b' ');
                }
            }
            out.push(b'\n');
        }
    }
    if !trailing_newline && out.last() == Some(&b'\n') {
        out.pop();
    }
    out
}
