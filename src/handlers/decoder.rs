//! # Resumable decoder for concatenated JSON values.
//!
//! Backend scripts print their self-description as a sequence of JSON
//! values on stdout. The pipe hands us arbitrary chunks, so a value may be
//! split across reads or several values may arrive in one read.
//!
//! [`JsonStreamDecoder`] keeps its scanning state between [`push`](JsonStreamDecoder::push)
//! calls and reports one of three outcomes per [`next_value`](JsonStreamDecoder::next_value):
//!
//! ```text
//!             push(chunk)
//!                 │
//!                 ▼
//!   ┌──────► [Between] ── '{' / '[' ──► [InValue] ── closer balances ──► Value(v)
//!   │            │                         │                              │
//!   │      other byte                mismatched closer,               serde fails
//!   │            │                   raw newline in string                │
//!   │            ▼                         ▼                              ▼
//!   └─ '\n' ─ [Discarding] ◄────────── Malformed ◄────────────────────────┘
//! ```
//!
//! Only objects and arrays are recognized at top level; anything else is
//! malformed. After a malformed value the decoder skips to the next line
//! boundary before looking for the next value.

use serde_json::Value;

/// Outcome of one [`JsonStreamDecoder::next_value`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete value was decoded.
    Value(Value),
    /// All buffered input was consumed without completing a value.
    NeedMore,
    /// A malformed value was dropped; decoding resumes at the next line.
    Malformed,
}

/// Resumable decoder for a stream of JSON values.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    input: Vec<u8>,
    pos: usize,
    value: Vec<u8>,
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
    discarding: bool,
}

impl JsonStreamDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of input.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.pos > 0 {
            self.input.drain(..self.pos);
            self.pos = 0;
        }
        self.input.extend_from_slice(chunk);
    }

    /// Scans buffered input until a value completes, a malformed value is
    /// dropped, or the input runs out.
    pub fn next_value(&mut self) -> Decoded {
        while self.pos < self.input.len() {
            let b = self.input[self.pos];
            self.pos += 1;

            if self.discarding {
                if b == b'\n' {
                    self.discarding = false;
                }
                continue;
            }

            if self.closers.is_empty() {
                match b {
                    b' ' | b'\t' | b'\r' | b'\n' => {}
                    b'{' | b'[' => self.open(b),
                    _ => return self.malformed(b),
                }
                continue;
            }

            self.value.push(b);

            if self.in_string {
                if b == b'\n' {
                    return self.malformed(b);
                }
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'{' => self.closers.push(b'}'),
                b'[' => self.closers.push(b']'),
                b'}' | b']' => {
                    if self.closers.pop() != Some(b) {
                        return self.malformed(b);
                    }
                    if self.closers.is_empty() {
                        return self.complete();
                    }
                }
                _ => {}
            }
        }
        Decoded::NeedMore
    }

    /// Ends the stream. Returns `true` if a partial value had to be dropped.
    pub fn finish(&mut self) -> bool {
        let partial = !self.closers.is_empty();
        *self = Self::default();
        partial
    }

    fn open(&mut self, b: u8) {
        self.value.push(b);
        self.closers.push(if b == b'{' { b'}' } else { b']' });
    }

    fn complete(&mut self) -> Decoded {
        let bytes = std::mem::take(&mut self.value);
        match serde_json::from_slice(&bytes) {
            Ok(v) => Decoded::Value(v),
            Err(_) => {
                self.discarding = true;
                Decoded::Malformed
            }
        }
    }

    fn malformed(&mut self, last: u8) -> Decoded {
        self.value.clear();
        self.closers.clear();
        self.in_string = false;
        self.escaped = false;
        self.discarding = last != b'\n';
        Decoded::Malformed
    }
}
