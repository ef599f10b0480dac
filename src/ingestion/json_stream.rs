//! Incremental splitter for a top-level JSON array.
//!
//! Bytes go in chunk by chunk, complete element slices come out. Only the element currently
//! being read is buffered, so peak memory is bounded by the largest element rather than the
//! whole snapshot. Elements are not validated here; the caller parses each one.

use super::types::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    /// Waiting for the opening `[`.
    Start,
    /// Between elements. `after_comma` forbids a closing `]`.
    BeforeElement { after_comma: bool },
    InElement,
    /// An element ended; waiting for `,` or `]`.
    AfterElement,
    Done,
}

#[derive(Debug)]
pub struct JsonArraySplitter {
    state: SplitState,
    current: Vec<u8>,
    /// Open `{`/`[` inside the current element.
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Bytes consumed so far, for error messages.
    position: u64,
}

impl Default for JsonArraySplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonArraySplitter {
    pub fn new() -> Self {
        Self {
            state: SplitState::Start,
            current: Vec::new(),
            depth: 0,
            in_string: false,
            escaped: false,
            position: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == SplitState::Done
    }

    /// Feeds one chunk and returns every element it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FetchError> {
        let mut elements = Vec::new();

        for &byte in chunk {
            self.position += 1;
            match self.state {
                SplitState::Start => {
                    if byte == b'[' {
                        self.state = SplitState::BeforeElement { after_comma: false };
                    } else if !byte.is_ascii_whitespace() {
                        return Err(self.unexpected(byte, "expected '[' at the start of the array"));
                    }
                }
                SplitState::BeforeElement { after_comma } => {
                    if byte.is_ascii_whitespace() {
                        continue;
                    }
                    match byte {
                        b']' if !after_comma => self.state = SplitState::Done,
                        b']' | b',' => {
                            return Err(self.unexpected(byte, "expected an array element"));
                        }
                        _ => {
                            self.state = SplitState::InElement;
                            if let Some(element) = self.consume(byte) {
                                elements.push(element);
                            }
                        }
                    }
                }
                SplitState::InElement => {
                    if self.depth == 0 && !self.in_string && (byte == b',' || byte == b']') {
                        // End of a scalar element
                        elements.push(self.take_element());
                        self.state = if byte == b',' {
                            SplitState::BeforeElement { after_comma: true }
                        } else {
                            SplitState::Done
                        };
                    } else if let Some(element) = self.consume(byte) {
                        elements.push(element);
                    }
                }
                SplitState::AfterElement => match byte {
                    b',' => self.state = SplitState::BeforeElement { after_comma: true },
                    b']' => self.state = SplitState::Done,
                    _ if byte.is_ascii_whitespace() => {}
                    _ => return Err(self.unexpected(byte, "expected ',' or ']' after an element")),
                },
                SplitState::Done => {
                    if !byte.is_ascii_whitespace() {
                        return Err(self.unexpected(byte, "trailing data after the array"));
                    }
                }
            }
        }

        Ok(elements)
    }

    /// Confirms the array was closed. Call once the stream ended.
    pub fn finish(&self) -> Result<(), FetchError> {
        match self.state {
            SplitState::Done => Ok(()),
            SplitState::Start => Err(FetchError::MalformedPayload(
                "empty body, expected a JSON array".to_string(),
            )),
            _ => Err(FetchError::MalformedPayload(format!(
                "stream ended inside the array after {} bytes",
                self.position
            ))),
        }
    }

    /// Appends a byte of the current element. Returns the element when a container closes
    /// at the top level.
    fn consume(&mut self, byte: u8) -> Option<Vec<u8>> {
        self.current.push(byte);

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return None;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    self.state = SplitState::AfterElement;
                    return Some(self.take_element());
                }
            }
            _ => {}
        }
        None
    }

    fn take_element(&mut self) -> Vec<u8> {
        let mut element = std::mem::take(&mut self.current);
        while element.last().is_some_and(|b| b.is_ascii_whitespace()) {
            element.pop();
        }
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        element
    }

    fn unexpected(&self, byte: u8, expectation: &str) -> FetchError {
        FetchError::MalformedPayload(format!(
            "unexpected byte {:?} at offset {}: {}",
            byte as char, self.position, expectation
        ))
    }
}
