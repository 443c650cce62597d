use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// Byte buffer that hands out complete `\n`-terminated lines.
///
/// Chunks may split lines (or multi-byte characters) anywhere; the partial
/// tail is kept until the next chunk completes it.
pub struct LineSplitter {
    buffer: VecDeque<u8>,
    /// Leading bytes already known to hold no separator.
    scanned: usize,
    finished: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            scanned: 0,
            finished: false,
        }
    }

    /// Add bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line with trailing whitespace removed, or `None` until
    /// more bytes arrive.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buffer.range(self.scanned..).position(|&b| b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };
        let newline_pos = self.scanned + offset;
        let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        self.scanned = 0;
        Some(decode_line(&line_bytes))
    }

    /// Remainder after the last separator. Returned once, even when empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let rest: Vec<u8> = self.buffer.drain(..).collect();
        self.scanned = 0;
        Some(decode_line(&rest))
    }

    /// Buffered bytes not yet returned as a line
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Turns a chunked byte stream into a stream of lines.
///
/// A chunk error is passed through and ends the input; whatever was buffered
/// before it is still emitted as the final line.
pub fn split_lines<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut splitter = LineSplitter::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    splitter.extend(bytes.as_ref());
                    while let Some(line) = splitter.next_line() {
                        yield Ok(line);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }

        if let Some(rest) = splitter.finish() {
            yield Ok(rest);
        }
    }
}
