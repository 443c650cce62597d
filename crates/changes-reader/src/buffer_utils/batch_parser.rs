use serde_json::Value;

use crate::types::{ChangeRecord, Cursor};

/// Accumulates change records decoded from a spooled `_changes` body and
/// hands them out in batches of at most `batch_size`.
///
/// The body is a JSON document streamed one array element per line:
///
/// ```text
/// {"results":[
/// {"seq":"1-g1","id":"a","changes":[{"rev":"1-x"}]},
/// {"seq":"2-g1","id":"b","changes":[{"rev":"1-y"}]}
/// ],
/// "last_seq":"2-g1","pending":0}
/// ```
///
/// Element lines decode as records once their trailing comma is dropped.
/// Every other line is framing; the only thing taken from it is `last_seq`.
pub struct BatchParser {
    batch_size: usize,
    batch: Vec<ChangeRecord>,
    last_seq: Option<Cursor>,
}

impl BatchParser {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            batch: Vec::with_capacity(batch_size),
            last_seq: None,
        }
    }

    /// Feed one line. Returns a full batch when this line completed one.
    pub fn push_line(&mut self, line: &str) -> Option<Vec<ChangeRecord>> {
        let line = line.strip_suffix(',').unwrap_or(line);

        match serde_json::from_str::<ChangeRecord>(line) {
            Ok(change) => {
                self.batch.push(change);
                if self.batch.len() >= self.batch_size {
                    return Some(self.take());
                }
            }
            Err(_) => match extract_last_seq(line) {
                Some(last_seq) => {
                    tracing::debug!(last_seq = %last_seq, "Recovered terminal cursor");
                    self.last_seq = Some(last_seq);
                }
                None => tracing::trace!(line, "Skipping framing line"),
            },
        }

        None
    }

    /// Whatever is left once the input has ended.
    pub fn flush(&mut self) -> Option<Vec<ChangeRecord>> {
        if self.batch.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// `last_seq` from the trailer, if one has been seen
    pub fn last_seq(&self) -> Option<&Cursor> {
        self.last_seq.as_ref()
    }

    /// `last_seq` from the trailer, or `"0"` when the trailer never arrived.
    pub fn terminal_cursor(&self) -> Cursor {
        self.last_seq.clone().unwrap_or_else(Cursor::zero)
    }

    /// Records buffered but not yet emitted
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn take(&mut self) -> Vec<ChangeRecord> {
        std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size))
    }
}

/// Pulls the `last_seq` value out of a trailer line that is not valid JSON
/// on its own, e.g. `"last_seq":"5-g1AAAA","pending":0}`.
///
/// Only a string or number directly after the key counts. Anything else is
/// treated as "no cursor here".
pub fn extract_last_seq(line: &str) -> Option<Cursor> {
    const KEY: &str = "\"last_seq\"";

    let start = line.find(KEY)? + KEY.len();
    let value = line[start..].trim_start().strip_prefix(':')?;

    let mut values = serde_json::Deserializer::from_str(value).into_iter::<Value>();
    match values.next()? {
        Ok(value) => Cursor::from_json(&value),
        Err(_) => None,
    }
}
