mod batch_parser;
mod line_splitter;

pub use batch_parser::{extract_last_seq, BatchParser};
pub use line_splitter::{split_lines, LineSplitter};
