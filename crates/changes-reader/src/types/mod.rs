pub mod change;
pub mod cursor;

pub use change::{ChangeRecord, ChangesResponse};
pub use cursor::Cursor;
