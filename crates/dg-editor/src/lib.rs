pub mod actions;
pub mod error;
pub mod history;
pub mod preview;
pub mod session;

pub use error::EditorError;
pub use history::{UndoEntry, UndoManager};
pub use preview::Preview;
pub use session::Session;
