pub mod index;
pub mod knowledge;
pub mod system;

pub use index::{Document, VectorIndex};
pub use system::RagSystem;
