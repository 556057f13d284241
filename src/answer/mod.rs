//! Optional answer generation wrapping hybrid search hits into a
//! grounded, cited response.

pub mod composer;

pub use composer::{AnswerComposer, ComposedAnswer};
