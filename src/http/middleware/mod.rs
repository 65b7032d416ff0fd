//! Chain middleware shipped with the dispatch core.

pub mod recovery;

pub use recovery::recovery;
