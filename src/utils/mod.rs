pub mod collection_ext;
pub mod error;

pub use collection_ext::{unique_by_key, unique_ordered};
pub use error::{InvestigationError, InvestigationResult};
