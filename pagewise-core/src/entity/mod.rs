//! Named-entity extraction and tracking
//!
//! Entities (people, tools, organizations, concepts) are pulled out of the
//! text a reader selects and tracked across the pages they show up on.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let extractor = select_extractor(model, &EntityConfig::default());
//! let result = extractor.extract(text, &EntitySource::from_url(url)).await?;
//! tracker.observe(result.entities).await?;
//! ```

mod dedup;
mod extractor;
mod tracker;
mod types;

pub use dedup::{deduplicate, normalize_name};
pub use extractor::{
    EntityConfig, EntityExtractor, LlmEntityExtractor, PatternEntityExtractor, select_extractor,
};
pub use tracker::{EntityTracker, compute_importance};
pub use types::*;
