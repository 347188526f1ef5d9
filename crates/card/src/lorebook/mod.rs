//! Lorebook ("world info") activation engine.
//!
//! | Stage | Where |
//! |-------|-------|
//! | Ingest & validation | [`entry::ingest`] |
//! | Activation scan | [`scanner::scan`] |
//! | Slot allocation | [`entry::WorldInfo`] |

pub mod entry;
pub mod scanner;

pub use entry::{
    compile_key, depth_between, ingest, join_contents, role_from_code, role_from_name, role_groups,
    sort_by_order, ActivatedEntry, Entry, Key, Position, WorldInfo,
};
pub use scanner::{scan, CardFields, ScanInput, HAYSTACK_DELIM};
