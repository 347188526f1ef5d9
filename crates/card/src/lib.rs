//! # Loregate Card
//!
//! The prompt-assembly core of the Loregate gateway. Given a parsed CCv3
//! character card and a validated chat history, it produces the final
//! ordered message sequence for a downstream completion endpoint:
//!
//! ```text
//! card bytes ──parse──▶ Card
//! (Card, history, settings) ──scan──▶ activated lore entries
//!                        ──allocate──▶ seven insertion slots
//!                        ──compose──▶ ordered messages
//! ```
//!
//! The pipeline is pure and CPU-bound: a `Card` is immutable after parse,
//! per-request scratch buffers live on the call frame, and the only
//! randomness (probability rolls) is injectable. Identical inputs and an
//! identical RNG seed always produce identical output.

pub mod card;
pub mod ccv3;
pub mod compose;
pub mod lorebook;
pub mod macros;

pub use card::Card;
pub use ccv3::{CharacterCard, CharacterCardData, DepthPrompt, Lorebook, LorebookEntry};
pub use compose::Composer;
pub use lorebook::{ActivatedEntry, Entry, Key, Position, WorldInfo};
pub use macros::MacroEvaluator;
