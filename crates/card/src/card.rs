//! The `Card` type — parse a CCv3 document, apply it to a chat history.
//!
//! `apply` is a pure pipeline over immutable card data: validate the
//! history, scan the lorebook, allocate slots, compose. Per-request scratch
//! state lives on the call frame, so one `Card` can serve concurrent
//! requests by shared reference. Randomness is injectable
//! ([`Card::apply_with_rng`]) so tests can pin the probability rolls.

use loregate_core::{CardError, CardSettings, EntryError, Error, HistoryError, Message, Role};
use rand::Rng;
use tracing::debug;

use crate::ccv3::{CharacterCard, CharacterCardData, SPEC, SPEC_VERSION};
use crate::compose::Composer;
use crate::lorebook::{
    ingest, role_from_name, scan, ActivatedEntry, CardFields, Position, ScanInput, WorldInfo,
    HAYSTACK_DELIM,
};
use crate::macros::MacroEvaluator;

/// The synthetic depth-prompt entry sorts ahead of everything else in its
/// slot.
const DEPTH_PROMPT_ORDER: i64 = 1024;

/// A parsed, validated character card.
#[derive(Debug, Clone)]
pub struct Card {
    data: CharacterCardData,
}

impl Card {
    /// Parse and validate card bytes (UTF-8 JSON).
    ///
    /// A card is valid iff `spec == "chara_card_v3"`,
    /// `spec_version == "3.0"` and `data.name` is non-empty.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let card: CharacterCard = serde_json::from_slice(bytes).map_err(CardError::Json)?;
        if card.spec != SPEC || card.spec_version != SPEC_VERSION {
            return Err(CardError::SpecMismatch {
                spec: card.spec,
                spec_version: card.spec_version,
            }
            .into());
        }
        if card.data.name.is_empty() {
            return Err(CardError::MissingName.into());
        }
        debug!(
            name = %card.data.name,
            entries = card
                .data
                .character_book
                .as_ref()
                .map_or(0, |b| b.entries.len()),
            "character card loaded"
        );
        Ok(Self { data: card.data })
    }

    /// The character's display name.
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// The full card payload.
    pub fn data(&self) -> &CharacterCardData {
        &self.data
    }

    /// The default greeting, if the card carries one.
    pub fn greeting(&self) -> Option<&str> {
        if self.data.first_mes.is_empty() {
            None
        } else {
            Some(&self.data.first_mes)
        }
    }

    /// Alternative greetings a frontend may pick from.
    pub fn alternate_greetings(&self) -> &[String] {
        &self.data.alternate_greetings
    }

    /// Apply the card to a chat history using the platform RNG for
    /// probability rolls.
    pub fn apply(
        &self,
        history: &[Message],
        settings: &CardSettings,
    ) -> Result<Vec<Message>, Error> {
        self.apply_with_rng(history, settings, &mut rand::rng())
    }

    /// Apply the card with an injected RNG. Given a fixed seed the output
    /// is fully deterministic.
    pub fn apply_with_rng<R: Rng>(
        &self,
        history: &[Message],
        settings: &CardSettings,
        rng: &mut R,
    ) -> Result<Vec<Message>, Error> {
        let history = validate_history(history)?;
        let world_info = self.check_world_info(&history, settings, rng)?;

        let macros = MacroEvaluator::new(&self.data, settings);
        let composer = Composer::new(&self.data, &macros, settings);
        let messages = composer.compose(&history, world_info.as_ref());
        debug!(
            activated = world_info.as_ref().map_or(0, WorldInfo::len),
            total = messages.len(),
            "character card applied"
        );
        Ok(messages)
    }

    /// Run the lorebook scan and build the slot allocation. `None` when the
    /// card has neither lore entries nor a depth prompt.
    fn check_world_info<R: Rng>(
        &self,
        history: &[Message],
        settings: &CardSettings,
        rng: &mut R,
    ) -> Result<Option<WorldInfo>, Error> {
        let entries = match &self.data.character_book {
            Some(book) => ingest(book)?,
            None => Vec::new(),
        };
        let depth_prompt = self
            .data
            .extensions
            .depth_prompt
            .as_ref()
            .filter(|dp| !dp.prompt.is_empty());

        if entries.is_empty() && depth_prompt.is_none() {
            return Ok(None);
        }

        let fields = CardFields {
            persona: &settings.user_persona,
            description: &self.data.description,
            personality: &self.data.personality,
            depth_prompt: depth_prompt.map_or("", |dp| dp.prompt.as_str()),
            scenario: &self.data.scenario,
            creator_notes: &self.data.creator_notes,
        };
        let input = ScanInput {
            entries: &entries,
            history,
            fields,
            book_scan_depth: self
                .data
                .character_book
                .as_ref()
                .and_then(|book| book.scan_depth),
        };
        let mut activated = scan(&input, settings, rng);

        if let Some(dp) = depth_prompt {
            if dp.depth < 0 {
                return Err(EntryError::NegativeDepth(dp.depth).into());
            }
            activated.push(ActivatedEntry {
                content: dp.prompt.clone(),
                role: role_from_name(&dp.role)?,
                position: Position::AtDepth,
                depth: dp.depth as u32,
                order: DEPTH_PROMPT_ORDER,
            });
            debug!(role = %dp.role, depth = dp.depth, "depth prompt activated");
        }

        Ok(Some(WorldInfo::from_activated(activated)))
    }
}

/// Validate the incoming history and strip the reserved haystack delimiter
/// from its content.
///
/// A history is valid iff it contains no system message and its last
/// element is a non-empty user message.
fn validate_history(history: &[Message]) -> Result<Vec<Message>, Error> {
    let mut cleaned = Vec::with_capacity(history.len());
    for (index, msg) in history.iter().enumerate() {
        if msg.role == Role::System {
            return Err(HistoryError::ContainsSystem { index }.into());
        }
        cleaned.push(Message {
            role: msg.role,
            content: msg.content.replace(HAYSTACK_DELIM, ""),
        });
    }
    match cleaned.last() {
        None => return Err(HistoryError::Empty.into()),
        Some(last) if last.role != Role::User => return Err(HistoryError::LastNotUser.into()),
        Some(last) if last.content.is_empty() => return Err(HistoryError::LastEmpty.into()),
        Some(_) => {}
    }
    Ok(cleaned)
}
