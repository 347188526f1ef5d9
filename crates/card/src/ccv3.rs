//! Typed model of the `chara_card_v3` document format.
//!
//! These structs map the on-disk JSON one-to-one. Every field the engine
//! does not recognize is preserved in an opaque `extra` map so a parsed card
//! can be re-serialized without losing data. Validation beyond JSON shape
//! (spec markers, required name, role/position codes) happens in
//! [`crate::card`] and [`crate::lorebook`], not here.
//!
//! Numeric enum codes follow the CCv3 wire format: entry `role` is
//! 0 = system, 1 = user, 2 = assistant; `position` is the seven-slot code
//! documented on [`crate::lorebook::Position`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Expected value of the top-level `spec` field.
pub const SPEC: &str = "chara_card_v3";
/// Expected value of the top-level `spec_version` field.
pub const SPEC_VERSION: &str = "3.0";

/// Top-level character card document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterCard {
    /// Spec marker, must equal [`SPEC`].
    #[serde(default)]
    pub spec: String,

    /// Spec version marker, must equal [`SPEC_VERSION`].
    #[serde(default)]
    pub spec_version: String,

    /// The card payload.
    #[serde(default)]
    pub data: CharacterCardData,

    /// Unrecognized top-level fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The character definition carried by a card.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterCardData {
    /// Character display name. Required — the only mandatory field.
    #[serde(default)]
    pub name: String,

    /// Character description, emitted as a character-definition message.
    #[serde(default)]
    pub description: String,

    /// Personality sketch, emitted after the description.
    #[serde(default)]
    pub personality: String,

    /// Scenario framing, emitted after the personality.
    #[serde(default)]
    pub scenario: String,

    /// Author-provided system prompt (kept for card tooling; not part of
    /// the composed stream).
    #[serde(default)]
    pub system_prompt: String,

    /// Author-provided post-history instructions (kept for card tooling).
    #[serde(default)]
    pub post_history_instructions: String,

    /// Default greeting shown before any history exists.
    #[serde(default)]
    pub first_mes: String,

    /// Alternative greetings a frontend may pick from.
    #[serde(default)]
    pub alternate_greetings: Vec<String>,

    /// Example dialogue, `<START>`-delimited blocks with `{{user}}:` /
    /// `{{char}}:` line prefixes.
    #[serde(default)]
    pub mes_example: String,

    /// Creator notes (matchable by lore entries, never emitted).
    #[serde(default)]
    pub creator_notes: String,

    /// Optional nickname that replaces the name in `{{char}}` expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Optional lorebook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_book: Option<Lorebook>,

    /// Card-level extension block.
    #[serde(default)]
    pub extensions: CardExtensions,

    /// Unrecognized fields (tags, creator, assets, ...), preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Card-level `extensions` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardExtensions {
    /// Constant injection placed at a fixed chat depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_prompt: Option<DepthPrompt>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `extensions.depth_prompt` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthPrompt {
    /// Text injected into the chat. Empty means "no depth prompt".
    #[serde(default)]
    pub prompt: String,

    /// Chat depth at which the prompt is injected (0 = most recent).
    #[serde(default)]
    pub depth: i64,

    /// Message role: `"system"`, `"user"` or `"assistant"`.
    #[serde(default = "default_depth_prompt_role")]
    pub role: String,
}

fn default_depth_prompt_role() -> String {
    "system".into()
}

/// A lorebook ("world info" / "character book").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lorebook {
    /// Optional book name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Book-wide scan window (recent messages) for entries that leave
    /// theirs unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_depth: Option<u32>,

    /// The entries. The only field of the book the engine consumes.
    #[serde(default)]
    pub entries: Vec<LorebookEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single lorebook entry as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LorebookEntry {
    /// Match tokens: plain substrings or `/pattern/flags` regex literals.
    #[serde(default)]
    pub keys: Vec<String>,

    /// Text injected when the entry activates.
    #[serde(default)]
    pub content: String,

    /// Disabled entries are dropped at ingest.
    #[serde(default)]
    pub enabled: bool,

    /// Sort key within a slot; larger inserts earlier.
    #[serde(default)]
    pub insertion_order: i64,

    /// Activates unconditionally on the initial scan.
    #[serde(default)]
    pub constant: bool,

    /// Author-facing label (preferred for logging).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Alternative author-facing label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Behavioral extension block.
    #[serde(default)]
    pub extensions: EntryExtensions,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LorebookEntry {
    /// Best-effort display label for logs.
    pub fn label(&self) -> &str {
        self.comment
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

/// Entry-level `extensions` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryExtensions {
    /// Insertion slot code (0–6); see [`crate::lorebook::Position`].
    #[serde(default)]
    pub position: i64,

    /// Chat depth for the `AtDepth` slot (0 = most recent message).
    #[serde(default)]
    pub depth: i64,

    /// Message role code: 0 = system, 1 = user, 2 = assistant.
    #[serde(default)]
    pub role: i64,

    /// Activation probability in percent, gated by `use_probability`.
    #[serde(default)]
    pub probability: i64,

    /// Whether `probability` gates activation.
    #[serde(default, rename = "useProbability")]
    pub use_probability: bool,

    /// Never match during recursion passes.
    #[serde(default)]
    pub exclude_recursion: bool,

    /// Activated content is withheld from recursion haystacks.
    #[serde(default)]
    pub prevent_recursion: bool,

    /// Only match during recursion passes.
    #[serde(default)]
    pub delay_until_recursion: bool,

    /// Per-entry scan window override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_depth: Option<u32>,

    /// Tri-state whole-word matching; unset inherits the runtime default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_whole_words: Option<bool>,

    /// Tri-state case sensitivity; unset inherits the runtime default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    /// Entries flagged for vector retrieval are ignored (unsupported).
    #[serde(default)]
    pub vectorized: bool,

    /// Also match against the runtime user persona.
    #[serde(default)]
    pub match_persona_description: bool,

    /// Also match against `data.description`.
    #[serde(default)]
    pub match_character_description: bool,

    /// Also match against `data.personality`.
    #[serde(default)]
    pub match_character_personality: bool,

    /// Also match against `extensions.depth_prompt.prompt`.
    #[serde(default)]
    pub match_character_depth_prompt: bool,

    /// Also match against `data.scenario`.
    #[serde(default)]
    pub match_scenario: bool,

    /// Also match against `data.creator_notes`.
    #[serde(default)]
    pub match_creator_notes: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card_json() -> &'static str {
        r#"{
            "spec": "chara_card_v3",
            "spec_version": "3.0",
            "data": {
                "name": "Mirela",
                "description": "A wandering cartographer.",
                "personality": "Curious, dry-witted.",
                "scenario": "A rain-soaked border town.",
                "first_mes": "You look lost.",
                "alternate_greetings": ["Maps, is it?"],
                "mes_example": "<START>\n{{user}}: Where am I?\n{{char}}: Off the edge of my map.",
                "creator_notes": "Keep her terse.",
                "tags": ["fantasy"],
                "extensions": {
                    "depth_prompt": {"prompt": "She never mentions the war.", "depth": 2, "role": "system"}
                },
                "character_book": {
                    "scan_depth": 5,
                    "entries": [
                        {
                            "keys": ["map", "/compass(es)?/i"],
                            "content": "Her maps omit the capital.",
                            "enabled": true,
                            "insertion_order": 7,
                            "extensions": {
                                "position": 1,
                                "probability": 50,
                                "useProbability": true,
                                "match_scenario": true
                            }
                        }
                    ]
                }
            }
        }"#
    }

    #[test]
    fn parses_full_card() {
        let card: CharacterCard = serde_json::from_str(sample_card_json()).unwrap();
        assert_eq!(card.spec, SPEC);
        assert_eq!(card.spec_version, SPEC_VERSION);
        assert_eq!(card.data.name, "Mirela");
        assert_eq!(card.data.alternate_greetings.len(), 1);

        let dp = card.data.extensions.depth_prompt.as_ref().unwrap();
        assert_eq!(dp.depth, 2);
        assert_eq!(dp.role, "system");

        let book = card.data.character_book.as_ref().unwrap();
        assert_eq!(book.scan_depth, Some(5));
        let entry = &book.entries[0];
        assert!(entry.enabled);
        assert_eq!(entry.insertion_order, 7);
        assert_eq!(entry.extensions.position, 1);
        assert!(entry.extensions.use_probability);
        assert!(entry.extensions.match_scenario);
        assert_eq!(entry.extensions.match_whole_words, None);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let card: CharacterCard = serde_json::from_str(sample_card_json()).unwrap();
        assert_eq!(
            card.data.extra.get("tags"),
            Some(&serde_json::json!(["fantasy"]))
        );

        // Re-serialize and confirm the unknown field survives.
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["data"]["tags"], serde_json::json!(["fantasy"]));
    }

    #[test]
    fn recognized_fields_roundtrip() {
        let card: CharacterCard = serde_json::from_str(sample_card_json()).unwrap();
        let reserialized = serde_json::to_string(&card).unwrap();
        let back: CharacterCard = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(back.data.name, card.data.name);
        assert_eq!(back.data.mes_example, card.data.mes_example);
        assert_eq!(
            back.data.character_book.as_ref().unwrap().entries[0].keys,
            card.data.character_book.as_ref().unwrap().entries[0].keys
        );
    }

    #[test]
    fn missing_fields_default() {
        let card: CharacterCard =
            serde_json::from_str(r#"{"spec":"chara_card_v3","spec_version":"3.0","data":{"name":"N"}}"#)
                .unwrap();
        assert_eq!(card.data.description, "");
        assert!(card.data.character_book.is_none());
        assert!(card.data.extensions.depth_prompt.is_none());
    }

    #[test]
    fn entry_defaults_to_disabled() {
        let entry: LorebookEntry = serde_json::from_str(r#"{"keys":["x"],"content":"y"}"#).unwrap();
        assert!(!entry.enabled);
    }
}
