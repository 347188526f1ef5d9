//! Runtime settings threaded through card application.
//!
//! The original system kept the user name and persona in module-level
//! globals; here they are an explicit record passed to every `apply` call,
//! so the core holds no process-wide mutable state.

use serde::{Deserialize, Serialize};

/// Per-request settings for prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSettings {
    /// Display name substituted for `{{user}}` / `<USER>`.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Persona text substituted for `{{persona}}` and emitted as the first
    /// character-definition message when non-empty.
    #[serde(default)]
    pub user_persona: String,

    /// Marker message emitted before the chat history.
    #[serde(default = "default_new_main_chat")]
    pub new_main_chat: String,

    /// Marker message emitted before each example-dialogue block.
    #[serde(default = "default_new_example_chat")]
    pub new_example_chat: String,

    /// Default case sensitivity for lore keys that leave it unset.
    #[serde(default)]
    pub case_sensitive: bool,

    /// Default whole-word matching for lore keys that leave it unset.
    #[serde(default = "default_true")]
    pub match_whole_words: bool,

    /// How many recent history messages form the scan window when neither
    /// the entry nor the lorebook overrides it. `None` scans the whole
    /// history.
    #[serde(default)]
    pub scan_depth: Option<u32>,
}

fn default_user_name() -> String {
    "用户".into()
}

fn default_new_main_chat() -> String {
    "[Start a new Chat]".into()
}

fn default_new_example_chat() -> String {
    "[Example Chat]".into()
}

fn default_true() -> bool {
    true
}

impl Default for CardSettings {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            user_persona: String::new(),
            new_main_chat: default_new_main_chat(),
            new_example_chat: default_new_example_chat(),
            case_sensitive: false,
            match_whole_words: true,
            scan_depth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = CardSettings::default();
        assert_eq!(s.user_name, "用户");
        assert_eq!(s.user_persona, "");
        assert_eq!(s.new_main_chat, "[Start a new Chat]");
        assert_eq!(s.new_example_chat, "[Example Chat]");
        assert!(!s.case_sensitive);
        assert!(s.match_whole_words);
        assert_eq!(s.scan_depth, None);
    }

    #[test]
    fn empty_json_uses_defaults() {
        let s: CardSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.user_name, "用户");
        assert!(s.match_whole_words);
    }
}
