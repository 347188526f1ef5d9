//! The prompt composer — emits the final ordered message sequence.
//!
//! Regions, in order: before-char-defs slot, character definitions,
//! after-char-defs slot, example dialogue (lore slot / card examples / lore
//! slot), the main-chat marker, the history with at-depth injections, and
//! the author's-note slots as a trailing region. Empty regions are skipped.
//!
//! Every piece of composed text passes once through the macro evaluator and
//! is trimmed; results that end up empty are dropped. History messages are
//! the one exception: they are forwarded verbatim.

use loregate_core::{CardSettings, Message, Role};

use crate::ccv3::CharacterCardData;
use crate::lorebook::{depth_between, join_contents, role_groups, ActivatedEntry, WorldInfo};
use crate::macros::MacroEvaluator;

/// Delimiter substituted for `{{user}}:` / `{{char}}:` while segmenting an
/// example block.
const SPEAKER_DELIM: &str = "\x01\x02";

/// Composes the final message sequence for one request.
pub struct Composer<'a> {
    data: &'a CharacterCardData,
    macros: &'a MacroEvaluator,
    settings: &'a CardSettings,
}

impl<'a> Composer<'a> {
    pub fn new(
        data: &'a CharacterCardData,
        macros: &'a MacroEvaluator,
        settings: &'a CardSettings,
    ) -> Self {
        Self {
            data,
            macros,
            settings,
        }
    }

    /// Emit all regions. `world_info` is `None` when the card has no
    /// lorebook and no depth prompt.
    pub fn compose(&self, history: &[Message], world_info: Option<&WorldInfo>) -> Vec<Message> {
        let mut messages = Vec::new();

        match world_info {
            None => {
                messages.extend(self.char_def_messages());
                messages.extend(self.example_messages(&self.data.mes_example));
            }
            Some(wi) => {
                self.apply_entries(&mut messages, &wi.before_char_defs);
                messages.extend(self.char_def_messages());
                self.apply_entries(&mut messages, &wi.after_char_defs);

                messages
                    .extend(self.example_messages(&join_contents(&wi.before_example_messages)));
                messages.extend(self.example_messages(&self.data.mes_example));
                messages.extend(self.example_messages(&join_contents(&wi.after_example_messages)));
            }
        }

        messages.extend(self.main_chat(history, world_info));

        // No author's-note text exists in this system; both slots land as a
        // trailing region, top slot first.
        if let Some(wi) = world_info {
            self.apply_entries(&mut messages, &wi.top_of_authors_note);
            self.apply_entries(&mut messages, &wi.bottom_of_authors_note);
        }

        messages
    }

    /// Character definitions: persona, description, personality, scenario,
    /// each as a system message.
    fn char_def_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        self.push_prompt(&mut messages, Role::System, &self.settings.user_persona);
        self.push_prompt(&mut messages, Role::System, &self.data.description);
        self.push_prompt(&mut messages, Role::System, &self.data.personality);
        self.push_prompt(&mut messages, Role::System, &self.data.scenario);
        messages
    }

    /// Segment example dialogue: split on `<START>`, emit a marker per
    /// non-empty block, then each speaker turn as its own system message.
    fn example_messages(&self, raw: &str) -> Vec<Message> {
        if raw.is_empty() {
            return Vec::new();
        }
        let mut messages = Vec::new();
        for block in raw.split("<START>") {
            if self.process(block).is_empty() {
                continue;
            }
            self.push_prompt(&mut messages, Role::System, &self.settings.new_example_chat);
            let segmented = block
                .replace("{{user}}:", SPEAKER_DELIM)
                .replace("{{char}}:", SPEAKER_DELIM);
            for turn in segmented.split(SPEAKER_DELIM) {
                self.push_prompt(&mut messages, Role::System, turn);
            }
        }
        messages
    }

    /// The marker message followed by the history with at-depth injections.
    ///
    /// Depth counts from the most-recent end: an entry at depth `d` lands
    /// right after the message that still has `d` messages following it.
    /// Entries at or beyond the history length form the tail bucket emitted
    /// before the oldest message.
    fn main_chat(&self, history: &[Message], world_info: Option<&WorldInfo>) -> Vec<Message> {
        let mut messages = Vec::new();
        self.push_prompt(&mut messages, Role::System, &self.settings.new_main_chat);

        let Some(wi) = world_info else {
            messages.extend(history.iter().cloned());
            return messages;
        };

        let total = history.len();
        for (i, msg) in history.iter().enumerate() {
            if i == 0 {
                let tail = depth_between(&wi.at_depth, total as u32, None);
                self.apply_entries(&mut messages, tail);
            }
            messages.push(msg.clone());
            let depth = (total - i - 1) as u32;
            let bucket = depth_between(&wi.at_depth, depth, Some(depth));
            self.apply_entries(&mut messages, bucket);
        }
        messages
    }

    /// Emit a slot: one message per role group, same-role contents joined
    /// with `\n`, in first-appearance role order.
    fn apply_entries<'e, I>(&self, messages: &mut Vec<Message>, entries: I)
    where
        I: IntoIterator<Item = &'e ActivatedEntry>,
    {
        for (role, content) in role_groups(entries) {
            self.push_prompt(messages, role, &content);
        }
    }

    fn push_prompt(&self, messages: &mut Vec<Message>, role: Role, text: &str) {
        let content = self.process(text);
        if !content.is_empty() {
            messages.push(Message { role, content });
        }
    }

    /// Macro expansion followed by trimming of surrounding spaces and
    /// newlines.
    fn process(&self, text: &str) -> String {
        self.macros
            .expand(text)
            .trim_matches([' ', '\r', '\n'])
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorebook::Position;

    fn data(description: &str, mes_example: &str) -> CharacterCardData {
        CharacterCardData {
            name: "Alice".into(),
            description: description.into(),
            mes_example: mes_example.into(),
            ..CharacterCardData::default()
        }
    }

    fn compose(
        data: &CharacterCardData,
        settings: &CardSettings,
        history: &[Message],
        wi: Option<&WorldInfo>,
    ) -> Vec<Message> {
        let macros = MacroEvaluator::new(data, settings);
        Composer::new(data, &macros, settings).compose(history, wi)
    }

    fn entry(content: &str, position: Position, order: i64, depth: u32, role: Role) -> ActivatedEntry {
        ActivatedEntry {
            content: content.into(),
            role,
            position,
            depth,
            order,
        }
    }

    #[test]
    fn minimal_card_composes_three_messages() {
        let data = data("A curious girl.", "");
        let history = [Message::user("Hello")];
        let out = compose(&data, &CardSettings::default(), &history, None);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Message::system("A curious girl."));
        assert_eq!(out[1], Message::system("[Start a new Chat]"));
        assert_eq!(out[2], Message::user("Hello"));
    }

    #[test]
    fn persona_leads_the_character_definitions() {
        let data = data("Desc.", "");
        let settings = CardSettings {
            user_persona: "A tired detective.".into(),
            ..CardSettings::default()
        };
        let out = compose(&data, &settings, &[Message::user("Hi")], None);
        assert_eq!(out[0].content, "A tired detective.");
        assert_eq!(out[1].content, "Desc.");
    }

    #[test]
    fn example_blocks_are_segmented() {
        let data = data(
            "",
            "<START>\n{{user}}: Where am I?\n{{char}}: Lost.\n<START>\n{{user}}: Again?",
        );
        let out = compose(&data, &CardSettings::default(), &[Message::user("Hi")], None);

        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "[Example Chat]",
                "Where am I?",
                "Lost.",
                "[Example Chat]",
                "Again?",
                "[Start a new Chat]",
                "Hi",
            ]
        );
        assert!(out.iter().take(5).all(|m| m.role == Role::System));
    }

    #[test]
    fn empty_example_blocks_emit_no_marker() {
        let data = data("", "<START>\n   \n<START>\n{{user}}: real");
        let out = compose(&data, &CardSettings::default(), &[Message::user("Hi")], None);
        let markers = out.iter().filter(|m| m.content == "[Example Chat]").count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn slots_wrap_the_character_definitions() {
        let data = data("DEFS", "");
        let wi = WorldInfo::from_activated(vec![
            entry("BEFORE", Position::BeforeCharDefs, 0, 0, Role::System),
            entry("AFTER", Position::AfterCharDefs, 0, 0, Role::System),
        ]);
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("Hi")],
            Some(&wi),
        );
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["BEFORE", "DEFS", "AFTER", "[Start a new Chat]", "Hi"]
        );
    }

    #[test]
    fn same_role_slot_entries_merge_into_one_message() {
        let data = data("", "");
        let wi = WorldInfo::from_activated(vec![
            entry("first", Position::AfterCharDefs, 9, 0, Role::System),
            entry("second", Position::AfterCharDefs, 1, 0, Role::System),
            entry("aside", Position::AfterCharDefs, 5, 0, Role::Assistant),
        ]);
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("Hi")],
            Some(&wi),
        );
        // System group first (first-appearance order), joined by newline.
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content, "first\nsecond");
        assert_eq!(out[1].role, Role::Assistant);
        assert_eq!(out[1].content, "aside");
    }

    #[test]
    fn at_depth_entry_lands_between_messages() {
        let data = data("", "");
        let wi = WorldInfo::from_activated(vec![entry(
            "WHISPER",
            Position::AtDepth,
            0,
            1,
            Role::System,
        )]);
        let history = [
            Message::user("u1"),
            Message::assistant("a1"),
            Message::user("u2"),
        ];
        let out = compose(&data, &CardSettings::default(), &history, Some(&wi));
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["[Start a new Chat]", "u1", "a1", "WHISPER", "u2"]
        );
    }

    #[test]
    fn at_depth_zero_lands_after_the_last_message() {
        let data = data("", "");
        let wi = WorldInfo::from_activated(vec![entry(
            "NOW",
            Position::AtDepth,
            0,
            0,
            Role::System,
        )]);
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("only")],
            Some(&wi),
        );
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["[Start a new Chat]", "only", "NOW"]);
    }

    #[test]
    fn deep_entries_form_the_tail_bucket() {
        let data = data("", "");
        let wi = WorldInfo::from_activated(vec![
            entry("DEEP", Position::AtDepth, 0, 7, Role::System),
            entry("DEEPER", Position::AtDepth, 0, 99, Role::System),
        ]);
        let history = [Message::user("u1"), Message::user("u2")];
        let out = compose(&data, &CardSettings::default(), &history, Some(&wi));
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        // Both exceed the history length, so they merge before the oldest
        // message as one system group.
        assert_eq!(contents, vec!["[Start a new Chat]", "DEEP\nDEEPER", "u1", "u2"]);
    }

    #[test]
    fn authors_note_slots_trail_the_history() {
        let data = data("", "");
        let wi = WorldInfo::from_activated(vec![
            entry("BOTTOM", Position::BottomOfAuthorsNote, 0, 0, Role::System),
            entry("TOP", Position::TopOfAuthorsNote, 0, 0, Role::System),
        ]);
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("Hi")],
            Some(&wi),
        );
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["[Start a new Chat]", "Hi", "TOP", "BOTTOM"]);
    }

    #[test]
    fn slot_entries_are_macro_expanded_and_empty_results_dropped() {
        let data = data("", "");
        let wi = WorldInfo::from_activated(vec![
            entry("{{char}} hums.", Position::BeforeCharDefs, 2, 0, Role::System),
            entry("{{noop}}", Position::AfterCharDefs, 1, 0, Role::System),
        ]);
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("Hi")],
            Some(&wi),
        );
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Alice hums.", "[Start a new Chat]", "Hi"]);
    }

    #[test]
    fn history_content_is_not_expanded() {
        let data = data("", "");
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("say {{char}} verbatim")],
            None,
        );
        assert_eq!(out.last().unwrap().content, "say {{char}} verbatim");
    }

    #[test]
    fn lore_example_slots_are_parsed_as_dialogue() {
        let data = data("", "<START>\n{{user}}: from card");
        let wi = WorldInfo::from_activated(vec![
            entry(
                "<START>\n{{user}}: from before-slot",
                Position::BeforeExampleMessages,
                0,
                0,
                Role::System,
            ),
            entry(
                "<START>\n{{char}}: from after-slot",
                Position::AfterExampleMessages,
                0,
                0,
                Role::System,
            ),
        ]);
        let out = compose(
            &data,
            &CardSettings::default(),
            &[Message::user("Hi")],
            Some(&wi),
        );
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "[Example Chat]",
                "from before-slot",
                "[Example Chat]",
                "from card",
                "[Example Chat]",
                "from after-slot",
                "[Start a new Chat]",
                "Hi",
            ]
        );
    }
}
