//! Placeholder substitution for composed prompt text.
//!
//! Expansion is a single left-to-right pass: replacement text is never
//! rescanned, so `{{char}}` expanding to a name that itself contains
//! `{{user}}` stays literal. Placeholder matching is ASCII
//! case-insensitive (`{{USER}}` works).

use loregate_core::CardSettings;

use crate::ccv3::CharacterCardData;

/// Expands the fixed placeholder table over free text.
///
/// Built once per `apply` call from the card and the request settings, then
/// used for every emitted message.
pub struct MacroEvaluator {
    table: Vec<(&'static str, String)>,
}

impl MacroEvaluator {
    /// Build the substitution table for a card + settings pair.
    pub fn new(data: &CharacterCardData, settings: &CardSettings) -> Self {
        let char_name = data.nickname.clone().unwrap_or_else(|| data.name.clone());
        let table = vec![
            ("{{newline}}", "\n".to_string()),
            ("{{noop}}", String::new()),
            ("{{user}}", settings.user_name.clone()),
            ("<USER>", settings.user_name.clone()),
            ("{{char}}", char_name.clone()),
            ("<BOT>", char_name),
            ("{{description}}", data.description.clone()),
            ("{{scenario}}", data.scenario.clone()),
            ("{{personality}}", data.personality.clone()),
            ("{{persona}}", settings.user_persona.clone()),
            ("{{mesExamplesRaw}}", data.mes_example.clone()),
        ];
        Self { table }
    }

    /// Expand all placeholders in `input`. Non-placeholder text passes
    /// through unchanged.
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        'scan: while !rest.is_empty() {
            // Placeholders are pure ASCII, so a byte-wise case-insensitive
            // prefix compare is also UTF-8 safe.
            for (placeholder, replacement) in &self.table {
                if rest.len() >= placeholder.len()
                    && rest.as_bytes()[..placeholder.len()]
                        .eq_ignore_ascii_case(placeholder.as_bytes())
                {
                    out.push_str(replacement);
                    rest = &rest[placeholder.len()..];
                    continue 'scan;
                }
            }
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                out.push(ch);
            }
            rest = chars.as_str();
        }

        out
    }
}
