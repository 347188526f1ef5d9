//! Runtime lorebook entries and the seven insertion slots.
//!
//! [`ingest`] converts the raw document entries into validated [`Entry`]
//! values: disabled entries are dropped, vectorized entries are skipped with
//! a warning, role/position/depth codes are checked, and every key is
//! compiled exactly once. [`WorldInfo`] is the slot allocator: it partitions
//! activated entries into their positions, ordered within each slot by
//! descending `insertion_order` (declaration order breaks ties).

use loregate_core::{EntryError, Role};
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::ccv3::Lorebook;

/// The seven insertion slots, with their CCv3 wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    /// Before the character-definition block (code 0).
    BeforeCharDefs,
    /// After the character-definition block (code 1).
    AfterCharDefs,
    /// Top of the author's-note region (code 2).
    TopOfAuthorsNote,
    /// Bottom of the author's-note region (code 3).
    BottomOfAuthorsNote,
    /// Interleaved into the history at the entry's depth (code 4).
    AtDepth,
    /// Parsed as example dialogue, before the card's examples (code 5).
    BeforeExampleMessages,
    /// Parsed as example dialogue, after the card's examples (code 6).
    AfterExampleMessages,
}

impl Position {
    /// Decode a CCv3 position code.
    pub fn from_code(code: i64) -> Result<Self, EntryError> {
        match code {
            0 => Ok(Position::BeforeCharDefs),
            1 => Ok(Position::AfterCharDefs),
            2 => Ok(Position::TopOfAuthorsNote),
            3 => Ok(Position::BottomOfAuthorsNote),
            4 => Ok(Position::AtDepth),
            5 => Ok(Position::BeforeExampleMessages),
            6 => Ok(Position::AfterExampleMessages),
            other => Err(EntryError::UnknownPosition(other)),
        }
    }
}

/// Decode a CCv3 entry role code.
pub fn role_from_code(code: i64) -> Result<Role, EntryError> {
    match code {
        0 => Ok(Role::System),
        1 => Ok(Role::User),
        2 => Ok(Role::Assistant),
        other => Err(EntryError::UnknownRole(other)),
    }
}

/// Decode a depth-prompt role name.
pub fn role_from_name(name: &str) -> Result<Role, EntryError> {
    match name {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(EntryError::UnknownDepthPromptRole(other.to_string())),
    }
}

/// A compiled match token.
#[derive(Debug, Clone)]
pub enum Key {
    /// A `/pattern/flags` literal, tested against the haystack.
    Pattern(Regex),
    /// A plain substring needle.
    Text(String),
}

/// Compile a raw key string.
///
/// Keys of the form `/pattern/flags` with flags drawn from `gimsuy` become
/// regexes (`i`, `m`, `s` honored; `g`, `u`, `y` accepted and ignored). An
/// unescaped `/` inside the pattern body, or a body that fails to compile,
/// demotes the key to a plain substring with a debug log.
pub fn compile_key(raw: &str) -> Key {
    if let Some((body, flags)) = split_regex_literal(raw) {
        match compile_pattern(body, flags) {
            Ok(regex) => return Key::Pattern(regex),
            Err(reason) => {
                debug!(key = raw, %reason, "Ignoring invalid regex key, matching as substring");
            }
        }
    }
    Key::Text(raw.to_string())
}

/// Split `/body/flags` into its parts, or `None` if `raw` is not shaped
/// like a regex literal at all.
fn split_regex_literal(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix('/')?;
    let close = rest.rfind('/')?;
    let body = &rest[..close];
    if body.is_empty() {
        return None;
    }
    Some((body, &rest[close + 1..]))
}

fn compile_pattern(body: &str, flags: &str) -> Result<Regex, String> {
    if let Some(bad) = flags.chars().find(|c| !"gimsuy".contains(*c)) {
        return Err(format!("unknown regex flag: {bad:?}"));
    }

    // An unescaped slash inside the body means the literal was malformed
    // (e.g. `/a/b/i` before backtracking found a flags suffix).
    let mut escaped = false;
    for c in body.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '/' if !escaped => return Err("unescaped slash in pattern body".into()),
            _ => escaped = false,
        }
    }

    let body = body.replace("\\/", "/");
    let inline: String = "ims".chars().filter(|c| flags.contains(*c)).collect();
    let pattern = if inline.is_empty() {
        body
    } else {
        format!("(?{inline}){body}")
    };

    Regex::new(&pattern).map_err(|e| e.to_string())
}

/// A validated, scan-ready lorebook entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Author-facing label, used only in logs.
    pub label: String,
    /// Compiled match tokens.
    pub keys: Vec<Key>,
    /// Text injected on activation.
    pub content: String,
    /// Message role on emission.
    pub role: Role,
    /// Sort key within a slot; larger inserts earlier.
    pub order: i64,
    /// Activates unconditionally on the initial scan.
    pub constant: bool,
    /// Insertion slot.
    pub position: Position,
    /// Chat depth for the `AtDepth` slot.
    pub depth: u32,
    /// Activation probability in percent.
    pub probability: i64,
    /// Whether `probability` gates activation.
    pub use_probability: bool,
    /// Never match during recursion passes.
    pub exclude_recursion: bool,
    /// Activated content is withheld from recursion haystacks.
    pub prevent_recursion: bool,
    /// Only match during recursion passes.
    pub delay_until_recursion: bool,
    /// Per-entry scan window override.
    pub scan_depth: Option<u32>,
    /// Tri-state case sensitivity (unset inherits the runtime default).
    pub case_sensitive: Option<bool>,
    /// Tri-state whole-word matching (unset inherits the runtime default).
    pub match_whole_words: Option<bool>,
    /// Extra haystack sources drawn from the card.
    pub match_persona_description: bool,
    pub match_character_description: bool,
    pub match_character_personality: bool,
    pub match_character_depth_prompt: bool,
    pub match_scenario: bool,
    pub match_creator_notes: bool,
}

/// Convert the raw lorebook into scan-ready entries, preserving declaration
/// order. Disabled entries are dropped; vectorized entries are skipped with
/// a warning; invalid role/position/depth codes abort the request.
pub fn ingest(book: &Lorebook) -> Result<Vec<Entry>, EntryError> {
    let mut entries = Vec::with_capacity(book.entries.len());
    for raw in &book.entries {
        if !raw.enabled {
            continue;
        }
        if raw.extensions.vectorized {
            warn!(
                name = raw.label(),
                "Vectorized lorebook entries are not supported and will be ignored"
            );
            continue;
        }

        let ext = &raw.extensions;
        if ext.depth < 0 {
            return Err(EntryError::NegativeDepth(ext.depth));
        }

        entries.push(Entry {
            label: raw.label().to_string(),
            keys: raw.keys.iter().map(|k| compile_key(k)).collect(),
            content: raw.content.clone(),
            role: role_from_code(ext.role)?,
            order: raw.insertion_order,
            constant: raw.constant,
            position: Position::from_code(ext.position)?,
            depth: ext.depth as u32,
            probability: ext.probability,
            use_probability: ext.use_probability,
            exclude_recursion: ext.exclude_recursion,
            prevent_recursion: ext.prevent_recursion,
            delay_until_recursion: ext.delay_until_recursion,
            scan_depth: ext.scan_depth,
            case_sensitive: ext.case_sensitive,
            match_whole_words: ext.match_whole_words,
            match_persona_description: ext.match_persona_description,
            match_character_description: ext.match_character_description,
            match_character_personality: ext.match_character_personality,
            match_character_depth_prompt: ext.match_character_depth_prompt,
            match_scenario: ext.match_scenario,
            match_creator_notes: ext.match_creator_notes,
        });
    }
    Ok(entries)
}

/// An entry the scanner decided to emit, reduced to what the composer needs.
#[derive(Debug, Clone)]
pub struct ActivatedEntry {
    /// Text to inject.
    pub content: String,
    /// Message role on emission.
    pub role: Role,
    /// Insertion slot.
    pub position: Position,
    /// Chat depth (meaningful for the `AtDepth` slot).
    pub depth: u32,
    /// Sort key within the slot.
    pub order: i64,
}

/// Stable sort: descending `order`, declaration order breaks ties.
pub fn sort_by_order(entries: &mut [ActivatedEntry]) {
    entries.sort_by(|a, b| b.order.cmp(&a.order));
}

/// Group same-role entries, preserving first-appearance role order, and join
/// each group's contents with `\n`.
pub fn role_groups<'a, I>(entries: I) -> Vec<(Role, String)>
where
    I: IntoIterator<Item = &'a ActivatedEntry>,
{
    let mut groups: Vec<(Role, String)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(role, _)| *role == entry.role) {
            Some((_, content)) => {
                content.push('\n');
                content.push_str(&entry.content);
            }
            None => groups.push((entry.role, entry.content.clone())),
        }
    }
    groups
}

/// Entries whose depth lies in `[min, max]`; `max = None` means unbounded.
pub fn depth_between(entries: &[ActivatedEntry], min: u32, max: Option<u32>) -> Vec<&ActivatedEntry> {
    entries
        .iter()
        .filter(|e| e.depth >= min && max.is_none_or(|m| e.depth <= m))
        .collect()
}

/// Join entry contents with `\n` (used for slots re-parsed as example
/// dialogue).
pub fn join_contents(entries: &[ActivatedEntry]) -> String {
    entries
        .iter()
        .map(|e| e.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Activated entries partitioned into their insertion slots.
#[derive(Debug, Default)]
pub struct WorldInfo {
    pub before_char_defs: Vec<ActivatedEntry>,
    pub after_char_defs: Vec<ActivatedEntry>,
    pub before_example_messages: Vec<ActivatedEntry>,
    pub after_example_messages: Vec<ActivatedEntry>,
    pub at_depth: Vec<ActivatedEntry>,
    pub top_of_authors_note: Vec<ActivatedEntry>,
    pub bottom_of_authors_note: Vec<ActivatedEntry>,
}

impl WorldInfo {
    /// Partition activated entries into slots. Each slot keeps the global
    /// descending-`order` sequence.
    pub fn from_activated(mut entries: Vec<ActivatedEntry>) -> Self {
        sort_by_order(&mut entries);
        let mut wi = WorldInfo::default();
        for entry in entries {
            match entry.position {
                Position::BeforeCharDefs => wi.before_char_defs.push(entry),
                Position::AfterCharDefs => wi.after_char_defs.push(entry),
                Position::BeforeExampleMessages => wi.before_example_messages.push(entry),
                Position::AfterExampleMessages => wi.after_example_messages.push(entry),
                Position::AtDepth => wi.at_depth.push(entry),
                Position::TopOfAuthorsNote => wi.top_of_authors_note.push(entry),
                Position::BottomOfAuthorsNote => wi.bottom_of_authors_note.push(entry),
            }
        }
        wi
    }

    /// Total activated entries across all slots.
    pub fn len(&self) -> usize {
        self.before_char_defs.len()
            + self.after_char_defs.len()
            + self.before_example_messages.len()
            + self.after_example_messages.len()
            + self.at_depth.len()
            + self.top_of_authors_note.len()
            + self.bottom_of_authors_note.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccv3::LorebookEntry;

    fn raw_entry(keys: &[&str], content: &str) -> LorebookEntry {
        LorebookEntry {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            content: content.into(),
            enabled: true,
            ..LorebookEntry::default()
        }
    }

    fn activated(content: &str, position: Position, order: i64, depth: u32) -> ActivatedEntry {
        ActivatedEntry {
            content: content.into(),
            role: Role::System,
            position,
            depth,
            order,
        }
    }

    #[test]
    fn position_codes_decode() {
        assert_eq!(Position::from_code(0).unwrap(), Position::BeforeCharDefs);
        assert_eq!(Position::from_code(4).unwrap(), Position::AtDepth);
        assert_eq!(Position::from_code(6).unwrap(), Position::AfterExampleMessages);
        assert!(matches!(
            Position::from_code(7),
            Err(EntryError::UnknownPosition(7))
        ));
    }

    #[test]
    fn role_codes_decode() {
        assert_eq!(role_from_code(0).unwrap(), Role::System);
        assert_eq!(role_from_code(2).unwrap(), Role::Assistant);
        assert!(role_from_code(3).is_err());
        assert_eq!(role_from_name("user").unwrap(), Role::User);
        assert!(role_from_name("narrator").is_err());
    }

    #[test]
    fn ingest_drops_disabled_and_vectorized() {
        let mut disabled = raw_entry(&["a"], "x");
        disabled.enabled = false;
        let mut vectorized = raw_entry(&["b"], "y");
        vectorized.extensions.vectorized = true;
        let kept = raw_entry(&["c"], "z");

        let book = Lorebook {
            entries: vec![disabled, vectorized, kept],
            ..Lorebook::default()
        };
        let entries = ingest(&book).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "z");
    }

    #[test]
    fn ingest_rejects_bad_codes() {
        let mut bad_role = raw_entry(&["a"], "x");
        bad_role.extensions.role = 5;
        let book = Lorebook {
            entries: vec![bad_role],
            ..Lorebook::default()
        };
        assert!(matches!(ingest(&book), Err(EntryError::UnknownRole(5))));

        let mut bad_pos = raw_entry(&["a"], "x");
        bad_pos.extensions.position = -1;
        let book = Lorebook {
            entries: vec![bad_pos],
            ..Lorebook::default()
        };
        assert!(matches!(ingest(&book), Err(EntryError::UnknownPosition(-1))));

        let mut bad_depth = raw_entry(&["a"], "x");
        bad_depth.extensions.depth = -2;
        let book = Lorebook {
            entries: vec![bad_depth],
            ..Lorebook::default()
        };
        assert!(matches!(ingest(&book), Err(EntryError::NegativeDepth(-2))));
    }

    #[test]
    fn regex_literal_keys_compile() {
        match compile_key("/drag(on|oness)/i") {
            Key::Pattern(re) => {
                assert!(re.is_match("a DRAGON appears"));
                assert!(!re.is_match("dragging"));
            }
            Key::Text(_) => panic!("expected a compiled pattern"),
        }
    }

    #[test]
    fn ignored_flags_are_accepted() {
        assert!(matches!(compile_key("/beta/gi"), Key::Pattern(_)));
        assert!(matches!(compile_key("/beta/guy"), Key::Pattern(_)));
    }

    #[test]
    fn escaped_slash_is_unescaped() {
        match compile_key(r"/a\/b/") {
            Key::Pattern(re) => assert!(re.is_match("a/b")),
            Key::Text(_) => panic!("expected a compiled pattern"),
        }
    }

    #[test]
    fn malformed_regex_falls_back_to_substring() {
        // Unescaped slash in the body.
        assert!(matches!(compile_key("/a/b/i"), Key::Text(_)));
        // Invalid pattern syntax.
        assert!(matches!(compile_key("/dragon(/"), Key::Text(_)));
        // Unknown flag.
        assert!(matches!(compile_key("/dragon/x"), Key::Text(_)));
        // Not a regex literal at all.
        assert!(matches!(compile_key("dragon"), Key::Text(_)));
    }

    #[test]
    fn slots_sort_descending_with_stable_ties() {
        let wi = WorldInfo::from_activated(vec![
            activated("low", Position::BeforeCharDefs, 1, 0),
            activated("tie-a", Position::BeforeCharDefs, 5, 0),
            activated("high", Position::BeforeCharDefs, 10, 0),
            activated("tie-b", Position::BeforeCharDefs, 5, 0),
        ]);
        let contents: Vec<_> = wi
            .before_char_defs
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(contents, vec!["high", "tie-a", "tie-b", "low"]);
    }

    #[test]
    fn role_groups_preserve_first_appearance() {
        let entries = vec![
            ActivatedEntry {
                content: "u1".into(),
                role: Role::User,
                position: Position::AfterCharDefs,
                depth: 0,
                order: 3,
            },
            ActivatedEntry {
                content: "s1".into(),
                role: Role::System,
                position: Position::AfterCharDefs,
                depth: 0,
                order: 2,
            },
            ActivatedEntry {
                content: "u2".into(),
                role: Role::User,
                position: Position::AfterCharDefs,
                depth: 0,
                order: 1,
            },
        ];
        let groups = role_groups(&entries);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], (Role::User, "u1\nu2".into()));
        assert_eq!(groups[1], (Role::System, "s1".into()));
    }

    #[test]
    fn depth_filter_handles_unbounded_max() {
        let entries = vec![
            activated("near", Position::AtDepth, 0, 1),
            activated("far", Position::AtDepth, 0, 9),
        ];
        let tail = depth_between(&entries, 5, None);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].content, "far");

        let exact = depth_between(&entries, 1, Some(1));
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].content, "near");
    }
}
