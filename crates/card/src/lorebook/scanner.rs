//! The lorebook activation scanner.
//!
//! A fixed-point loop over per-entry state: each pass matches the
//! not-yet-activated entries against a haystack built from the recent chat
//! window, opted-in card fields, and (from the second pass on) the contents
//! activated in the previous pass. The loop ends when a pass activates
//! nothing recursion-eligible or no unactivated entries remain, so the
//! number of passes is bounded by the number of entries.

use loregate_core::{CardSettings, Message};
use rand::Rng;
use tracing::debug;

use crate::lorebook::entry::{ActivatedEntry, Entry, Key};

/// Reserved haystack delimiter. Joined between every segment so a key can
/// never match across a message boundary; stripped from user content on
/// ingest.
pub const HAYSTACK_DELIM: &str = "\x01\n";

/// Card-derived text an entry can opt into matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardFields<'a> {
    pub persona: &'a str,
    pub description: &'a str,
    pub personality: &'a str,
    pub depth_prompt: &'a str,
    pub scenario: &'a str,
    pub creator_notes: &'a str,
}

/// Everything the scanner reads.
pub struct ScanInput<'a> {
    /// Scan-ready entries in declaration order.
    pub entries: &'a [Entry],
    /// The validated chat history, oldest first.
    pub history: &'a [Message],
    /// Card text fields for the `match_*` flags.
    pub fields: CardFields<'a>,
    /// Book-wide scan window for entries that leave theirs unset.
    pub book_scan_depth: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Initial,
    Recursion,
}

#[derive(Debug, Clone, Copy, Default)]
struct EntryFlags {
    activated: bool,
    roll_failed: bool,
}

/// Run the scan and return the activated entries in activation order (the
/// slot allocator sorts them).
pub fn scan<R: Rng>(
    input: &ScanInput<'_>,
    settings: &CardSettings,
    rng: &mut R,
) -> Vec<ActivatedEntry> {
    let entries = input.entries;
    let mut flags = vec![EntryFlags::default(); entries.len()];
    let mut buffer = HaystackBuffer::new(input, settings);
    let mut activated: Vec<ActivatedEntry> = Vec::new();

    // Entries are visited in descending insertion order (stable, so
    // declaration order breaks ties).
    let mut visit: Vec<usize> = (0..entries.len()).collect();
    visit.sort_by_key(|&i| std::cmp::Reverse(entries[i].order));

    let mut state = ScanState::Initial;
    let mut pass = 0usize;
    loop {
        pass += 1;
        debug!(pass, state = ?state, "lorebook scan pass start");
        let mut newly: Vec<usize> = Vec::new();

        for &i in &visit {
            if flags[i].activated {
                continue;
            }
            let entry = &entries[i];

            if entry.use_probability && !roll(rng, entry.probability) {
                flags[i].roll_failed = true;
                debug!(name = %entry.label, probability = entry.probability, "entry roll failed");
                continue;
            }

            if entry.constant {
                flags[i].activated = true;
                newly.push(i);
                debug!(name = %entry.label, "entry is constant");
                continue;
            }

            if entry.delay_until_recursion && state != ScanState::Recursion {
                debug!(name = %entry.label, "entry delayed until recursion");
                continue;
            }

            if entry.exclude_recursion && state == ScanState::Recursion {
                debug!(name = %entry.label, "entry excluded in recursion");
                continue;
            }

            if entry.keys.is_empty() {
                debug!(name = %entry.label, "entry has no keys to match against");
                continue;
            }

            let Some(haystack) = buffer.haystack_for(entry) else {
                debug!(name = %entry.label, "entry cannot match against empty context");
                continue;
            };

            if entry
                .keys
                .iter()
                .any(|key| key_matches(key, &haystack, entry, settings))
            {
                flags[i].activated = true;
                newly.push(i);
                debug!(name = %entry.label, "entry matched");
            }
        }

        activated.extend(newly.iter().map(|&i| to_activated(&entries[i])));

        // Only entries that neither prevent recursion nor ever failed a
        // roll feed the next pass's haystack.
        let recursive: Vec<usize> = newly
            .iter()
            .copied()
            .filter(|&i| !entries[i].prevent_recursion && !flags[i].roll_failed)
            .collect();
        let remaining = entries.len() - flags.iter().filter(|f| f.activated).count();
        debug!(pass, newly = newly.len(), remaining, "lorebook scan pass end");

        if recursive.is_empty() || remaining == 0 {
            break;
        }
        state = ScanState::Recursion;
        buffer.reset_recurse();
        for i in recursive {
            buffer.write_recurse(&entries[i].content);
        }
    }

    activated
}

fn to_activated(entry: &Entry) -> ActivatedEntry {
    ActivatedEntry {
        content: entry.content.clone(),
        role: entry.role,
        position: entry.position,
        depth: entry.depth,
        order: entry.order,
    }
}

/// Bernoulli gate: `<= 0` never passes, `>= 100` always passes, otherwise an
/// inclusive roll in `[1, 100]` passes iff it lands at or under
/// `probability`.
fn roll<R: Rng>(rng: &mut R, probability: i64) -> bool {
    if probability <= 0 {
        return false;
    }
    if probability >= 100 {
        return true;
    }
    rng.random_range(1..=100) <= probability
}

// ── Haystack construction ─────────────────────────────────────────────────

struct HaystackBuffer<'a> {
    messages: Vec<&'a str>,
    fields: CardFields<'a>,
    book_scan_depth: Option<u32>,
    default_scan_depth: Option<u32>,
    start_depth: usize,
    recurse: String,
}

impl<'a> HaystackBuffer<'a> {
    fn new(input: &ScanInput<'a>, settings: &CardSettings) -> Self {
        Self {
            messages: input.history.iter().map(|m| m.content.as_str()).collect(),
            fields: input.fields,
            book_scan_depth: input.book_scan_depth,
            default_scan_depth: settings.scan_depth,
            start_depth: 0,
            recurse: String::new(),
        }
    }

    /// Entry override → book default → settings default → whole history.
    fn resolved_scan_depth(&self, entry: &Entry) -> usize {
        entry
            .scan_depth
            .or(self.book_scan_depth)
            .or(self.default_scan_depth)
            .map(|d| d as usize)
            .unwrap_or(self.messages.len())
    }

    /// Build the haystack for one entry, or `None` when there is nothing to
    /// match against (scan window closed, or every source empty).
    fn haystack_for(&self, entry: &Entry) -> Option<String> {
        let scan_depth = self.resolved_scan_depth(entry);
        if scan_depth <= self.start_depth {
            return None;
        }

        let window = scan_depth.min(self.messages.len());
        let mut haystack = String::new();
        for content in &self.messages[self.messages.len() - window..] {
            haystack.push_str(HAYSTACK_DELIM);
            haystack.push_str(content);
        }

        let mut push_field = |enabled: bool, text: &str| {
            if enabled {
                haystack.push_str(HAYSTACK_DELIM);
                haystack.push_str(text);
            }
        };
        push_field(entry.match_persona_description, self.fields.persona);
        push_field(entry.match_character_description, self.fields.description);
        push_field(entry.match_character_personality, self.fields.personality);
        push_field(entry.match_character_depth_prompt, self.fields.depth_prompt);
        push_field(entry.match_scenario, self.fields.scenario);
        push_field(entry.match_creator_notes, self.fields.creator_notes);

        if !self.recurse.is_empty() {
            haystack.push_str(HAYSTACK_DELIM);
            haystack.push_str(&self.recurse);
        }

        if haystack.is_empty() {
            None
        } else {
            Some(haystack)
        }
    }

    fn write_recurse(&mut self, content: &str) {
        self.recurse.push_str(HAYSTACK_DELIM);
        self.recurse.push_str(content);
    }

    fn reset_recurse(&mut self) {
        self.recurse.clear();
    }
}

// ── Key matching ──────────────────────────────────────────────────────────

fn key_matches(key: &Key, haystack: &str, entry: &Entry, settings: &CardSettings) -> bool {
    match key {
        Key::Pattern(regex) => regex.is_match(haystack),
        Key::Text(needle) => {
            let case_sensitive = entry.case_sensitive.unwrap_or(settings.case_sensitive);
            let whole_words = entry.match_whole_words.unwrap_or(settings.match_whole_words);

            let (haystack, needle) = if case_sensitive {
                (haystack.to_string(), needle.clone())
            } else {
                (haystack.to_lowercase(), needle.to_lowercase())
            };

            if whole_words {
                contains_whole_word(&haystack, &needle)
            } else {
                haystack.contains(needle.as_str())
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Substring search requiring the needle to be bordered by non-word
/// characters or string ends.
fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(found) = haystack[from..].find(needle) {
        let begin = from + found;
        let end = begin + needle.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .is_none_or(|c| !is_word_char(c));
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_word_char(c));
        if before_ok && after_ok {
            return true;
        }
        // Advance one character so overlapping occurrences are still seen.
        from = begin
            + haystack[begin..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}
