//! `loregate check` — validate a card file and print a summary.

use std::path::Path;

use loregate_card::Card;

pub fn run(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    let card = Card::parse(&bytes)?;

    println!("✓ {} is a valid chara_card_v3 card", file.display());
    println!("  name:       {}", card.name());
    if let Some(greeting) = card.greeting() {
        println!("  greeting:   {}", first_line(greeting));
    }
    if !card.alternate_greetings().is_empty() {
        println!(
            "  greetings:  {} alternate(s)",
            card.alternate_greetings().len()
        );
    }
    let entries = card
        .data()
        .character_book
        .as_ref()
        .map_or(0, |book| book.entries.len());
    println!("  lorebook:   {entries} entries");
    if card.data().extensions.depth_prompt.is_some() {
        println!("  depth prompt: present");
    }

    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
