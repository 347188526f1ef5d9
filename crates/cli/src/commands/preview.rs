//! `loregate preview` — run the full pipeline over a one-message history
//! and print the composed prompt.

use std::path::Path;

use loregate_card::Card;
use loregate_core::{CardSettings, Message};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn run(file: &Path, message: &str, seed: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(file)?;
    let card = Card::parse(&bytes)?;

    let history = [Message::user(message)];
    let settings = CardSettings::default();
    let messages = match seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            card.apply_with_rng(&history, &settings, &mut rng)?
        }
        None => card.apply(&history, &settings)?,
    };

    for msg in &messages {
        println!("[{}] {}", msg.role, msg.content);
    }
    eprintln!("-- {} messages", messages.len());

    Ok(())
}
