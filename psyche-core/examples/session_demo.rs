//! Play out a short, grim session for one investigator.
//!
//! Run with: `cargo run -p psyche-core --example session_demo`
//! Set `RUST_LOG=psyche_core=info` for a quieter log.

use psyche_core::{
    CharacterId, CorruptionSource, EngineConfig, PanicTable, PsycheEngine, RestType, RngDice,
    SqliteStore, StatusEffectService, StressSource, TraumaCatalog, TraumaCheckContext,
    TraumaCheckTrigger,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Prints status effects instead of driving a combat system.
struct ConsoleEffects;

impl StatusEffectService for ConsoleEffects {
    fn apply_effect(&mut self, character_id: CharacterId, effect_id: &str, duration_turns: u32) {
        println!("  -> {character_id} is {effect_id} for {duration_turns} turn(s)");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("psyche_core=debug")),
        )
        .init();

    let content = Path::new(env!("CARGO_MANIFEST_DIR")).join("content");
    let config = EngineConfig::new()
        .with_panic_table(PanicTable::load_json(content.join("panic_table.json"))?)
        .with_trauma_catalog(TraumaCatalog::load_json(content.join("trauma_catalog.json"))?);

    let mut engine = PsycheEngine::new(
        SqliteStore::open_in_memory()?,
        RngDice::from_entropy(),
        ConsoleEffects,
        config,
    );
    let investigator = CharacterId::new();
    engine.create_character(investigator)?;

    println!("=== Descent into the Archive ===\n");

    let beats = [
        (25, StressSource::Exploration, "The stacks go down further than the building allows."),
        (20, StressSource::Forbidden, "A marginal note describes your own death."),
        (18, StressSource::Combat, "Something without a face climbs the shelves toward you."),
    ];
    for (amount, source, beat) in beats {
        println!("{beat}");
        let outcome = engine.apply_stress(investigator, amount, source, None)?;
        println!(
            "  stress {} -> {} ({})",
            outcome.delta.previous, outcome.delta.new, outcome.transition.new_stage
        );
        if outcome.requires_panic_check {
            let panic = engine.roll_panic_table(investigator)?;
            println!("  PANIC [{}] {}: {}", panic.die_roll, panic.effect_name, panic.description);
            engine.apply_panic_effect(investigator, &panic);
        }
    }

    println!("\nYou read the final page aloud.");
    let corruption = engine.add_corruption(investigator, 30, CorruptionSource::ForbiddenMagic)?;
    println!(
        "  corruption {} -> {}, penalties {:?}",
        corruption.delta.previous, corruption.delta.new, corruption.penalties
    );

    let context = TraumaCheckContext::new(4)
        .with_modifier("Steady companion", 1)
        .with_trauma_on_failure("reality-doubt");
    let check = engine.perform_trauma_check(
        investigator,
        TraumaCheckTrigger::ForbiddenKnowledge,
        &context,
    )?;
    println!("  {}", check.check);
    if let Some(acquired) = &check.acquisition {
        println!("  {}", acquired.message);
    }

    println!("\nYou stumble out into daylight and find somewhere to sleep.");
    let rest = engine.recover_stress(investigator, RestType::Long, 3)?;
    println!("  stress {} -> {}", rest.delta.previous, rest.delta.new);

    let protocol = engine.get_recovery_protocol(investigator)?;
    println!("  {} ({:?}): {}", protocol.protocol_name, protocol.urgency, protocol.guidance);

    let retirement = engine.check_retirement(investigator)?;
    println!(
        "\nRetirement: must retire = {}, may retire = {}",
        retirement.must_retire, retirement.can_continue_with_permission
    );

    println!("\n=== History ===");
    for entry in engine.stress_history(investigator)? {
        println!(
            "  {:<20} {:>4} -> {:>3}",
            entry.source.to_string(),
            entry.final_amount,
            entry.new_value
        );
    }

    Ok(())
}
