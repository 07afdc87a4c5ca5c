//! Configuration command
//!
//! Prints the configuration the relay would run with after every source
//! has been applied.

use anyhow::Result;
use debounce::config::MAX_DELAY_MS;
use owo_colors::OwoColorize;
use relay::RelayConfig;
use std::path::Path;

pub async fn run(path: Option<&Path>, raw: bool) -> Result<()> {
    let config = RelayConfig::load(path)?;

    if raw {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let source = match path {
        Some(path) => path.display().to_string(),
        None if Path::new(relay::config::DEFAULT_CONFIG_FILE).exists() => {
            relay::config::DEFAULT_CONFIG_FILE.to_string()
        }
        None => "defaults".to_string(),
    };

    println!("{}", "Relay Configuration".bold());
    println!("{}: {}\n", "Source".dimmed(), source.dimmed());

    println!("{}", "[debounce]".yellow());
    println!(
        "  {} = {} {}",
        "delay_ms".cyan(),
        config.debounce.delay_ms,
        format!("({:.1}s)", config.debounce.delay().as_secs_f64()).dimmed()
    );
    println!(
        "  {} = {:?}",
        "separator".cyan(),
        config.debounce.separator
    );

    println!("\n{}", "[agent]".yellow());
    println!("  {} = {}", "agent_name".cyan(), config.agent.agent_name);
    println!("  {} = {}", "company".cyan(), config.agent.company);
    println!("  {} = {}", "personality".cyan(), config.agent.personality);
    println!(
        "  {} = {}",
        "personality_override".cyan(),
        match &config.agent.personality_override {
            Some(value) => value.clone(),
            None => "(none)".dimmed().to_string(),
        }
    );
    println!(
        "  {} = {:?}",
        "conversation_examples".cyan(),
        config.agent.conversation_examples
    );

    let bant = &config.agent.bant_questions;
    println!("\n{}", "[agent.bant_questions]".yellow());
    println!("  {} = {}", "need".cyan(), bant.need);
    println!("  {} = {}", "timeline".cyan(), bant.timeline);
    println!("  {} = {}", "budget".cyan(), bant.budget);
    println!("  {} = {}", "authority".cyan(), bant.authority);

    println!("\n{}", "Valid Ranges:".bold());
    println!("  delay_ms: 1-{}", MAX_DELAY_MS);
    println!("  agent_name: non-empty");

    println!("\n{}", "Environment overrides:".bold());
    for key in [
        "DEBOUNCE_DELAY_MS",
        "DEBOUNCE_SEPARATOR",
        "AGENT_NAME",
        "COMPANY",
        "PERSONALITY",
        "PERSONALITY_OVERRIDE",
        "CONVERSATION_EXAMPLES",
        "BANT_NEED",
        "BANT_TIMELINE",
        "BANT_BUDGET",
        "BANT_AUTHORITY",
    ] {
        println!("  {}{}", relay::config::ENV_PREFIX, key);
    }

    Ok(())
}
