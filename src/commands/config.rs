use anyhow::Result;
use colored::Colorize;
use sherlock::config::{self, Config};

/// Execute the config show command
///
/// Displays the current configuration with secrets masked
pub fn show() -> Result<()> {
    println!("{}", "Loading configuration...".yellow());

    let cfg = config::load_config()?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    // Serialize to TOML format
    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate() -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config()?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Name: {} (routes under /{})", cfg.app.name, cfg.app.name);
    println!("  Namespace: {}", cfg.tailer.namespace);
    println!("  Store Capacity: {}", cfg.store.capacity);
    println!(
        "  Lagger Threshold: {}s",
        cfg.query.lagger_threshold_seconds
    );
    if cfg.publish.enabled() {
        println!(
            "  Publishing: every {}s to {}",
            cfg.publish.interval_seconds, cfg.publish.url
        );
    } else {
        println!("  Publishing: {}", "disabled".dimmed());
    }

    Ok(())
}

/// Sanitize secrets in configuration for safe display
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.publish.key = mask_key(&sanitized.publish.key);
    sanitized
}

/// Mask a key for safe display
///
/// Shows first 4 and last 4 characters
/// Example: "0123456789abcdef" -> "0123...cdef"
fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        // Too short to mask meaningfully
        return "***".to_string();
    }

    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();

    format!("{}...{}", prefix, suffix)
}
