
use console::style;

use super::Config;

/// Print the effective configuration to stderr, with secrets masked
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embedding.provider).cyan());
    eprintln!("  Endpoint: {}", style(or_unset(&config.embedding.endpoint)).cyan());
    eprintln!("  API Key: {}", style(mask_secret(&config.embedding.api_key)).cyan());
    eprintln!("  API Version: {}", style(&config.embedding.api_version).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!(
        "  Retries: {} (base delay {}ms, batch delay {}ms)",
        style(config.embedding.max_retries).cyan(),
        config.embedding.base_delay_ms,
        config.embedding.batch_delay_ms
    );

    eprintln!();
    eprintln!("{}", style("Qdrant Settings:").bold().yellow());
    match config.qdrant_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  API Key: {}",
        style(mask_secret(config.qdrant.api_key.as_deref().unwrap_or_default())).cyan()
    );
    eprintln!("  Collection: {}", style(&config.qdrant.collection).cyan());

    eprintln!();
    eprintln!("{}", style("Chunking Settings:").bold().yellow());
    eprintln!("  Target Size: {}", style(config.chunking.target_size).cyan());
    eprintln!("  Overlap: {}", style(config.chunking.overlap).cyan());
    eprintln!("  Min Size: {}", style(config.chunking.min_size).cyan());

    eprintln!();
    eprintln!("{}", style("Pipeline Settings:").bold().yellow());
    eprintln!(
        "  Source Directory: {}",
        style(config.pipeline.source_dir.display()).cyan()
    );
    eprintln!("  Version: {}", style(&config.pipeline.version).cyan());
    eprintln!(
        "  State File: {}",
        style(config.pipeline.state_file.display()).cyan()
    );
    eprintln!(
        "  Error File: {}",
        style(config.pipeline.error_file.display()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_path.display()).dim()
    );
}

/// Hide all but the last four characters of a secret
#[inline]
pub fn mask_secret(secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return "(not set)".to_string();
    }

    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

fn or_unset(value: &str) -> &str {
    if value.trim().is_empty() {
        "(not set)"
    } else {
        value
    }
}
