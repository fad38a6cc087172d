//! Shared terminal helpers for the `php-preprocessor` binary:
//! logging setup, styled status lines and run summaries.

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

use crate::rules::RuleStats;

/// Initializes logging. `RUST_LOG` directives are honoured; `verbose` adds
/// DEBUG and `quiet` limits output to warnings and errors.
pub fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        tracing::Level::WARN
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Prints the tool banner
pub fn print_header(name: &str, version: &str, description: &str) {
    println!("{} {}", name.bold().blue(), version.dimmed());
    println!("{}\n", description.dimmed());
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message.green());
}

pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message.yellow());
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.red());
}

/// One line per rule: applications, rewrites and time spent
pub fn print_rule_stats(stats: &BTreeMap<String, RuleStats>) {
    if stats.is_empty() {
        return;
    }
    println!("\n{}", "Rewrite summary".bold());
    for (rule, stat) in stats {
        println!(
            "   {:<26} {:>5} rewrites  {}",
            rule.cyan(),
            stat.rewrites,
            format_duration(std::time::Duration::from_micros(stat.total_execution_time_us)).dimmed()
        );
    }
}

/// Formats a duration for humans
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{:03}s", secs, millis)
    } else {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(1)), "1.000s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    }
}
