/*!
# PHP Preprocessor CLI

Command-line interface for the PHP source preprocessor.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;

use php_preprocessor::cli_common::{
    format_duration, init_logging, print_error, print_header, print_rule_stats, print_success, print_warning,
};
use php_preprocessor::config::{AnalysisConfig, InputConfig, OutputConfig};
use php_preprocessor::core::discover_sources;
use php_preprocessor::rules::parse_target;
use php_preprocessor::{check_round_trip, run_pipeline, ContextMode, ExportReport, PreprocessorConfig, RewriteStep};

#[derive(Parser)]
#[command(
    name = "php-preprocessor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Scope-aware, format-preserving source-to-source rewriter for PHP code"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline described by a TOML configuration file
    Run {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Write per-rule statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Rewrite files with an ad-hoc pipeline.
    ///
    /// Steps run in this order: comment-out, inline-call, inline-accessors,
    /// strip-types, narrow-isset, qualify-calls.
    Rewrite {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output directory (created if missing)
        #[arg(short, long)]
        output: PathBuf,

        /// Replace existing files in the output directory
        #[arg(long)]
        overwrite: bool,

        /// Resolve semantic contexts on demand instead of up front
        #[arg(long)]
        lazy: bool,

        /// Declaration-only files for the class universe
        #[arg(long)]
        stub: Vec<PathBuf>,

        /// Comment out calls to Class::method
        #[arg(long, value_name = "CLASS::METHOD")]
        comment_out: Vec<String>,

        /// Inline calls to Class::method
        #[arg(long, value_name = "CLASS::METHOD")]
        inline_call: Vec<String>,

        /// Replace trivial getter calls with property access
        #[arg(long)]
        inline_accessors: bool,

        /// Parameter types to strip, comma separated
        #[arg(long, value_delimiter = ',', value_name = "TYPES")]
        strip_types: Vec<String>,

        /// Turn isset($array[$key]) into array_key_exists where types allow
        #[arg(long)]
        narrow_isset: bool,

        /// Fully qualify function calls
        #[arg(long)]
        qualify_calls: bool,

        /// Write per-rule statistics as JSON
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Verify that every file prints back byte for byte
    Check {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Run { config, stats } => {
            let config = PreprocessorConfig::load_from_file(&config)
                .with_context(|| format!("Failed to load configuration from {}", config.display()))?;
            run_command(config, stats)
        }
        Commands::Rewrite {
            paths,
            output,
            overwrite,
            lazy,
            stub,
            comment_out,
            inline_call,
            inline_accessors,
            strip_types,
            narrow_isset,
            qualify_calls,
            stats,
        } => {
            let mut steps = Vec::new();
            for target in &comment_out {
                let (class, method) = parse_target(target)?;
                steps.push(RewriteStep::CommentOut { class, method });
            }
            for target in &inline_call {
                let (class, method) = parse_target(target)?;
                steps.push(RewriteStep::InlineMethodCall { class, method });
            }
            if inline_accessors {
                steps.push(RewriteStep::InlineTrivialAccessors);
            }
            if !strip_types.is_empty() {
                steps.push(RewriteStep::StripParameterTypes { types: strip_types });
            }
            if narrow_isset {
                steps.push(RewriteStep::NarrowArrayIsset);
            }
            if qualify_calls {
                steps.push(RewriteStep::QualifyFunctionCalls);
            }

            let config = PreprocessorConfig {
                input: InputConfig {
                    paths,
                    stubs: stub,
                    ..InputConfig::default()
                },
                analysis: AnalysisConfig {
                    mode: if lazy { ContextMode::Lazy } else { ContextMode::Eager },
                },
                output: OutputConfig {
                    directory: output,
                    overwrite,
                    ..OutputConfig::default()
                },
                steps,
            };
            run_command(config, stats)
        }
        Commands::Check { paths } => check_command(&paths),
    }
}

fn run_command(config: PreprocessorConfig, stats: Option<PathBuf>) -> Result<()> {
    print_header(
        "php-preprocessor",
        env!("CARGO_PKG_VERSION"),
        "Scope-aware, format-preserving PHP rewriter",
    );
    config.validate()?;
    if config.steps.is_empty() {
        print_warning("No rewrite steps given, files are exported unchanged");
    }

    let output = &config.output.directory;
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let start = Instant::now();
    let (preprocessor, report) = run_pipeline(&config)?;
    print_rule_stats(preprocessor.stats());

    if let Some(path) = stats {
        preprocessor
            .export_stats(&path)
            .with_context(|| format!("Failed to write statistics to {}", path.display()))?;
    }

    print_export_report(&report);
    print_success(&format!(
        "Processed {} files in {}",
        preprocessor.units().len(),
        format_duration(start.elapsed())
    ));
    Ok(())
}

fn print_export_report(report: &ExportReport) {
    println!(
        "\n{} {} written, {} skipped",
        "Export:".bold(),
        report.written.len().to_string().green(),
        report.conflicts.len().to_string().yellow()
    );
    for conflict in &report.conflicts {
        print_warning(&conflict.to_string());
    }
}

fn check_command(paths: &[PathBuf]) -> Result<()> {
    let extensions = vec!["php".to_string()];
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_sources(path, &extensions, true)?);
        } else {
            files.push(path.clone());
        }
    }

    let mut failures = 0;
    for file in &files {
        match check_round_trip(file) {
            Ok(true) => println!("   {} {}", "ok".green(), file.display()),
            Ok(false) => {
                failures += 1;
                println!("   {} {}", "mismatch".red().bold(), file.display());
            }
            Err(e) => {
                failures += 1;
                print_error(&format!("{}: {}", file.display(), e));
            }
        }
    }

    if failures > 0 {
        print_error(&format!("{} of {} files failed the round trip", failures, files.len()));
        std::process::exit(1);
    }
    print_success(&format!("{} files round-trip unchanged", files.len()));
    Ok(())
}
