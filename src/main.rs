//! Stealth Harness - Main Entry Point
//!
//! Handles CLI argument parsing, configuration loading, and running the
//! detection-verification harness. The binary ships with a simulated
//! browsing-context provider; embedding a real browser engine happens
//! through the library's [`stealth_harness::context::ContextProvider`]
//! boundary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stealth_harness::{
    config::{CliArgs, HarnessSettings},
    context::MockContextProvider,
    harness::{Harness, IsolationMode},
    patch::PatchEngine,
    registry::{DetectionRegistry, DetectionTestEntry},
    report::FsArtifactSink,
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
}

/// Print the startup banner with version
fn print_banner() {
    println!(
        r#"
{cyan}{bold}  ____  _             _ _   _
 / ___|| |_ ___  __ _| | |_| |__
 \___ \| __/ _ \/ _` | | __| '_ \
  ___) | ||  __/ (_| | | |_| | | |
 |____/ \__\___|\__,_|_|\__|_| |_|  harness
{reset}
{dim}  Browser Identity Stealth Verification{reset}
{dim}  Version: {version}{reset}
"#,
        cyan = colors::CYAN,
        bold = colors::BOLD,
        reset = colors::RESET,
        dim = colors::DIM,
        version = VERSION
    );
}

/// Print configuration summary
fn print_config_summary(settings: &HarnessSettings) {
    println!(
        "{bold}{blue}Configuration:{reset}",
        bold = colors::BOLD,
        blue = colors::BLUE,
        reset = colors::RESET
    );
    println!(
        "  {dim}Profile:{reset}        {}",
        settings
            .profile_seed
            .as_deref()
            .map(|seed| format!("seeded ({seed})"))
            .unwrap_or_else(|| settings.profile_preset.clone()),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Isolation:{reset}      {}",
        match settings.isolation {
            IsolationMode::SharedContext => "shared-context",
            IsolationMode::PerEntryContext => "per-entry-context",
        },
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Timeout:{reset}        {}ms",
        settings.default_timeout_ms,
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Screenshots:{reset}    {}",
        if settings.capture_screenshots {
            format!(
                "{green}{}{reset}",
                settings.screenshot_dir.display(),
                green = colors::GREEN,
                reset = colors::RESET
            )
        } else {
            format!(
                "{yellow}disabled{reset}",
                yellow = colors::YELLOW,
                reset = colors::RESET
            )
        },
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Targets:{reset}        {}",
        if settings.targets.is_empty() {
            "all registered".to_string()
        } else {
            settings.targets.join(", ")
        },
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!();
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .about("Browser identity stealth layer with a detection-verification harness")
        .long_about(
            "Stealth Harness patches a synthetic browser identity into browsing\n\
             contexts and verifies it against public bot-detection pages:\n\
             - Consistent identity profiles (presets or seeded)\n\
             - Phased runtime overrides with lock-in\n\
             - BotD, Sannysoft, Are-You-Headless, FingerprintJS targets\n\
             - JSON run reports and optional screenshots",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .value_name("PRESET")
                .help("Identity preset: windows-chrome, mac-chrome, linux-chrome, random"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("STRING")
                .help("Deterministic identity seed (overrides --profile)"),
        )
        .arg(
            Arg::new("isolation")
                .short('i')
                .long("isolation")
                .value_name("MODE")
                .help("Context isolation: shared-context or per-entry-context")
                .value_parser(["shared-context", "per-entry-context"]),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Default per-entry timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("targets")
                .short('t')
                .long("targets")
                .value_name("NAMES")
                .help("Comma-separated target names to run (default: all)"),
        )
        .arg(
            Arg::new("screenshots")
                .long("screenshots")
                .value_name("DIR")
                .help("Capture a screenshot per entry into this directory")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("list-targets")
                .long("list-targets")
                .help("List registered detection targets and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("show-profile")
                .long("show-profile")
                .help("Print the resolved identity profile as JSON and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("emit-script")
                .long("emit-script")
                .help("Print the combined override script and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &clap::ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.profile_preset = matches.get_one::<String>("profile").cloned();
    args.profile_seed = matches.get_one::<String>("seed").cloned();
    args.timeout_ms = matches.get_one::<u64>("timeout").copied();

    if let Some(mode) = matches.get_one::<String>("isolation") {
        args.isolation = mode.parse().ok();
    }

    if let Some(targets) = matches.get_one::<String>("targets") {
        args.targets = targets
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    if let Some(dir) = matches.get_one::<PathBuf>("screenshots") {
        args.capture_screenshots = Some(true);
        args.screenshot_dir = Some(dir.clone());
    }

    args
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Resolve the entries to run from settings and the registry. The
/// configured default timeout replaces each entry's own budget for this
/// run.
fn select_entries(
    registry: &DetectionRegistry,
    settings: &HarnessSettings,
) -> Result<Vec<DetectionTestEntry>> {
    let budget = Duration::from_millis(settings.default_timeout_ms);
    if settings.targets.is_empty() {
        return Ok(registry
            .entries()
            .iter()
            .map(|entry| entry.clone().with_timeout(budget))
            .collect());
    }
    let mut selected = Vec::with_capacity(settings.targets.len());
    for name in &settings.targets {
        let entry = registry
            .lookup(name)
            .with_context(|| format!("unknown detection target: {name}"))?;
        selected.push(entry.clone().with_timeout(budget));
    }
    Ok(selected)
}

fn print_target_list(registry: &DetectionRegistry) {
    println!(
        "{bold}Registered detection targets:{reset}",
        bold = colors::BOLD,
        reset = colors::RESET
    );
    for entry in registry.entries() {
        println!(
            "  {cyan}{name:<14}{reset} {desc}\n  {dim}{url}{reset}",
            name = entry.name(),
            desc = entry.description(),
            url = entry.url(),
            cyan = colors::CYAN,
            dim = colors::DIM,
            reset = colors::RESET
        );
    }
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    init_tracing(verbosity, quiet);

    let cli_args = parse_cli_args(&matches);
    let settings = cli_args
        .load_settings()
        .context("Failed to load configuration")?;

    let registry = DetectionRegistry::with_builtin_targets();

    if matches.get_flag("list-targets") {
        print_target_list(&registry);
        return Ok(());
    }

    let profile = settings
        .profile()
        .context("Failed to build identity profile")?;

    if matches.get_flag("show-profile") {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    if matches.get_flag("emit-script") {
        let engine = PatchEngine::new(profile);
        println!("{}", engine.full_script());
        return Ok(());
    }

    if !quiet {
        print_banner();
        print_config_summary(&settings);
    }

    let entries = select_entries(&registry, &settings)?;
    if entries.is_empty() {
        bail!("no detection targets selected");
    }

    // The binary has no embedded browser engine; runs use the simulated
    // provider. Library consumers plug a real ContextProvider into Harness.
    info!("Using simulated browsing-context provider");
    let provider = Arc::new(MockContextProvider::default());
    let mut harness = Harness::new(provider, profile);
    if settings.capture_screenshots {
        harness = harness
            .with_artifact_sink(Arc::new(FsArtifactSink::new(&settings.screenshot_dir)));
    }

    info!(
        targets = entries.len(),
        "Running detection verification"
    );
    let report = harness.run(&entries, settings.isolation).await?;

    if !quiet {
        for result in &report.results {
            let (color, label) = match result.outcome {
                stealth_harness::report::Outcome::Passed => (colors::GREEN, "passed"),
                stealth_harness::report::Outcome::Failed => (colors::RED, "failed"),
                stealth_harness::report::Outcome::Errored => (colors::YELLOW, "errored"),
            };
            println!(
                "  {color}{label:<8}{reset} {name} ({elapsed}ms)",
                name = result.page_name,
                elapsed = result.elapsed_ms,
                color = color,
                reset = colors::RESET
            );
            for reason in &result.reasons {
                println!(
                    "           {dim}{reason}{reset}",
                    dim = colors::DIM,
                    reset = colors::RESET
                );
            }
        }
        println!();
        println!(
            "{bold}Pass rate:{reset} {:.1}% ({}/{} passed, {} failed, {} errored)",
            report.pass_rate() * 100.0,
            report.passed,
            report.total,
            report.failed,
            report.errored,
            bold = colors::BOLD,
            reset = colors::RESET
        );
    }

    println!("{}", report.to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cmd = build_cli();

        let matches = cmd
            .clone()
            .try_get_matches_from(["stealth-harness", "--profile", "mac-chrome", "--list-targets"])
            .unwrap();

        assert!(matches.get_flag("list-targets"));
        assert_eq!(
            matches.get_one::<String>("profile"),
            Some(&"mac-chrome".to_string())
        );
    }

    #[test]
    fn test_cli_isolation_values() {
        let cmd = build_cli();

        let matches = cmd
            .clone()
            .try_get_matches_from(["stealth-harness", "--isolation", "per-entry-context"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("isolation"),
            Some(&"per-entry-context".to_string())
        );

        let result = cmd
            .clone()
            .try_get_matches_from(["stealth-harness", "--isolation", "chaotic"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_conflicts() {
        let cmd = build_cli();

        // verbose and quiet should conflict
        let result = cmd
            .clone()
            .try_get_matches_from(["stealth-harness", "-v", "--quiet"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_cli_args() {
        let cmd = build_cli();
        let matches = cmd
            .try_get_matches_from([
                "stealth-harness",
                "--seed",
                "session-9",
                "--timeout",
                "15000",
                "--targets",
                "botd, sannysoft",
            ])
            .unwrap();

        let args = parse_cli_args(&matches);

        assert_eq!(args.profile_seed, Some("session-9".to_string()));
        assert_eq!(args.timeout_ms, Some(15000));
        assert_eq!(args.targets, vec!["botd".to_string(), "sannysoft".to_string()]);
    }

    #[test]
    fn test_select_entries_by_name() {
        let registry = DetectionRegistry::with_builtin_targets();
        let settings = HarnessSettings::default()
            .with_targets(vec!["fingerprintjs".to_string(), "botd".to_string()]);

        let entries = select_entries(&registry, &settings).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["fingerprintjs", "botd"]);

        let missing = HarnessSettings::default().with_targets(vec!["nope".to_string()]);
        assert!(select_entries(&registry, &missing).is_err());
    }

    #[test]
    fn test_configured_timeout_applies_to_entries() {
        let registry = DetectionRegistry::with_builtin_targets();
        let settings = HarnessSettings::default().with_timeout(15000);

        let entries = select_entries(&registry, &settings).unwrap();
        assert!(!entries.is_empty());
        assert!(entries
            .iter()
            .all(|e| e.timeout() == Duration::from_millis(15000)));
    }
}
