use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Parser};

use licenspect_core::config::Config;
use licenspect_core::report::render_report;
use licenspect_core::scan::ScancodeScanner;
use licenspect_core::types::Selection;
use licenspect_core::{run, RunOptions, Source};

#[derive(Parser, Debug)]
#[command(
    name = "licenspect",
    version,
    about = "License compliance inspection for package artifacts"
)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["package", "archive", "url", "file", "directory", "lockfile"])
))]
struct Cli {
    /// Package spec to download from the index, NAME==VERSION
    #[arg(long, value_name = "NAME==VERSION")]
    package: Option<String>,

    /// Local package archive to unpack and analyze
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Direct archive URL to download and analyze
    #[arg(long)]
    url: Option<String>,

    /// Single file to analyze in place
    #[arg(long)]
    file: Option<PathBuf>,

    /// Directory tree to analyze in place
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Cargo lockfile whose registry dependencies are downloaded
    #[arg(long)]
    lockfile: Option<PathBuf>,

    /// Package index base URL
    #[arg(long)]
    index_url: Option<String>,

    /// Prefer the source distribution over a wheel
    #[arg(long)]
    prefer_sdist: bool,

    /// Where lockfile downloads are stored
    #[arg(long)]
    target_directory: Option<PathBuf>,

    /// Only download lockfile dependencies, skip analysis and report
    #[arg(long)]
    download_only: bool,

    /// Also retrieve copyright statements
    #[arg(long)]
    copyrights: bool,

    /// Also retrieve e-mail addresses
    #[arg(long)]
    emails: bool,

    /// Also retrieve URLs
    #[arg(long)]
    urls: bool,

    /// Also retrieve file size, date and hash
    #[arg(long)]
    file_info: bool,

    /// Do not retrieve license detections
    #[arg(long)]
    skip_licenses: bool,

    /// Report width; defaults to COLUMNS or 80
    #[arg(long)]
    output_width: Option<usize>,

    /// Log level: a name (error, warning, info, ...) or a raw number
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<u8>,

    /// Configuration file; licenspect.toml is discovered otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// ScanCode binary used as the scanning oracle
    #[arg(long)]
    scancode: Option<PathBuf>,
}

const LOG_LEVELS: &[(&str, u8)] = &[
    ("CRITICAL", 50),
    ("FATAL", 50),
    ("ERROR", 40),
    ("WARNING", 30),
    ("WARN", 30),
    ("INFO", 20),
    ("DEBUG", 10),
    ("NOTSET", 0),
];

/// Accepts the conventional level names case-insensitively, or any raw
/// numeric level as-is.
fn parse_log_level(value: &str) -> Result<u8, String> {
    if let Ok(level) = value.parse::<u8>() {
        return Ok(level);
    }
    let name = value.to_ascii_uppercase();
    LOG_LEVELS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, level)| *level)
        .ok_or_else(|| format!("no log level named {name}"))
}

fn level_filter(level: u8) -> log::LevelFilter {
    match level {
        40.. => log::LevelFilter::Error,
        30..=39 => log::LevelFilter::Warn,
        20..=29 => log::LevelFilter::Info,
        10..=19 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

struct Style {
    bold: &'static str,
    red: &'static str,
    yellow: &'static str,
    reset: &'static str,
}

const COLOR: Style = Style {
    bold: "\x1b[1m",
    red: "\x1b[31m",
    yellow: "\x1b[33m",
    reset: "\x1b[0m",
};

const PLAIN: Style = Style {
    bold: "",
    red: "",
    yellow: "",
    reset: "",
};

fn style() -> &'static Style {
    if std::env::var_os("NO_COLOR").is_some() {
        &PLAIN
    } else {
        &COLOR
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    let level = resolve_log_level(cli.log_level, &config);
    env_logger::Builder::new()
        .filter_level(level_filter(level))
        .init();

    match run_cli(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let s = style();
            eprintln!(
                "{}{red}error:{reset} {:#}",
                s.bold,
                e,
                red = s.red,
                reset = s.reset
            );
            ExitCode::from(1)
        }
    }
}

fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(p) => Config::load(p).unwrap_or_else(|e| {
            eprintln!(
                "{}{}warning:{} failed to load config {}: {}",
                style().bold,
                style().yellow,
                style().reset,
                p.display(),
                e
            );
            Config::default()
        }),
        None => Config::discover().unwrap_or_default(),
    }
}

fn resolve_log_level(cli_level: Option<u8>, config: &Config) -> u8 {
    if let Some(level) = cli_level {
        return level;
    }
    if let Some(name) = config.log_level.as_deref() {
        match parse_log_level(name) {
            Ok(level) => return level,
            Err(e) => eprintln!(
                "{}{}warning:{} ignoring configured log level: {}",
                style().bold,
                style().yellow,
                style().reset,
                e
            ),
        }
    }
    30
}

fn columns_from_env() -> Option<usize> {
    std::env::var("COLUMNS").ok()?.parse().ok()
}

fn source_of(cli: &Cli) -> anyhow::Result<Source> {
    Ok(if let Some(spec) = &cli.package {
        Source::Package(spec.clone())
    } else if let Some(path) = &cli.archive {
        Source::Archive(path.clone())
    } else if let Some(url) = &cli.url {
        Source::Url(url.clone())
    } else if let Some(path) = &cli.file {
        Source::File(path.clone())
    } else if let Some(path) = &cli.directory {
        Source::Directory(path.clone())
    } else if let Some(path) = &cli.lockfile {
        Source::Lockfile(path.clone())
    } else {
        anyhow::bail!("exactly one source is required")
    })
}

fn run_cli(cli: Cli, config: Config) -> anyhow::Result<()> {
    let source = source_of(&cli)?;

    let selection = Selection {
        licenses: !cli.skip_licenses,
        copyrights: cli.copyrights,
        emails: cli.emails,
        urls: cli.urls,
        file_info: cli.file_info,
    };
    let options = RunOptions {
        selection,
        index_url: cli.index_url.or(config.index_url),
        prefer_sdist: cli.prefer_sdist,
        target_directory: cli.target_directory,
        download_only: cli.download_only,
    };

    let scanner_program = cli
        .scancode
        .or(config.scancode)
        .unwrap_or_else(|| PathBuf::from("scancode"));
    let scanner = ScancodeScanner::new(scanner_program);

    let results = run(&scanner, &source, &options)?;

    if cli.download_only {
        return Ok(());
    }

    let width = cli
        .output_width
        .or(config.output_width)
        .or_else(columns_from_env)
        .unwrap_or(80);
    print!("{}", render_report(&results, width));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn log_level_names_are_case_insensitive() {
        assert_eq!(parse_log_level("error"), Ok(40));
        assert_eq!(parse_log_level("ERROR"), Ok(40));
        assert_eq!(parse_log_level("Warning"), Ok(30));
        assert_eq!(parse_log_level("info"), Ok(20));
    }

    #[test]
    fn log_level_numbers_pass_through() {
        assert_eq!(parse_log_level("40"), Ok(40));
        assert_eq!(parse_log_level("42"), Ok(42));
        assert_eq!(parse_log_level("0"), Ok(0));
    }

    #[test]
    fn unknown_log_level_names_are_rejected() {
        let err = parse_log_level("abc").unwrap_err();
        assert_eq!(err, "no log level named ABC");
    }

    #[test]
    fn levels_map_onto_filters() {
        assert_eq!(level_filter(50), log::LevelFilter::Error);
        assert_eq!(level_filter(40), log::LevelFilter::Error);
        assert_eq!(level_filter(30), log::LevelFilter::Warn);
        assert_eq!(level_filter(20), log::LevelFilter::Info);
        assert_eq!(level_filter(10), log::LevelFilter::Debug);
        assert_eq!(level_filter(0), log::LevelFilter::Trace);
    }

    #[test]
    fn configured_log_level_is_used_when_cli_is_silent() {
        let config = Config {
            log_level: Some("error".to_string()),
            ..Config::default()
        };
        assert_eq!(resolve_log_level(None, &config), 40);
        assert_eq!(resolve_log_level(Some(10), &config), 10);
        assert_eq!(resolve_log_level(None, &Config::default()), 30);
    }

    #[test]
    #[serial]
    fn style_respects_no_color() {
        std::env::set_var("NO_COLOR", "1");
        assert_eq!(style().bold, "");
        std::env::remove_var("NO_COLOR");
        assert_ne!(style().bold, "");
    }

    #[test]
    #[serial]
    fn columns_come_from_the_environment() {
        std::env::set_var("COLUMNS", "100");
        assert_eq!(columns_from_env(), Some(100));
        std::env::set_var("COLUMNS", "wide");
        assert_eq!(columns_from_env(), None);
        std::env::remove_var("COLUMNS");
        assert_eq!(columns_from_env(), None);
    }
}
