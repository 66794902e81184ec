#![forbid(unsafe_code)]

//! Command-line argument parsing for the demo.
//!
//! Parses args manually to keep the binary lean. Supports environment
//! variable overrides via the `FIELDWATCH_DEMO_*` prefix.

use std::env;
use std::process;

use crate::form::DEFAULT_MIN_LENGTH;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HELP_TEXT: &str = "\
fieldwatch-demo: live username validation

Reads the username field's contents one line per text change from stdin
(or from --input) and prints the form whenever it changes.

USAGE:
    fieldwatch-demo [OPTIONS]

OPTIONS:
    --input=A,B,C          Scripted text changes instead of stdin
    --step-ms=N            Pause between scripted changes (default: 0)
    --min-length=N         Shortest input that is validated (default: 4)
    --latency-min-ms=N     Lower bound of lookup latency (default: 300)
    --latency-max-ms=N     Upper bound of lookup latency (default: 1500)
    --seed=N               Latency generator seed (default: 0)
    --trace                Record round events and dump them on exit
    --log=FILTER           tracing filter, e.g. 'debug' (default: warn)
    --help, -h             Show this help message
    --version, -V          Show version

EXISTING USERS:
    realkiwi, happyorange, iceapple, coolblueberry

ENVIRONMENT VARIABLES:
    FIELDWATCH_DEMO_INPUT            Override --input
    FIELDWATCH_DEMO_STEP_MS          Override --step-ms
    FIELDWATCH_DEMO_MIN_LENGTH       Override --min-length
    FIELDWATCH_DEMO_LATENCY_MIN_MS   Override --latency-min-ms
    FIELDWATCH_DEMO_LATENCY_MAX_MS   Override --latency-max-ms
    FIELDWATCH_DEMO_SEED             Override --seed
    FIELDWATCH_LOG                   Override --log
    FIELDWATCH_RECORD_TRACE          Same as --trace
    FIELDWATCH_DEBUG_TRACE           Print worker lifecycle to stderr";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Scripted text changes; empty means read stdin.
    pub inputs: Vec<String>,
    /// Pause between scripted changes.
    pub step_ms: u64,
    /// Shortest input that is validated.
    pub min_length: usize,
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub seed: u64,
    /// Record and dump the round trace.
    pub trace: bool,
    /// `tracing` filter directive.
    pub log: String,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            step_ms: 0,
            min_length: DEFAULT_MIN_LENGTH,
            latency_min_ms: 300,
            latency_max_ms: 1500,
            seed: 0,
            trace: false,
            log: "warn".into(),
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Opts),
    Help,
    Version,
}

fn split_inputs(val: &str) -> Vec<String> {
    val.split(',').map(str::to_string).collect()
}

fn parse_num<T: std::str::FromStr>(flag: &str, val: &str) -> Result<T, String> {
    val.parse()
        .map_err(|_| format!("Invalid --{flag} value: {val}"))
}

impl Opts {
    /// Parse command-line arguments and environment variables, exiting on
    /// `--help`, `--version` or bad input.
    pub fn parse() -> Self {
        match Self::parse_from(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(Command::Run(opts)) => opts,
            Ok(Command::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Ok(Command::Version) => {
                println!("fieldwatch-demo {VERSION}");
                process::exit(0);
            }
            Err(message) => {
                eprintln!("{message}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    /// Parse `args` with environment lookups through `env_var`.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags.
    pub fn parse_from(
        args: impl IntoIterator<Item = String>,
        env_var: impl Fn(&str) -> Option<String>,
    ) -> Result<Command, String> {
        let mut opts = Self::default();

        // Apply environment variable defaults first
        if let Some(val) = env_var("FIELDWATCH_DEMO_INPUT") {
            opts.inputs = split_inputs(&val);
        }
        if let Some(val) = env_var("FIELDWATCH_DEMO_STEP_MS")
            && let Ok(n) = val.parse()
        {
            opts.step_ms = n;
        }
        if let Some(val) = env_var("FIELDWATCH_DEMO_MIN_LENGTH")
            && let Ok(n) = val.parse()
        {
            opts.min_length = n;
        }
        if let Some(val) = env_var("FIELDWATCH_DEMO_LATENCY_MIN_MS")
            && let Ok(n) = val.parse()
        {
            opts.latency_min_ms = n;
        }
        if let Some(val) = env_var("FIELDWATCH_DEMO_LATENCY_MAX_MS")
            && let Ok(n) = val.parse()
        {
            opts.latency_max_ms = n;
        }
        if let Some(val) = env_var("FIELDWATCH_DEMO_SEED")
            && let Ok(n) = val.parse()
        {
            opts.seed = n;
        }
        if let Some(val) = env_var("FIELDWATCH_LOG") {
            opts.log = val;
        }
        if let Some(val) = env_var("FIELDWATCH_RECORD_TRACE") {
            opts.trace = val == "1" || val.eq_ignore_ascii_case("true");
        }

        // Parse command-line args (override env vars)
        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => return Ok(Command::Help),
                "--version" | "-V" => return Ok(Command::Version),
                "--trace" => opts.trace = true,
                other => {
                    if let Some(val) = other.strip_prefix("--input=") {
                        opts.inputs = split_inputs(val);
                    } else if let Some(val) = other.strip_prefix("--step-ms=") {
                        opts.step_ms = parse_num("step-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--min-length=") {
                        opts.min_length = parse_num("min-length", val)?;
                    } else if let Some(val) = other.strip_prefix("--latency-min-ms=") {
                        opts.latency_min_ms = parse_num("latency-min-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--latency-max-ms=") {
                        opts.latency_max_ms = parse_num("latency-max-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--seed=") {
                        opts.seed = parse_num("seed", val)?;
                    } else if let Some(val) = other.strip_prefix("--log=") {
                        opts.log = val.to_string();
                    } else {
                        return Err(format!("Unknown argument: {other}"));
                    }
                }
            }
        }

        if opts.latency_max_ms < opts.latency_min_ms {
            return Err(format!(
                "--latency-max-ms ({}) is below --latency-min-ms ({})",
                opts.latency_max_ms, opts.latency_min_ms
            ));
        }

        Ok(Command::Run(opts))
    }
}
