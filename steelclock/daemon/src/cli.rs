//! Command-line arguments

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

/// SteelClock - widget display for SteelSeries OLED screens
#[derive(Parser, Debug)]
#[command(name = "steelclock")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: config.json or the first profile in the app directory)
    #[arg(short = 'c', long, env = "STEELCLOCK_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run attached to the console
    #[arg(long)]
    pub console: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "STEELCLOCK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Gateway discovery file (coreProps.json)
    #[arg(long, value_name = "PATH")]
    pub core_props: Option<PathBuf>,
}

/// Single-dash long flags accepted for compatibility
const LEGACY_FLAGS: [&str; 2] = ["config", "console"];

/// Rewrite `-config`/`-console` (and `-config=PATH`) to their `--` form
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if LEGACY_FLAGS.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}
