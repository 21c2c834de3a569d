use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod catalog;
pub mod simulate;
pub mod validate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a host and a guest frame on an in-process bus and print the exchange.
    Simulate(SimulateArgs),
    /// List every message in the wire catalog.
    Catalog(CatalogArgs),
    /// Validate a payload against the schema for a message name.
    Validate(ValidateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Simulate(args) => simulate::run(args, format),
        Command::Catalog(args) => catalog::run(args, format),
        Command::Validate(args) => validate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Host location when the frame mounts.
    #[arg(long, default_value = "/legacy/")]
    pub path: String,
    /// Auth token the host holds when the frame mounts.
    #[arg(long)]
    pub token: Option<String>,
    /// Handshake deadline (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Origin of the embedded application.
    #[arg(long, default_value = "https://guest.localhost")]
    pub guest_origin: String,
    /// Origin of the host page.
    #[arg(long, default_value = "https://host.localhost")]
    pub host_origin: String,
    /// Never greet the host, so the handshake times out.
    #[arg(long)]
    pub silent_guest: bool,
    /// After connecting, the guest navigates to this path.
    #[arg(long, value_name = "PATH")]
    pub navigate: Option<String>,
    /// After connecting, the guest sets the page title.
    #[arg(long)]
    pub title: Option<String>,
    /// After connecting, the guest reports a login with this token.
    #[arg(long, value_name = "TOKEN", conflicts_with = "sign_out")]
    pub login: Option<String>,
    /// After connecting, the host signs out.
    #[arg(long)]
    pub sign_out: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DirectionFilter {
    GuestToHost,
    HostToGuest,
}

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only list messages travelling in one direction.
    #[arg(long)]
    pub direction: Option<DirectionFilter>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Message name, e.g. peer.navigated.
    pub name: String,
    /// JSON payload.
    #[arg(long)]
    pub json: String,
    /// Directory of `<name>.schema.json` files layered over the built-in schemas.
    #[arg(long, value_name = "DIR")]
    pub schemas: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
