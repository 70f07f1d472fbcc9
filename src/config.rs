//! Node configuration: the single knob spec.md §6 names — effective tunnel
//! MTU — plus the ambient settings every long-running binary needs (logging
//! filter, an optional fixed identity seed for reproducible demos).
//!
//! A `clap::Parser` struct handles CLI flags with `env` fallbacks, `dotenvy`
//! loads a local `.env` file, and resolution stops at
//! CLI-then-environment-then-default — there's no JSON configuration file
//! layer, since one knob doesn't warrant one.

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Default effective tunnel MTU (spec.md §6).
pub const DEFAULT_MTU: u16 = 1280;

/// CLI arguments for the demonstration node binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "overlay-node")]
#[command(about = "Demonstration node for the overlay key-resolution and session I/O layer")]
pub struct CliArgs {
    /// Effective tunnel MTU.
    #[arg(long, env = "OVERLAY_MTU", default_value_t = DEFAULT_MTU)]
    pub mtu: u16,

    /// Hex-encoded 32-byte seed for this node's Ed25519 identity. A fresh
    /// random identity is generated when omitted.
    #[arg(long, env = "OVERLAY_SEED")]
    pub seed: Option<String>,

    /// `tracing-subscriber` env-filter directive.
    #[arg(long, env = "OVERLAY_LOG", default_value = "info")]
    pub log_filter: String,
}

/// Resolved node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mtu: u16,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from CLI arguments, falling back to environment
    /// variables (via `dotenvy`, if a `.env` file is present in the working
    /// directory) and finally the hardcoded defaults above.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        let cli_args = CliArgs::parse();
        Self {
            mtu: cli_args.mtu,
            log_filter: cli_args.log_filter,
        }
    }
}

/// Errors resolving the optional `--seed` / `OVERLAY_SEED` argument into a
/// fixed identity.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("invalid seed hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("seed must be exactly 32 bytes, got {0}")]
    WrongLength(usize),
}

impl CliArgs {
    /// Decodes `--seed` into a fixed 32-byte identity seed, if present.
    pub fn identity_seed(&self) -> Result<Option<[u8; 32]>, SeedError> {
        let Some(hex_str) = &self.seed else {
            return Ok(None);
        };
        let bytes = hex::decode(hex_str)?;
        let len = bytes.len();
        let seed: [u8; 32] = bytes.try_into().map_err(|_| SeedError::WrongLength(len))?;
        Ok(Some(seed))
    }
}
