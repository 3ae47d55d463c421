//! Facilitator server configuration.
//!
//! Loads a TOML file, expanding `$VAR` / `${VAR}` references from the
//! environment before parsing.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//!
//! [settlement]
//! timeout_seconds = 30
//! poll_interval_ms = 500
//!
//! [chains."eip155:84532"]
//! rpc_url = "https://sepolia.base.org"
//! signer_private_key = "$SIGNER_KEY_BASE_SEPOLIA"
//!
//! [chains.solana-devnet]
//! fee_payer = "${SOLANA_FEE_PAYER}"
//!
//! [chains."sui:testnet"]
//! ```
//!
//! # Environment Variables
//!
//! - `HOST` - Override the bind address
//! - `PORT` - Override the port
//! - Anything referenced as `$VAR` in the file

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use x402_core::settle::SettlementConfig;

/// Top-level facilitator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FacilitatorConfig {
    /// Bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Settlement engine tuning.
    #[serde(default)]
    pub settlement: SettlementSection,

    /// Chains keyed by CAIP-2 identifier or known network name.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
}

/// `[settlement]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SettlementSection {
    /// Deadline for every settlement; unset uses each requirement's `maxTimeoutSeconds`.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Delay between transaction status queries.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SettlementSection {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Per-chain configuration.
///
/// Every configured chain gets its family's "exact" scheme for verification.
/// EVM chains with both `rpc_url` and `signer_private_key` can also settle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChainConfig {
    /// HTTP RPC endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Hex private key of the account submitting settlements.
    #[serde(default)]
    pub signer_private_key: Option<String>,

    /// How far back to search for earlier submissions (EVM).
    #[serde(default)]
    pub lookback_blocks: Option<u64>,

    /// Fee payer advertised to account-model clients.
    #[serde(default)]
    pub fee_payer: Option<String>,
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4021
}

const fn default_poll_interval_ms() -> u64 {
    500
}

/// The configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config file path.
        path: String,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The expanded text is not a valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl FacilitatorConfig {
    /// Loads from `path`, then applies `HOST` / `PORT`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        let mut config = Self::parse(&content, |name| std::env::var(name).ok())?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        Ok(config)
    }

    /// Parses TOML text after expanding variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the expanded text is invalid.
    pub fn parse<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(toml::from_str(&expand_vars(content, lookup))?)
    }

    /// Settlement engine configuration.
    #[must_use]
    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            timeout_override: self.settlement.timeout_seconds.map(Duration::from_secs),
            poll_interval: Duration::from_millis(self.settlement.poll_interval_ms),
        }
    }
}

/// Expands `$VAR` and `${VAR}`; unresolved references are left as written.
fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            chars.next();
        }

        match lookup(&name).filter(|_| !name.is_empty() && (closed || !braced)) {
            Some(value) => result.push_str(&value),
            None => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}

/// Whether a value still holds an unexpanded `$VAR` reference.
#[must_use]
pub fn is_unresolved(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with('$')
}
