//! Early token validation
//!
//! Cheap checks that reject unsafe tokens before any strategy sees them:
//! discovery age, liquidity floor, blacklisted mints and name patterns,
//! market-cap ceiling.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::feed::TokenEvent;

/// Validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Reject tokens older than this at discovery time
    #[serde(default = "default_max_age_secs")]
    pub max_token_age_secs: u64,
    /// Minimum liquidity in SOL (0 disables the check)
    #[serde(default)]
    pub min_liquidity_sol: f64,
    /// Maximum market cap in SOL (0 disables the check)
    #[serde(default)]
    pub max_market_cap_sol: f64,
    /// Exact mints never to trade
    #[serde(default)]
    pub blacklist_mints: Vec<String>,
    /// Regex patterns applied to the mint string
    #[serde(default)]
    pub blacklist_patterns: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_age_secs() -> u64 {
    600
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_token_age_secs: default_max_age_secs(),
            min_liquidity_sol: 0.0,
            max_market_cap_sol: 0.0,
            blacklist_mints: vec![],
            blacklist_patterns: vec![],
        }
    }
}

/// Outcome of validating one token
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected { reason: String },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

/// Token validator
pub struct TokenValidator {
    config: ValidatorConfig,
    blacklist: HashSet<String>,
    patterns: Vec<Regex>,
}

impl TokenValidator {
    /// Create a validator, compiling blacklist patterns up front
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let patterns = config
            .blacklist_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::InvalidRegex(e.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let blacklist = config.blacklist_mints.iter().cloned().collect();

        Ok(Self {
            config,
            blacklist,
            patterns,
        })
    }

    /// Validate a discovery event
    ///
    /// `liquidity_sol` is the probed pool liquidity when available.
    pub fn validate(&self, event: &TokenEvent, liquidity_sol: Option<f64>) -> ValidationOutcome {
        if !self.config.enabled {
            return ValidationOutcome::Accepted;
        }

        if self.blacklist.contains(&event.mint) {
            return self.reject(&event.mint, "blacklisted mint");
        }

        for pattern in &self.patterns {
            if pattern.is_match(&event.mint) {
                return self.reject(&event.mint, "mint matches blacklist pattern");
            }
        }

        if self.config.min_liquidity_sol > 0.0 {
            match liquidity_sol {
                Some(liq) if liq < self.config.min_liquidity_sol => {
                    return self.reject(
                        &event.mint,
                        &format!(
                            "liquidity {:.3} SOL below floor {:.3}",
                            liq, self.config.min_liquidity_sol
                        ),
                    );
                }
                None => {
                    return self.reject(&event.mint, "liquidity unknown with floor configured");
                }
                _ => {}
            }
        }

        if self.config.max_market_cap_sol > 0.0 {
            if let Some(mc) = event.market_cap_sol {
                if mc > self.config.max_market_cap_sol {
                    return self.reject(
                        &event.mint,
                        &format!(
                            "market cap {:.1} SOL above cap {:.1}",
                            mc, self.config.max_market_cap_sol
                        ),
                    );
                }
            }
        }

        ValidationOutcome::Accepted
    }

    /// Check a token's age against the discovery window
    pub fn check_age(&self, age_secs: i64) -> ValidationOutcome {
        if !self.config.enabled {
            return ValidationOutcome::Accepted;
        }
        if age_secs < 0 || age_secs as u64 > self.config.max_token_age_secs {
            return ValidationOutcome::Rejected {
                reason: format!(
                    "token age {}s outside window {}s",
                    age_secs, self.config.max_token_age_secs
                ),
            };
        }
        ValidationOutcome::Accepted
    }

    fn reject(&self, mint: &str, reason: &str) -> ValidationOutcome {
        debug!("Rejected {}: {}", mint, reason);
        ValidationOutcome::Rejected {
            reason: reason.to_string(),
        }
    }
}
