//! Curi minting.
//!
//! A curi is the public address of a conduit: `<prefix>-<token>.<domain>`,
//! where `token` is drawn at random from an alphabet free of visually
//! ambiguous characters. Its length is fixed by configuration so storage
//! columns and URL construction can rely on it.
use std::sync::Arc;

use rand::Rng;

use crate::conduit::error::ConduitError;

pub const DEFAULT_PREFIX: &str = "cd";
pub const DEFAULT_DOMAIN: &str = "conduit.run";
/// Lowercase alphanumerics without `0`, `o`, `1`, `l` and `i`.
pub const DEFAULT_ALPHABET: &str = "23456789abcdefghjkmnpqrstuvwxyz";
pub const DEFAULT_TOKEN_LENGTH: usize = 8;

const PREFIX_LENGTH: usize = 2;
const AMBIGUOUS_CHARACTERS: &[char] = &['0', 'o', 'O', '1', 'l', 'I', 'i'];

/// Curi format configuration, created once at process startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuriConfig {
    prefix: String,
    domain: String,
    alphabet: Vec<char>,
    token_length: usize,
}

impl Default for CuriConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            token_length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl CuriConfig {
    /// Builds a validated configuration.
    ///
    /// # Errors
    /// [`ConduitError::InvalidConfiguration`] when the prefix is not two
    /// lowercase ASCII alphanumerics, the domain is empty or contains
    /// whitespace, the alphabet is empty, repeats a character or contains a
    /// non-alphanumeric or ambiguous character, or the token length is zero.
    pub fn new(
        prefix: impl Into<String>,
        domain: impl Into<String>,
        alphabet: &str,
        token_length: usize,
    ) -> Result<Self, ConduitError> {
        let prefix = prefix.into();
        let domain = domain.into();

        if prefix.len() != PREFIX_LENGTH
            || !prefix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ConduitError::InvalidConfiguration(format!(
                "prefix must be {PREFIX_LENGTH} lowercase alphanumeric characters, got {prefix:?}"
            )));
        }
        if domain.is_empty() || domain.chars().any(char::is_whitespace) {
            return Err(ConduitError::InvalidConfiguration(format!(
                "domain must be non-empty without whitespace, got {domain:?}"
            )));
        }
        if token_length == 0 {
            return Err(ConduitError::InvalidConfiguration(
                "token length must be at least 1".to_string(),
            ));
        }

        let mut chars: Vec<char> = Vec::with_capacity(alphabet.len());
        for c in alphabet.chars() {
            if !c.is_ascii_alphanumeric() || AMBIGUOUS_CHARACTERS.contains(&c) {
                return Err(ConduitError::InvalidConfiguration(format!(
                    "alphabet character {c:?} is not allowed"
                )));
            }
            if chars.contains(&c) {
                return Err(ConduitError::InvalidConfiguration(format!(
                    "alphabet character {c:?} is repeated"
                )));
            }
            chars.push(c);
        }
        if chars.is_empty() {
            return Err(ConduitError::InvalidConfiguration("alphabet is empty".to_string()));
        }

        Ok(Self { prefix, domain, alphabet: chars, token_length })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn token_length(&self) -> usize {
        self.token_length
    }

    /// Fixed length of every curi minted with this configuration.
    pub fn curi_len(&self) -> usize {
        PREFIX_LENGTH + 1 + self.token_length + 1 + self.domain.len()
    }
}

/// Mints curis from a [`CuriConfig`].
///
/// Cheap to clone; the configuration is shared.
#[derive(Debug, Clone, Default)]
pub struct IdentifierGenerator {
    config: Arc<CuriConfig>,
}

impl IdentifierGenerator {
    pub fn new(config: CuriConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    pub fn config(&self) -> &CuriConfig {
        &self.config
    }

    /// Mints a fresh curi.
    ///
    /// Entropy comes from the thread-local CSPRNG; failure to seed it is a
    /// fatal environment fault and panics.
    pub fn mint(&self) -> String {
        let alphabet = &self.config.alphabet;
        let mut rng = rand::thread_rng();
        let token: String = (0..self.config.token_length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        format!("{}-{}.{}", self.config.prefix, token, self.config.domain)
    }

    /// Checks that `curi` has the configured prefix, domain, token length and alphabet.
    pub fn is_well_formed(&self, curi: &str) -> bool {
        if curi.len() != self.config.curi_len() {
            return false;
        }
        let Some(rest) = curi.strip_prefix(self.config.prefix.as_str()) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix('-') else {
            return false;
        };
        let Some((token, domain)) = rest.split_once('.') else {
            return false;
        };
        domain == self.config.domain
            && token.chars().count() == self.config.token_length
            && token.chars().all(|c| self.config.alphabet.contains(&c))
    }
}
