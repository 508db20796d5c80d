//! Permanent identifiers for authorities and periods
//!
//! Identifiers are short, human-transcribable strings:
//!
//! ```text
//! p0 3wkq x          authority: prefix + 4 random + check
//! p0 3wkq x 8fb r    period:    authority id + 3 random + check
//! ```
//!
//! The check character is the alphabet character whose rank equals the sum of
//! every preceding character's rank weighted by its 1-based position, modulo
//! the alphabet size. The alphabet size (29) is prime and larger than any
//! identifier, so every single-character substitution and every transposition
//! of two adjacent, distinct characters changes the check character.
//!
//! A period identifier starts with its authority's identifier, so periods
//! group under their authority without a separator.

use crate::error::IdentifierError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Leading characters of every identifier
pub const PREFIX: &str = "p0";

/// Alphabet used to rank characters for the check computation
pub const CHECK_ALPHABET: &[u8] = b"0123456789bcdfghjkmnpqrstvwxz";

/// Alphabet for random bodies (no `0`/`1`, which read like `o`/`l`)
pub const BODY_ALPHABET: &[u8] = b"23456789bcdfghjkmnpqrstvwxz";

/// Random characters in an authority body
pub const AUTHORITY_BODY_LEN: usize = 4;

/// Random characters appended to an authority id for a period body
pub const PERIOD_BODY_LEN: usize = 3;

/// Length of a complete authority identifier
pub const AUTHORITY_ID_LEN: usize = PREFIX.len() + AUTHORITY_BODY_LEN + 1;

/// Length of a complete period identifier
pub const PERIOD_ID_LEN: usize = AUTHORITY_ID_LEN + PERIOD_BODY_LEN + 1;

/// Which entity an identifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Top-level period-definition scheme
    Authority,
    /// Period nested under an authority
    Period,
}

/// Which check schemes validation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Only the current scheme. Used for everything that writes.
    #[default]
    Strict,
    /// Current scheme, or the zero-based weighting that preceded it.
    /// Read-path compatibility only.
    AllowLegacy,
}

fn rank(c: u8) -> Option<usize> {
    CHECK_ALPHABET.iter().position(|&a| a == c)
}

fn weighted_check(s: &str, first_weight: usize) -> char {
    let sum: usize = s
        .bytes()
        .enumerate()
        .map(|(i, c)| rank(c).unwrap_or(0) * (i + first_weight))
        .sum();
    CHECK_ALPHABET[sum % CHECK_ALPHABET.len()] as char
}

/// Check character for `s` under the current scheme
pub fn check_char(s: &str) -> char {
    weighted_check(s, 1)
}

/// Check character for `s` under the retired zero-based scheme
pub fn legacy_check_char(s: &str) -> char {
    weighted_check(s, 0)
}

/// Append the current-scheme check character
pub fn with_check_char(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 1);
    out.push_str(s);
    out.push(check_char(s));
    out
}

fn malformed(id: &str, reason: impl Into<String>) -> IdentifierError {
    IdentifierError::Malformed {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn verify_check(id: &str, mode: ValidationMode) -> Result<(), IdentifierError> {
    let (body, last) = id.split_at(id.len() - 1);
    let actual = last.chars().next().unwrap_or_default();
    let expected = check_char(body);
    if actual == expected {
        return Ok(());
    }
    if mode == ValidationMode::AllowLegacy && actual == legacy_check_char(body) {
        return Ok(());
    }
    Err(IdentifierError::ChecksumMismatch {
        id: id.to_string(),
        expected,
        actual,
    })
}

/// Validate an identifier's shape and check character(s)
///
/// Period identifiers also have their embedded authority identifier checked.
/// Returns the kind of entity the identifier names.
pub fn validate(id: &str, mode: ValidationMode) -> Result<EntityKind, IdentifierError> {
    if !id.starts_with(PREFIX) {
        return Err(malformed(id, format!("must start with '{}'", PREFIX)));
    }
    if let Some(bad) = id.bytes().find(|&c| rank(c).is_none()) {
        return Err(malformed(
            id,
            format!("character '{}' is outside the identifier alphabet", bad as char),
        ));
    }
    match id.len() {
        AUTHORITY_ID_LEN => {
            verify_check(id, mode)?;
            Ok(EntityKind::Authority)
        }
        PERIOD_ID_LEN => {
            verify_check(&id[..AUTHORITY_ID_LEN], mode)?;
            verify_check(id, mode)?;
            Ok(EntityKind::Period)
        }
        n => Err(malformed(
            id,
            format!(
                "length {} is neither {} (authority) nor {} (period)",
                n, AUTHORITY_ID_LEN, PERIOD_ID_LEN
            ),
        )),
    }
}

/// Authority identifier a period identifier is nested under
pub fn authority_of(period_id: &str) -> Option<&str> {
    if period_id.len() == PERIOD_ID_LEN && period_id.is_char_boundary(AUTHORITY_ID_LEN) {
        Some(&period_id[..AUTHORITY_ID_LEN])
    } else {
        None
    }
}

/// Random identifier generator
///
/// Minting never consults a registry; uniqueness is the caller's concern
/// (see the skolem resolver's collision loop).
#[derive(Debug, Clone)]
pub struct IdMinter {
    rng: StdRng,
}

impl IdMinter {
    /// Minter seeded from OS entropy
    pub fn from_entropy() -> Self {
        IdMinter {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic minter
    pub fn seeded(seed: u64) -> Self {
        IdMinter {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn push_body(&mut self, out: &mut String, len: usize) {
        for _ in 0..len {
            let i = self.rng.gen_range(0..BODY_ALPHABET.len());
            out.push(BODY_ALPHABET[i] as char);
        }
    }

    /// Mint a new authority identifier
    pub fn mint_authority(&mut self) -> String {
        let mut body = String::with_capacity(AUTHORITY_ID_LEN);
        body.push_str(PREFIX);
        self.push_body(&mut body, AUTHORITY_BODY_LEN);
        with_check_char(&body)
    }

    /// Mint a new period identifier under `authority_id`
    ///
    /// The authority identifier must itself be valid under the current scheme.
    pub fn mint_period(&mut self, authority_id: &str) -> Result<String, IdentifierError> {
        match validate(authority_id, ValidationMode::Strict)? {
            EntityKind::Authority => {}
            EntityKind::Period => {
                return Err(malformed(authority_id, "expected an authority identifier"));
            }
        }
        let mut body = String::with_capacity(PERIOD_ID_LEN);
        body.push_str(authority_id);
        self.push_body(&mut body, PERIOD_BODY_LEN);
        Ok(with_check_char(&body))
    }
}

impl Default for IdMinter {
    fn default() -> Self {
        Self::from_entropy()
    }
}
