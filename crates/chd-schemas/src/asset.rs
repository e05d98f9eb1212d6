use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Opaque provider asset identifier (e.g. `"bitcoin"`).
///
/// Identifiers are case-normalized on construction: surrounding whitespace is
/// trimmed and ASCII letters are lowercased, so `"BiTcOiN "` and `"bitcoin"`
/// compare equal everywhere in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

/// Returned when an asset identifier is empty after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAssetId;

impl fmt::Display for InvalidAssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset id must not be empty")
    }
}

impl std::error::Error for InvalidAssetId {}

impl AssetId {
    /// Construct a normalized asset id. Fails only on an empty/blank input.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, InvalidAssetId> {
        let normalized = raw.as_ref().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(InvalidAssetId);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AssetId {
    type Error = InvalidAssetId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Quote currencies the provider is asked for. Valuations use exactly one
/// configured target currency; the others ride along on the snapshot fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Rub,
}

impl Currency {
    /// Provider query-string token (`vs_currencies=` value).
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "usd",
            Currency::Eur => "eur",
            Currency::Rub => "rub",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Some(Currency::Usd),
            "eur" => Some(Currency::Eur),
            "rub" => Some(Currency::Rub),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
