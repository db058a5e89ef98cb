//! Deploy request validation.
//!
//! Checks run in a fixed order and stop at the first failure:
//! code syntax, then signature, then timestamp freshness. The code is
//! checked first so nothing else ever sees an unvalidated name.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::signer;
use crate::errors::DeployError;

static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("code regex is valid"));

/// Maximum distance between the caller's timestamp and server time, either way.
pub const TIMESTAMP_WINDOW: Duration = Duration::from_secs(5 * 60);

/// A deploy code that passed syntax validation.
///
/// This is the only type script paths and child environments are built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code(String);

impl Code {
    pub fn parse(raw: &str) -> Result<Self, DeployError> {
        if CODE_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(DeployError::InvalidCode)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business fields of a deploy request, as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    pub code: String,
    pub timestamp: String,
    pub signature: String,
}

pub struct RequestValidator<'a> {
    secret: &'a str,
    window: Duration,
}

impl<'a> RequestValidator<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self {
            secret,
            window: TIMESTAMP_WINDOW,
        }
    }

    /// Validate `req` against server time `now_ms` (milliseconds since epoch).
    pub fn validate(&self, req: &DeployRequest, now_ms: i64) -> Result<Code, DeployError> {
        let code = Code::parse(&req.code)?;

        if !signer::verify(self.secret, code.as_str(), &req.timestamp, &req.signature) {
            return Err(DeployError::InvalidSignature);
        }

        let sent_ms: i64 = req
            .timestamp
            .parse()
            .map_err(|_| DeployError::InvalidTimestamp(req.timestamp.clone()))?;
        let skew_ms = now_ms.saturating_sub(sent_ms);
        if u128::from(skew_ms.unsigned_abs()) > self.window.as_millis() {
            return Err(DeployError::ExpiredTimestamp { skew_ms });
        }

        Ok(code)
    }
}
