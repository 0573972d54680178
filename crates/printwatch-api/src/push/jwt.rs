// ES256 provider-token minting for the push service.
//
// Tokens are valid for an hour; the service rejects tokens refreshed
// more often than every 20 minutes, so one signer caches the current
// token and re-mints shortly before expiry.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::error::Error;

/// Re-mint after 50 minutes, safely inside the one-hour validity window.
const REFRESH_AFTER: Duration = Duration::from_secs(50 * 60);

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

/// Signs and caches provider tokens for the push transport.
pub struct ProviderTokenSigner {
    key: EncodingKey,
    key_id: String,
    team_id: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl ProviderTokenSigner {
    /// Load the signing key from a PKCS#8 EC PEM file.
    pub fn from_pem_file(
        path: &Path,
        key_id: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Result<Self, Error> {
        let pem = std::fs::read(path)
            .map_err(|e| Error::ProviderToken(format!("failed to read signing key: {e}")))?;
        let key = EncodingKey::from_ec_pem(&pem)
            .map_err(|e| Error::ProviderToken(format!("invalid signing key: {e}")))?;

        Ok(Self {
            key,
            key_id: key_id.into(),
            team_id: team_id.into(),
            cached: Mutex::new(None),
        })
    }

    /// Return the current provider token, minting a fresh one if the
    /// cached token is near expiry.
    pub fn token(&self) -> Result<String, Error> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| Error::ProviderToken("signer lock poisoned".into()))?;

        if let Some((token, minted_at)) = cached.as_ref() {
            if minted_at.elapsed() < REFRESH_AFTER {
                return Ok(token.clone());
            }
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let claims = Claims {
            iss: &self.team_id,
            iat: chrono::Utc::now().timestamp(),
        };

        let token = jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| Error::ProviderToken(format!("token signing failed: {e}")))?;

        tracing::debug!(key_id = %self.key_id, "minted fresh provider token");
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}
