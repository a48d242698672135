//! Signed claims codec for availability-form links.
//!
//! Tokens are compact three-part HS256 claims tokens. The signing key lives in
//! an explicitly constructed [`SigningContext`] injected at startup; there is
//! no process-wide signing state.
//!
//! Expiry is deliberately NOT validated during decode: the token service owns
//! expiry evaluation because the post-expiry grace rule needs both the signed
//! expiry and the caller's form-load time.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::ids::{PromptId, TokenId, UserId};

/// Fixed audience claim scoping tokens to this feature.
pub const TOKEN_AUDIENCE: &str = "gamenight:availability";
/// Fixed issuer claim.
pub const TOKEN_ISSUER: &str = "gamenight";

/// Claims payload embedded in every availability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityClaims {
    /// Subject: the member's user id.
    pub sub: String,
    /// Display name shown on the availability form.
    pub name: String,
    /// The prompt this token answers.
    pub prompt_id: String,
    pub aud: String,
    pub iss: String,
    /// Unique token identifier; keys the stored [`crate::domain::MagicToken`] row.
    pub jti: String,
    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,
}

impl AvailabilityClaims {
    /// Parse the subject claim as a user id.
    pub fn user_id(&self) -> Result<UserId, uuid::Error> {
        self.sub.parse()
    }

    /// Parse the prompt reference claim.
    pub fn prompt_ref(&self) -> Result<PromptId, uuid::Error> {
        self.prompt_id.parse()
    }

    /// Parse the jti claim as a token id.
    pub fn token_id(&self) -> Result<TokenId, uuid::Error> {
        self.jti.parse()
    }
}

/// Errors raised while encoding or decoding tokens.
///
/// Decode failures are never differentiated to callers of the validation
/// path; they all collapse to the `invalid_token` reason.
#[derive(Debug, thiserror::Error)]
pub enum TokenCodecError {
    #[error("failed to encode token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("failed to decode token: {0}")]
    Decode(#[source] jsonwebtoken::errors::Error),
}

/// Explicitly constructed signing state for the codec.
#[derive(Clone)]
pub struct SigningContext {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningContext {
    /// Build a context from raw key material sourced from configuration.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material must never appear in logs.
        f.debug_struct("SigningContext").finish_non_exhaustive()
    }
}

/// Encoder/decoder for availability tokens.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    context: SigningContext,
}

impl TokenCodec {
    /// Create a codec over the given signing context.
    #[must_use]
    pub const fn new(context: SigningContext) -> Self {
        Self { context }
    }

    /// Encode and sign a claims payload.
    pub fn encode(&self, claims: &AvailabilityClaims) -> Result<String, TokenCodecError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.context.encoding)
            .map_err(TokenCodecError::Encode)
    }

    /// Verify signature, audience, and issuer, returning the claims.
    ///
    /// Expiry is not checked here; see the module docs.
    pub fn decode(&self, token: &str) -> Result<AvailabilityClaims, TokenCodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.validate_exp = false;

        jsonwebtoken::decode::<AvailabilityClaims>(token, &self.context.decoding, &validation)
            .map(|data| data.claims)
            .map_err(TokenCodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_codec() -> TokenCodec {
        TokenCodec::new(SigningContext::from_secret(b"fixture-signing-secret"))
    }

    fn fixture_claims(exp: i64) -> AvailabilityClaims {
        AvailabilityClaims {
            sub: UserId::random().to_string(),
            name: "Ada".to_owned(),
            prompt_id: PromptId::random().to_string(),
            aud: TOKEN_AUDIENCE.to_owned(),
            iss: TOKEN_ISSUER.to_owned(),
            jti: TokenId::random().to_string(),
            exp,
        }
    }

    #[test]
    fn encode_decode_round_trips_claims() {
        let codec = fixture_codec();
        let claims = fixture_claims(4_102_444_800);
        let token = codec.encode(&claims).expect("encodes");
        let decoded = codec.decode(&token).expect("decodes");
        assert_eq!(decoded, claims);
        assert_eq!(decoded.aud, TOKEN_AUDIENCE);
        assert_eq!(decoded.iss, TOKEN_ISSUER);
    }

    #[test]
    fn decode_accepts_expired_tokens() {
        // Expiry is evaluated by the token service, not the codec.
        let codec = fixture_codec();
        let token = codec.encode(&fixture_claims(946_684_800)).expect("encodes");
        assert!(codec.decode(&token).is_ok());
    }

    #[test]
    fn decode_rejects_wrong_audience() {
        let codec = fixture_codec();
        let mut claims = fixture_claims(4_102_444_800);
        claims.aud = "somewhere-else".to_owned();
        let token = codec.encode(&claims).expect("encodes");
        assert!(codec.decode(&token).is_err());
    }

    #[test]
    fn decode_rejects_wrong_key_and_garbage() {
        let codec = fixture_codec();
        let other = TokenCodec::new(SigningContext::from_secret(b"another-secret"));
        let token = other
            .encode(&fixture_claims(4_102_444_800))
            .expect("encodes");
        assert!(codec.decode(&token).is_err());
        assert!(codec.decode("not-a-token").is_err());
        assert!(codec.decode("").is_err());
    }
}
