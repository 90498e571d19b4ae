/// Authentication extractors
use crate::{account::ValidatedSession, context::AppContext, error::SonoraError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = SonoraError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| SonoraError::Authentication("Login required".to_string()))?;

        let session = state.account_manager.validate_token(&token).await?;

        Ok(AuthContext {
            user_id: session.user_id,
            session,
        })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn user_id(&self) -> Option<i64> {
        self.auth.as_ref().map(|a| a.user_id)
    }

    pub fn is_moderator(&self) -> bool {
        self.auth
            .as_ref()
            .map(|a| a.session.is_moderator)
            .unwrap_or(false)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = SonoraError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match extract_bearer_token(&parts.headers) {
            Some(token) => match state.account_manager.validate_token(&token).await {
                Ok(session) => Some(AuthContext {
                    user_id: session.user_id,
                    session,
                }),
                Err(e) => {
                    tracing::debug!("Ignoring invalid session: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}

/// Moderator context - requires the moderation capability
#[derive(Debug, Clone)]
pub struct ModeratorAuthContext {
    pub user_id: i64,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for ModeratorAuthContext {
    type Rejection = SonoraError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { user_id, session } =
            AuthContext::from_request_parts(parts, state).await?;

        if !session.is_moderator {
            tracing::warn!("User {} is not a moderator", session.username);
            return Err(SonoraError::Authorization(
                "Moderator permission required".to_string(),
            ));
        }

        Ok(ModeratorAuthContext { user_id, session })
    }
}
