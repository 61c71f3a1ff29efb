use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{
    error::{ApiError, Error},
    schema::{User, UserRole, Uuid},
};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(user: &User, lifetime: Duration) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: user.id,
            email: user.email.to_owned(),
            role: user.role.to_owned(),
            iat,
            exp,
        }
    }
}

/// The caller of an operation, as established by a verified token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(ApiError::Forbidden.default());
        }
        Ok(())
    }

    /// Authors may change their own recipes, admins may change any.
    pub fn authenticate_owner(&self, author_id: Uuid) -> Result<(), Error> {
        if author_id == self.user_id {
            self.authenticate(ActionType::ManageOwnRecipes)
        } else {
            self.authenticate(ActionType::ManageAllRecipes)
        }
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            email: value.email,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
        }
    }
}

/// HMAC-SHA256 key used to sign and verify session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, lifetime_hours: i64) -> Result<Self, Error> {
        let key = Hmac::new_from_slice(secret.as_bytes())
            .map_err(|_| ApiError::Internal.new("Invalid jwt secret"))?;

        Ok(Self {
            key,
            lifetime: Duration::hours(lifetime_hours),
        })
    }

    pub fn generate_jwt_session(&self, user: &User) -> Result<String, Error> {
        JwtSessionData::new(user, self.lifetime)
            .sign_with_key(&self.key)
            .map_err(|e| {
                log::error!("Failed to sign session: {e}");
                ApiError::Internal.default()
            })
    }

    pub fn verify_jwt_session(&self, token: &str) -> Result<JwtSessionData, Error> {
        let session: JwtSessionData = token
            .verify_with_key(&self.key)
            .map_err(|_| ApiError::Unauthorized.new("Invalid session; Invalid token"))?;

        if session.exp < Utc::now().timestamp() {
            return Err(ApiError::Unauthorized.new("Invalid session; Token expired"));
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User {
            id: 7,
            email: String::from("cook@example.com"),
            username: String::from("cook"),
            first_name: String::from("Ada"),
            last_name: String::from("Cook"),
            avatar: None,
            role,
        }
    }

    #[test]
    fn signed_session_verifies() {
        let keys = SessionKeys::new("secret", 1).unwrap();
        let token = keys.generate_jwt_session(&user(UserRole::Admin)).unwrap();

        let session: SessionData = keys.verify_jwt_session(&token).unwrap().into();
        assert_eq!(session.user_id, 7);
        assert!(session.is_admin);
    }

    #[test]
    fn foreign_key_is_rejected() {
        let token = SessionKeys::new("secret", 1)
            .unwrap()
            .generate_jwt_session(&user(UserRole::User))
            .unwrap();

        let error = SessionKeys::new("other", 1)
            .unwrap()
            .verify_jwt_session(&token)
            .unwrap_err();
        assert_eq!(error.kind, ApiError::Unauthorized);
    }

    #[test]
    fn expired_session_is_rejected() {
        let keys = SessionKeys::new("secret", -1).unwrap();
        let token = keys.generate_jwt_session(&user(UserRole::User)).unwrap();

        let error = keys.verify_jwt_session(&token).unwrap_err();
        assert_eq!(error.info, "Invalid session; Token expired");
    }

    #[test]
    fn only_admins_manage_foreign_recipes() {
        let user: SessionData =
            JwtSessionData::new(&user(UserRole::User), Duration::hours(1)).into();

        assert!(user.authenticate_owner(7).is_ok());
        assert_eq!(
            user.authenticate_owner(8).unwrap_err().kind,
            ApiError::Forbidden
        );
    }
}
