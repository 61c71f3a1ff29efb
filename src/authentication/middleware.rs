use warp::{reject::Rejection, Filter};

use crate::error::ApiError;

use super::jwt::{SessionData, SessionKeys};

/// Token from an `Authorization: Token <jwt>` or `Bearer <jwt>` header.
fn header_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Token ")
        .or_else(|| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn verify(keys: &SessionKeys, header: Option<&str>) -> Option<SessionData> {
    let token = header_token(header?)?;
    keys.verify_jwt_session(token).ok().map(SessionData::from)
}

pub fn with_session(
    keys: SessionKeys,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let session = verify(&keys, header.as_deref());
        async move {
            session.ok_or_else(|| warp::reject::custom(ApiError::Unauthorized.default()))
        }
    })
}

/// Missing or invalid credentials yield an anonymous caller.
pub fn with_possible_session(
    keys: SessionKeys,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .map(move |header: Option<String>| verify(&keys, header.as_deref()))
}
