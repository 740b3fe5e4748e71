//! Request identity extractors
//!
//! Agency routes trust the identity headers set by the fronting auth gateway.
//! Portal routes carry a bearer session token that is checked against the
//! session store on every request.

use super::state::AppState;
use crate::error::ApiError;
use crate::services::{AgencyUser, PortalIdentity};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use portico_types::{AccountId, UserId};
use std::str::FromStr;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const COMPANY_SLUG_HEADER: &str = "x-company-slug";
pub const CLIENT_SLUG_HEADER: &str = "x-client-slug";

const DEFAULT_USER_NAME: &str = "Team member";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::Unauthorized {
        message: message.to_string(),
        rejection: None,
    }
}

fn parse_header<T: FromStr>(parts: &Parts, name: &str) -> Result<T, ApiError> {
    header(&parts.headers, name)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| unauthorized("Authentication required"))
}

/// Session token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AgencyUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id: AccountId = parse_header(parts, ACCOUNT_ID_HEADER)?;
        let user_id: UserId = parse_header(parts, USER_ID_HEADER)?;
        let user_name = header(&parts.headers, USER_NAME_HEADER)
            .unwrap_or(DEFAULT_USER_NAME)
            .to_string();

        Ok(AgencyUser {
            account_id,
            user_id,
            user_name,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for PortalIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| unauthorized("Missing session token"))?;
        let company_slug = header(&parts.headers, COMPANY_SLUG_HEADER)
            .ok_or_else(|| unauthorized("Missing company slug"))?;
        let client_slug = header(&parts.headers, CLIENT_SLUG_HEADER)
            .ok_or_else(|| unauthorized("Missing client slug"))?;

        Ok(state
            .services
            .magic_link
            .validate_session(token, company_slug, client_slug)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        let bearer = parts(&[("authorization", "Bearer abc")]);
        assert_eq!(bearer_token(&bearer.headers), Some("abc"));
        let basic = parts(&[("authorization", "Basic abc")]);
        assert_eq!(bearer_token(&basic.headers), None);
        let blank = parts(&[("authorization", "Bearer  ")]);
        assert_eq!(bearer_token(&blank.headers), None);
        assert_eq!(bearer_token(&parts(&[]).headers), None);
    }

    #[tokio::test]
    async fn test_agency_user_from_headers() {
        let account = AccountId::generate();
        let user = UserId::generate();
        let mut p = parts(&[
            (ACCOUNT_ID_HEADER, &account.to_string()),
            (USER_ID_HEADER, &user.to_string()),
        ]);
        let extracted = AgencyUser::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(extracted.account_id, account);
        assert_eq!(extracted.user_name, DEFAULT_USER_NAME);

        let mut p = parts(&[
            (ACCOUNT_ID_HEADER, "not-a-uuid"),
            (USER_ID_HEADER, &user.to_string()),
        ]);
        assert!(matches!(
            AgencyUser::from_request_parts(&mut p, &()).await,
            Err(ApiError::Unauthorized { .. })
        ));
    }
}
