// Identity extractors. Authentication happens upstream; these only read the
// identity it established.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use shop_models::{Role, ShopError, UserId};

use crate::error::ApiError;
use crate::state::AppState;

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|value| value.to_str().ok())
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = header_value(parts, &state.settings.identity_header).ok_or(ShopError::Unauthorized)?;
        let user_id = UserId::new(raw)?;
        let role = Role::parse(header_value(parts, &state.settings.role_header));

        Ok(Self { user_id, role })
    }
}

#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            return Err(ShopError::Forbidden.into());
        }
        Ok(Self(user))
    }
}
