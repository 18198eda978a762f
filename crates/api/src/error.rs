use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shop_models::ShopError;

use crate::routes::ApiResponse;

#[derive(Debug)]
pub struct ApiError(pub ShopError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ShopError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
            ShopError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ShopError::InvalidOrder { .. } | ShopError::UnknownStatus(_) => StatusCode::BAD_REQUEST,
            ShopError::Unauthorized => StatusCode::UNAUTHORIZED,
            ShopError::Forbidden => StatusCode::FORBIDDEN,
            ShopError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self.0);
        } else {
            tracing::debug!("request rejected: {}", self.0);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(self.0.to_string()),
            pagination: None,
        };
        (status, Json(body)).into_response()
    }
}
