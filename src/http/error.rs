//! HTTP mapping for [`GatewayError`].

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::error::{ConnectionError, GatewayError, IoError, QueryError};

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Connection(ConnectionError::AuthRejected(_)) => StatusCode::UNAUTHORIZED,
            GatewayError::Connection(ConnectionError::Unreachable(_)) => StatusCode::BAD_GATEWAY,
            GatewayError::Connection(ConnectionError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Query(QueryError::SyntaxOrSchema(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Query(QueryError::ExecutionFailed(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GatewayError::Io(IoError::ReadFailed(_) | IoError::ParseFailed(_)) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Io(IoError::WriteFailed(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Config(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::PartialImport { source, .. } => source.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "status": "error",
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        if let Some(committed) = self.committed_records() {
            body["records"] = json!(committed);
        }

        HttpResponse::build(self.status_code())
            .content_type("application/json")
            .json(body)
    }
}
