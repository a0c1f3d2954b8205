use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use failure::Fail;

/// Failure classes surfaced by the service layer. Every variant maps to a
/// status code and a JSON `{"detail": ...}` body.
#[derive(Debug, Fail)]
pub enum ApiError {
    #[fail(display = "{}", _0)]
    NotFound(String),
    #[fail(display = "{}", _0)]
    BadRequest(String),
    #[fail(display = "{}", _0)]
    Unauthorized(String),
    #[fail(display = "{}", _0)]
    Forbidden(String),
    #[fail(display = "{}", _0)]
    Conflict(String),
    #[fail(display = "database error: {}", _0)]
    Db(#[fail(cause)] diesel::result::Error),
    #[fail(display = "connection pool error: {}", _0)]
    Pool(#[fail(cause)] r2d2::Error),
    #[fail(display = "{}", _0)]
    Internal(String),
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::DatabaseErrorKind;
        use diesel::result::Error;
        match e {
            Error::NotFound => ApiError::NotFound("record not found".into()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ApiError::Conflict(info.message().to_string())
            }
            e => ApiError::Db(e),
        }
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        ApiError::Pool(e)
    }
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "detail": self.to_string() }))
    }
}
