pub(crate) mod authenticated_identity;

use axum::http::StatusCode;

type RejectionType = (StatusCode, String);
