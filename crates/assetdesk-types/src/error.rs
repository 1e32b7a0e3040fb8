//! Error type shared by all assetdesk crates

use axum::{http::StatusCode, response::IntoResponse, Json};

pub type AdResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	PermissionDenied,
	/// Missing or invalid credentials
	Unauthorized,
	ValidationError(String),
	/// A session was presented from an address other than the one it was issued to
	SessionIpMismatch,
	Parse,
	Internal(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Anomalies are reported at a higher severity than plain denials
	pub fn is_anomaly(&self) -> bool {
		matches!(self, Error::SessionIpMismatch | Error::ValidationError(_))
	}

	fn code(&self) -> &'static str {
		match self {
			Error::NotFound => "E-NOT-FOUND",
			Error::PermissionDenied => "E-PERMISSION-DENIED",
			Error::Unauthorized => "E-UNAUTHORIZED",
			Error::ValidationError(_) => "E-VALIDATION",
			Error::SessionIpMismatch => "E-SESSION-ANOMALY",
			Error::Parse => "E-PARSE",
			Error::Internal(_) | Error::Io(_) => "E-INTERNAL",
		}
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::Unauthorized => write!(f, "unauthorized"),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::SessionIpMismatch => write!(f, "session presented from a foreign address"),
			Error::Parse => write!(f, "parse error"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
			Error::Io(err) => write!(f, "I/O error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let status = match self {
			Error::NotFound => StatusCode::NOT_FOUND,
			Error::PermissionDenied => StatusCode::FORBIDDEN,
			Error::Unauthorized => StatusCode::UNAUTHORIZED,
			Error::ValidationError(_) | Error::Parse => StatusCode::BAD_REQUEST,
			// A possibly hijacked session is not answered like a wrong password
			Error::SessionIpMismatch | Error::Internal(_) | Error::Io(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		};
		// Internal details stay in the log
		let message = match status {
			StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
			_ => self.to_string(),
		};
		let body = serde_json::json!({
			"error": {
				"code": self.code(),
				"message": message,
			}
		});
		(status, Json(body)).into_response()
	}
}


// vim: ts=4
