use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

pub const AUTH_TOKEN_HEADER: &str = "x-bt-auth-token";
pub const ORG_NAME_HEADER: &str = "x-bt-org-name";
pub const PROJECT_ID_HEADER: &str = "x-bt-project-id";

/// Caller identity as read from request headers. No verification happens here;
/// the token is forwarded to the API, which rejects it if invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
	pub token: Option<String>,
	pub org_name: Option<String>,
	pub project_id: Option<String>,
}

impl AuthContext {
	pub fn from_headers(headers: &HeaderMap) -> Self {
		let token = header_str(headers, AUTH_TOKEN_HEADER).or_else(|| {
			header_str(headers, AUTHORIZATION.as_str())
				.and_then(|v| v.strip_prefix("Bearer ").map(str::trim).map(str::to_string))
				.filter(|t| !t.is_empty())
		});
		Self {
			token,
			org_name: header_str(headers, ORG_NAME_HEADER),
			project_id: header_str(headers, PROJECT_ID_HEADER),
		}
	}

	pub fn is_authenticated(&self) -> bool {
		self.token.is_some()
	}
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
		.map(str::to_string)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	#[test]
	fn test_token_header_wins_over_bearer() {
		let mut headers = HeaderMap::new();
		headers.insert(AUTH_TOKEN_HEADER, HeaderValue::from_static("tok-1"));
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-2"));
		headers.insert(ORG_NAME_HEADER, HeaderValue::from_static("acme"));
		let auth = AuthContext::from_headers(&headers);
		assert_eq!(auth.token.as_deref(), Some("tok-1"));
		assert_eq!(auth.org_name.as_deref(), Some("acme"));
		assert_eq!(auth.project_id, None);
	}

	#[test]
	fn test_bearer_fallback() {
		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-2"));
		headers.insert(PROJECT_ID_HEADER, HeaderValue::from_static("p-1"));
		let auth = AuthContext::from_headers(&headers);
		assert_eq!(auth.token.as_deref(), Some("tok-2"));
		assert_eq!(auth.project_id.as_deref(), Some("p-1"));
	}

	#[test]
	fn test_missing_or_malformed_credentials() {
		assert!(!AuthContext::from_headers(&HeaderMap::new()).is_authenticated());

		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
		assert!(!AuthContext::from_headers(&headers).is_authenticated());

		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
		assert!(!AuthContext::from_headers(&headers).is_authenticated());
	}
}
