use axum::http::header::{
	ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
	ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, VARY,
};
use axum::http::{HeaderMap, HeaderValue};
use regex::Regex;

const ALLOWED_ORIGIN_PATTERNS: &[&str] = &[
	r"^https://(www\.)?braintrust\.dev$",
	r"^https://(www\.)?braintrustdata\.com$",
	r"^https://[a-z0-9-]+\.preview\.braintrust\.dev$",
	r"^https://[a-z0-9-]+\.vercel\.app$",
	r"^https?://localhost(:\d+)?$",
	r"^https?://127\.0\.0\.1(:\d+)?$",
];

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str =
	"Content-Type, Authorization, x-bt-auth-token, x-bt-org-name, x-bt-project-id, x-bt-stream-fmt";

/// Decides which origins get credentialed CORS responses.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
	patterns: Vec<Regex>,
	extra_origins: Vec<String>,
}

impl CorsPolicy {
	/// Built-in origins plus up to two configured extras (exact match, trailing `/` ignored).
	pub fn new(whitelisted_origin: Option<&str>, app_url: Option<&str>) -> Result<Self, regex::Error> {
		let patterns = ALLOWED_ORIGIN_PATTERNS
			.iter()
			.map(|p| Regex::new(p))
			.collect::<Result<Vec<_>, _>>()?;
		let extra_origins = [whitelisted_origin, app_url]
			.into_iter()
			.flatten()
			.map(|o| o.trim().trim_end_matches('/').to_string())
			.filter(|o| !o.is_empty())
			.collect();
		Ok(Self {
			patterns,
			extra_origins,
		})
	}

	pub fn is_allowed(&self, origin: &str) -> bool {
		let origin = origin.trim_end_matches('/');
		self.extra_origins.iter().any(|o| o == origin) || self.patterns.iter().any(|p| p.is_match(origin))
	}

	/// Allowed origins are echoed back with credentials; anything else gets `*`.
	pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
		let allowed = origin.filter(|o| o.to_str().is_ok_and(|o| self.is_allowed(o)));
		match allowed {
			Some(origin) => {
				headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
				headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
				headers.append(VARY, HeaderValue::from_static("Origin"));
			}
			None => {
				headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
			}
		}
		headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
		headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
		headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy() -> CorsPolicy {
		CorsPolicy::new(Some("https://evals.example.com/"), None).unwrap()
	}

	#[test]
	fn test_builtin_origins() {
		let policy = policy();
		for origin in [
			"https://www.braintrust.dev",
			"https://braintrustdata.com",
			"https://pr-42.preview.braintrust.dev",
			"https://my-app.vercel.app",
			"http://localhost:3000",
			"https://127.0.0.1",
		] {
			assert!(policy.is_allowed(origin), "{origin} should be allowed");
		}
		for origin in [
			"https://evil.com",
			"https://braintrust.dev.evil.com",
			"http://braintrust.dev",
			"https://a.b.vercel.app",
		] {
			assert!(!policy.is_allowed(origin), "{origin} should be rejected");
		}
	}

	#[test]
	fn test_configured_origins() {
		let policy = CorsPolicy::new(Some("https://evals.example.com/"), Some("https://bt.internal")).unwrap();
		assert!(policy.is_allowed("https://evals.example.com"));
		assert!(policy.is_allowed("https://bt.internal"));
		assert!(!policy.is_allowed("https://other.example.com"));
	}

	#[test]
	fn test_apply_headers() {
		let policy = policy();
		let mut headers = HeaderMap::new();
		let origin = HeaderValue::from_static("http://localhost:5173");
		policy.apply(Some(&origin), &mut headers);
		assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
		assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

		let mut headers = HeaderMap::new();
		let origin = HeaderValue::from_static("https://evil.com");
		policy.apply(Some(&origin), &mut headers);
		assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
		assert!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());

		let mut headers = HeaderMap::new();
		policy.apply(None, &mut headers);
		assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
	}
}
