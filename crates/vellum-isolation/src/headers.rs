//! Isolation headers and the client-side interception layer
//!
//! Hosts that cannot set response headers get them injected by a
//! request-interception service registered for the page's scope:
//! ```text
//! Cross-Origin-Opener-Policy:   same-origin
//! Cross-Origin-Embedder-Policy: require-corp | credentialless
//! Cross-Origin-Resource-Policy: cross-origin   (require-corp only)
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;

pub const OPENER_POLICY_HEADER: &str = "Cross-Origin-Opener-Policy";
pub const EMBEDDER_POLICY_HEADER: &str = "Cross-Origin-Embedder-Policy";
pub const RESOURCE_POLICY_HEADER: &str = "Cross-Origin-Resource-Policy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbedderPolicy {
    /// Every subresource must opt in via CORP/CORS
    #[default]
    RequireCorp,
    /// Cross-origin no-cors requests are sent without credentials instead
    Credentialless,
}

impl EmbedderPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedderPolicy::RequireCorp => "require-corp",
            EmbedderPolicy::Credentialless => "credentialless",
        }
    }
}

impl std::fmt::Display for EmbedderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response headers with case-insensitive names, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value under the same name
    pub fn set(&mut self, name: &str, value: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// A fetch as seen by the interceptor before it goes to the network.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: Url,
    pub mode: RequestMode,
    /// `cache: "only-if-cached"`
    pub only_if_cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Let the platform handle the request untouched
    Bypass,
    /// Fetch through the interceptor and rewrite the response
    Forward { omit_credentials: bool },
}

/// The interception service that stands in for server-set headers.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    scope: Url,
    embedder_policy: EmbedderPolicy,
}

impl HeaderInterceptor {
    /// Build an interceptor controlling every page under `scope`.
    pub fn new(scope: &str, embedder_policy: EmbedderPolicy) -> Result<Self> {
        let scope = Url::parse(scope)?;
        Ok(Self {
            scope,
            embedder_policy,
        })
    }

    /// Interceptor scoped to the directory containing `page`
    pub fn for_page(page: &Url, embedder_policy: EmbedderPolicy) -> Result<Self> {
        let scope = page.join("./")?;
        Ok(Self {
            scope,
            embedder_policy,
        })
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Whether a document at `url` is controlled by this interceptor
    pub fn controls(&self, url: &Url) -> bool {
        url.origin() == self.scope.origin() && url.path().starts_with(self.scope.path())
    }

    pub fn decide(&self, request: &InterceptedRequest) -> RequestDecision {
        // Cached-only lookups may only be served for same-origin mode.
        if request.only_if_cached && request.mode != RequestMode::SameOrigin {
            return RequestDecision::Bypass;
        }

        // credentialless only strips cookies from cross-origin no-cors fetches
        let omit_credentials = self.embedder_policy == EmbedderPolicy::Credentialless
            && request.mode == RequestMode::NoCors
            && request.url.origin() != self.scope.origin();

        RequestDecision::Forward { omit_credentials }
    }

    /// Inject the isolation headers into a forwarded response.
    ///
    /// Opaque responses (status 0) cannot be modified and pass through.
    pub fn rewrite_response(&self, status: u16, headers: &mut ResponseHeaders) {
        if status == 0 {
            return;
        }

        headers.set(EMBEDDER_POLICY_HEADER, self.embedder_policy.as_str());
        if self.embedder_policy == EmbedderPolicy::RequireCorp {
            headers.set(RESOURCE_POLICY_HEADER, "cross-origin");
        }
        headers.set(OPENER_POLICY_HEADER, "same-origin");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, mode: RequestMode) -> InterceptedRequest {
        InterceptedRequest {
            url: Url::parse(url).unwrap(),
            mode,
            only_if_cached: false,
        }
    }

    #[test]
    fn test_rewrite_injects_headers() {
        let interceptor =
            HeaderInterceptor::new("https://notes.example/app/", EmbedderPolicy::RequireCorp)
                .unwrap();
        let mut headers = ResponseHeaders::new();
        headers.set("content-type", "text/html");
        headers.set("cross-origin-opener-policy", "unsafe-none");

        interceptor.rewrite_response(200, &mut headers);

        assert_eq!(headers.get(OPENER_POLICY_HEADER), Some("same-origin"));
        assert_eq!(headers.get(EMBEDDER_POLICY_HEADER), Some("require-corp"));
        assert_eq!(headers.get(RESOURCE_POLICY_HEADER), Some("cross-origin"));
        // replaced, not duplicated
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_opaque_response_untouched() {
        let interceptor =
            HeaderInterceptor::new("https://notes.example/", EmbedderPolicy::RequireCorp).unwrap();
        let mut headers = ResponseHeaders::new();
        interceptor.rewrite_response(0, &mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_credentialless_mode() {
        let interceptor =
            HeaderInterceptor::new("https://notes.example/", EmbedderPolicy::Credentialless)
                .unwrap();

        let mut headers = ResponseHeaders::new();
        interceptor.rewrite_response(200, &mut headers);
        assert_eq!(headers.get(EMBEDDER_POLICY_HEADER), Some("credentialless"));
        assert_eq!(headers.get(RESOURCE_POLICY_HEADER), None);

        let decision = interceptor.decide(&request("https://cdn.example/a.js", RequestMode::NoCors));
        assert_eq!(
            decision,
            RequestDecision::Forward {
                omit_credentials: true
            }
        );

        let own = interceptor.decide(&request("https://notes.example/logo.png", RequestMode::NoCors));
        assert_eq!(
            own,
            RequestDecision::Forward {
                omit_credentials: false
            }
        );
    }

    #[test]
    fn test_only_if_cached_bypass() {
        let interceptor =
            HeaderInterceptor::new("https://notes.example/", EmbedderPolicy::RequireCorp).unwrap();
        let mut req = request("https://cdn.example/a.js", RequestMode::NoCors);
        req.only_if_cached = true;
        assert_eq!(interceptor.decide(&req), RequestDecision::Bypass);

        req.mode = RequestMode::SameOrigin;
        assert_eq!(
            interceptor.decide(&req),
            RequestDecision::Forward {
                omit_credentials: false
            }
        );
    }

    #[test]
    fn test_scope_control() {
        let page = Url::parse("https://notes.example/app/index.html").unwrap();
        let interceptor = HeaderInterceptor::for_page(&page, EmbedderPolicy::RequireCorp).unwrap();

        assert_eq!(interceptor.scope().as_str(), "https://notes.example/app/");
        assert!(interceptor.controls(&page));
        assert!(!interceptor.controls(&Url::parse("https://notes.example/other/").unwrap()));
        assert!(!interceptor.controls(&Url::parse("https://evil.example/app/").unwrap()));
    }
}
