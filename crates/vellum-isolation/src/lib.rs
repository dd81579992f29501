//! Vellum Isolation Negotiator
//!
//! The persistent store needs the shared-memory primitive that only a
//! cross-origin-isolated page gets. This crate decides, once per page load,
//! whether the page is isolated and, when the host cannot send the
//! isolation headers itself, installs an interceptor that injects them and
//! reloads the page exactly once.

mod error;
mod headers;
mod negotiator;

pub use error::IsolationError;
pub use headers::{
    EmbedderPolicy, HeaderInterceptor, InterceptedRequest, RequestDecision, RequestMode,
    ResponseHeaders, EMBEDDER_POLICY_HEADER, OPENER_POLICY_HEADER, RESOURCE_POLICY_HEADER,
};
pub use negotiator::{
    HostSupport, IsolationState, Negotiation, Negotiator, PageContext, UnavailableReason,
};

pub type Result<T> = std::result::Result<T, IsolationError>;
