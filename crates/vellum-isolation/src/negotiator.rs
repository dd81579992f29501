//! Isolation negotiation
//!
//! ```text
//! NotIsolated
//!   ↓ interceptor registered, reload (once)
//! Isolated
//! ```
//!
//! The decision is taken once per page load. A page load owns exactly one
//! `Negotiator`; later calls return the recorded outcome without touching
//! the page again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::headers::{EmbedderPolicy, HeaderInterceptor};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationState {
    Isolated,
    NotIsolated,
}

impl IsolationState {
    pub fn is_isolated(&self) -> bool {
        matches!(self, IsolationState::Isolated)
    }
}

/// What the hosting platform can do about response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostSupport {
    /// The host sends COOP/COEP itself
    NativeHeaders,
    /// Static hosting without header configuration
    #[default]
    NoCustomHeaders,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    #[error("host is expected to send isolation headers but the page is not isolated")]
    HostMisconfigured,

    #[error("page is not a secure context")]
    InsecureContext,

    #[error("interceptor registration failed: {0}")]
    InterceptorRejected(String),

    #[error("page was reloaded under the interceptor but is still not isolated")]
    ReloadDidNotIsolate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Nothing to do; persistence may proceed
    AlreadyIsolated,
    /// The interceptor is installed and the page is reloading
    ReloadScheduled,
    /// Isolation cannot be reached on this load
    Unavailable(UnavailableReason),
}

impl Negotiation {
    pub fn state(&self) -> IsolationState {
        match self {
            Negotiation::AlreadyIsolated => IsolationState::Isolated,
            _ => IsolationState::NotIsolated,
        }
    }
}

/// The page the negotiator runs in.
///
/// The reload marker must survive a reload of the same tab (session-scoped
/// storage) and is what keeps negotiation from looping.
pub trait PageContext {
    fn url(&self) -> &Url;
    fn is_cross_origin_isolated(&self) -> bool;
    fn is_secure_context(&self) -> bool;
    fn reload_marker(&self) -> bool;
    fn set_reload_marker(&self, value: bool);
    fn register_interceptor(&self, interceptor: HeaderInterceptor) -> Result<()>;
    fn reload(&self);
}

pub struct Negotiator {
    host: HostSupport,
    embedder_policy: EmbedderPolicy,
    outcome: Mutex<Option<Negotiation>>,
}

impl Negotiator {
    pub fn new(host: HostSupport, embedder_policy: EmbedderPolicy) -> Self {
        Self {
            host,
            embedder_policy,
            outcome: Mutex::new(None),
        }
    }

    /// Isolation state as established by this page load
    pub fn state(&self) -> IsolationState {
        self.outcome
            .lock()
            .as_ref()
            .map(Negotiation::state)
            .unwrap_or(IsolationState::NotIsolated)
    }

    pub fn outcome(&self) -> Option<Negotiation> {
        self.outcome.lock().clone()
    }

    pub fn negotiate(&self, page: &dyn PageContext) -> Negotiation {
        let mut outcome = self.outcome.lock();
        if let Some(done) = outcome.as_ref() {
            return done.clone();
        }

        let result = self.run(page);
        match &result {
            Negotiation::AlreadyIsolated => {
                tracing::info!(url = %page.url(), "Page is cross-origin isolated");
            }
            Negotiation::ReloadScheduled => {
                tracing::info!(url = %page.url(), "Isolation interceptor installed, reloading");
            }
            Negotiation::Unavailable(reason) => {
                tracing::warn!(url = %page.url(), %reason, "Cross-origin isolation unavailable");
            }
        }

        *outcome = Some(result.clone());
        result
    }

    fn run(&self, page: &dyn PageContext) -> Negotiation {
        if page.is_cross_origin_isolated() {
            page.set_reload_marker(false);
            return Negotiation::AlreadyIsolated;
        }

        if self.host == HostSupport::NativeHeaders {
            return Negotiation::Unavailable(UnavailableReason::HostMisconfigured);
        }

        if !page.is_secure_context() {
            return Negotiation::Unavailable(UnavailableReason::InsecureContext);
        }

        if page.reload_marker() {
            return Negotiation::Unavailable(UnavailableReason::ReloadDidNotIsolate);
        }

        let interceptor = match HeaderInterceptor::for_page(page.url(), self.embedder_policy) {
            Ok(interceptor) => interceptor,
            Err(e) => {
                return Negotiation::Unavailable(UnavailableReason::InterceptorRejected(
                    e.to_string(),
                ))
            }
        };
        if let Err(e) = page.register_interceptor(interceptor) {
            return Negotiation::Unavailable(UnavailableReason::InterceptorRejected(e.to_string()));
        }

        page.set_reload_marker(true);
        page.reload();
        Negotiation::ReloadScheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IsolationError;
    use std::cell::{Cell, RefCell};

    /// A browser tab: session storage and the interceptor survive reloads.
    struct Tab {
        url: Url,
        secure: bool,
        reject_registration: bool,
        interceptor: RefCell<Option<HeaderInterceptor>>,
        marker: Cell<bool>,
        reloads: Cell<u32>,
        registrations: Cell<u32>,
        // the interceptor only takes effect on the next document fetch
        isolated: Cell<bool>,
    }

    impl Tab {
        fn new(url: &str) -> Self {
            Self {
                url: Url::parse(url).unwrap(),
                secure: true,
                reject_registration: false,
                interceptor: RefCell::new(None),
                marker: Cell::new(false),
                reloads: Cell::new(0),
                registrations: Cell::new(0),
                isolated: Cell::new(false),
            }
        }
    }

    impl PageContext for Tab {
        fn url(&self) -> &Url {
            &self.url
        }

        fn is_cross_origin_isolated(&self) -> bool {
            self.isolated.get()
        }

        fn is_secure_context(&self) -> bool {
            self.secure
        }

        fn reload_marker(&self) -> bool {
            self.marker.get()
        }

        fn set_reload_marker(&self, value: bool) {
            self.marker.set(value);
        }

        fn register_interceptor(&self, interceptor: HeaderInterceptor) -> Result<()> {
            if self.reject_registration {
                return Err(IsolationError::Registration("blocked by policy".to_string()));
            }
            self.registrations.set(self.registrations.get() + 1);
            *self.interceptor.borrow_mut() = Some(interceptor);
            Ok(())
        }

        fn reload(&self) {
            self.reloads.set(self.reloads.get() + 1);
            let controlled = self
                .interceptor
                .borrow()
                .as_ref()
                .map(|i| i.controls(&self.url))
                .unwrap_or(false);
            self.isolated.set(controlled);
        }
    }

    #[test]
    fn test_fresh_load_reloads_once() {
        let tab = Tab::new("https://notes.example/app/index.html");

        // first load
        let first = Negotiator::new(HostSupport::NoCustomHeaders, EmbedderPolicy::RequireCorp);
        assert_eq!(first.negotiate(&tab), Negotiation::ReloadScheduled);
        assert_eq!(tab.reloads.get(), 1);
        assert_eq!(first.state(), IsolationState::NotIsolated);

        // reloaded document
        let second = Negotiator::new(HostSupport::NoCustomHeaders, EmbedderPolicy::RequireCorp);
        assert_eq!(second.negotiate(&tab), Negotiation::AlreadyIsolated);
        assert_eq!(second.state(), IsolationState::Isolated);
        assert_eq!(tab.reloads.get(), 1);
        assert_eq!(tab.registrations.get(), 1);
        assert!(!tab.marker.get());
    }

    #[test]
    fn test_repeat_invocation_is_noop() {
        let tab = Tab::new("https://notes.example/index.html");
        let negotiator = Negotiator::new(HostSupport::NoCustomHeaders, EmbedderPolicy::RequireCorp);

        assert_eq!(negotiator.negotiate(&tab), Negotiation::ReloadScheduled);
        assert_eq!(negotiator.negotiate(&tab), Negotiation::ReloadScheduled);
        assert_eq!(tab.reloads.get(), 1);
        assert_eq!(tab.registrations.get(), 1);
    }

    #[test]
    fn test_already_isolated_is_noop() {
        let tab = Tab::new("https://notes.example/index.html");
        tab.isolated.set(true);
        let negotiator = Negotiator::new(HostSupport::NativeHeaders, EmbedderPolicy::RequireCorp);

        assert_eq!(negotiator.negotiate(&tab), Negotiation::AlreadyIsolated);
        assert_eq!(negotiator.negotiate(&tab), Negotiation::AlreadyIsolated);
        assert_eq!(tab.reloads.get(), 0);
        assert_eq!(tab.registrations.get(), 0);
    }

    #[test]
    fn test_reload_that_did_not_isolate_stops() {
        let tab = Tab::new("https://notes.example/index.html");
        tab.marker.set(true);
        let negotiator = Negotiator::new(HostSupport::NoCustomHeaders, EmbedderPolicy::RequireCorp);

        assert_eq!(
            negotiator.negotiate(&tab),
            Negotiation::Unavailable(UnavailableReason::ReloadDidNotIsolate)
        );
        assert_eq!(tab.reloads.get(), 0);
    }

    #[test]
    fn test_registration_failure_degrades() {
        let mut tab = Tab::new("https://notes.example/index.html");
        tab.reject_registration = true;
        let negotiator = Negotiator::new(HostSupport::NoCustomHeaders, EmbedderPolicy::RequireCorp);

        let outcome = negotiator.negotiate(&tab);
        assert!(matches!(
            outcome,
            Negotiation::Unavailable(UnavailableReason::InterceptorRejected(_))
        ));
        assert_eq!(tab.reloads.get(), 0);
        assert!(!tab.marker.get());
    }

    #[test]
    fn test_insecure_and_misconfigured_hosts() {
        let mut tab = Tab::new("http://notes.example/index.html");
        tab.secure = false;
        let negotiator = Negotiator::new(HostSupport::NoCustomHeaders, EmbedderPolicy::RequireCorp);
        assert_eq!(
            negotiator.negotiate(&tab),
            Negotiation::Unavailable(UnavailableReason::InsecureContext)
        );

        let tab = Tab::new("https://notes.example/index.html");
        let negotiator = Negotiator::new(HostSupport::NativeHeaders, EmbedderPolicy::RequireCorp);
        assert_eq!(
            negotiator.negotiate(&tab),
            Negotiation::Unavailable(UnavailableReason::HostMisconfigured)
        );
        assert_eq!(tab.reloads.get(), 0);
    }
}
