//! Crawler module for protected-target retrieval and classification
//!
//! This module contains the reconnaissance pipeline:
//! - Protection probing and transport selection
//! - Fetch strategies with retry, escalation and identity rotation
//! - HTML classification into a typed resource inventory
//! - Per-domain orchestration with failure isolation

mod circuit;
mod classifier;
mod coordinator;
mod detector;
mod fetcher;
mod identity;
mod resource;
mod retry;

pub use circuit::{CircuitError, IdentityRotator, TorCircuit};
pub use classifier::{
    ClassifierEvent, EventLevel, HtmlClassifier, InventorySummary, ParseError, ResourceInventory,
    Section,
};
pub use coordinator::{CrawlOrchestrator, CrawlSummary, RunOutcome, Transports, UnresolvedDomain};
pub use detector::{classify_response, mitigation_vendor, Protection, ProtectionDetector, ProtectionProbe};
pub use fetcher::{
    build_http_client, ChallengeSolverFetch, DirectFetch, FetchError, FetchErrorKind,
    FetchStrategy, FetchedDocument, Fetcher, ProxiedFetch,
};
pub use identity::{IdentityPool, DEFAULT_IDENTITY};
pub use resource::{
    DiscoveredResource, FormDescriptor, FormInput, ImageDescriptor, LinkDescriptor, LinkKind,
    MetaTag, ResourceKind, ScriptDescriptor, StyleDescriptor,
};
pub use retry::{FetchOutcome, RetryPolicy, RetryScheduler};
