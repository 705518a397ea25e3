//! URL handling module for Kage-Recon
//!
//! This module provides reference normalization against a document base,
//! target URL construction, and domain validation.

mod domain;
mod normalize;

pub use domain::{extract_domain, parse_domain_list, validate_domain};
pub use normalize::{normalize, strip_scheme, target_url};
