//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (configured origins only)
//!
//! Merchant scoping is an extractor ([`MerchantStore`]) rather than a layer,
//! so public routes never see it.

pub mod merchant;
pub mod request_id;

pub use merchant::{MerchantStore, STORE_ID_HEADER};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
