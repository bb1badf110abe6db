//! Per-request pipeline stages, applied in a fixed order: authentication
//! resolves the caller identity, authorization consults the external
//! decision point, and only then does the route handler run. Each stage
//! short-circuits with its own status on failure.

pub mod authn;
pub mod authz;

pub use authn::authenticate;
pub use authz::authorize;
