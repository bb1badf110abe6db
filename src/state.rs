use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::authorizer::Authorizer;
use crate::config::Config;
use crate::directory::Directory;
use crate::store::Store;

/// Shared application state, threaded through the router. The directory and
/// authorizer sit behind trait objects so tests can substitute recording
/// fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    pub authorizer: Arc<dyn Authorizer>,
    pub directory: Arc<dyn Directory>,
    pub store: Store,
}
