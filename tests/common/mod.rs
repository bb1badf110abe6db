#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::routing::get;
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};
use tower::ServiceExt;

use todo_api::auth::{KeySetCache, TokenVerifier};
use todo_api::authorizer::{Authorizer, AuthorizerError};
use todo_api::config::Config;
use todo_api::directory::{Directory, DirectoryError, UserRecord};
use todo_api::state::AppState;
use todo_api::store::Store;

/// HS256 key set served by the stub JWKS endpoint; `k` is the base64url
/// form of [`SECRET`].
pub const JWKS_JSON: &str = r#"{"keys":[{"kty":"oct","alg":"HS256","kid":"test","k":"YS1zdHJpbmctc2VjcmV0LWF0LWxlYXN0LTI1Ni1iaXRzLWxvbmchIQ"}]}"#;
pub const SECRET: &[u8] = b"a-string-secret-at-least-256-bits-long!!";
pub const AUDIENCE: &str = "citadel-app";

/// Serve the static JWKS document on an ephemeral port and return its URL.
pub async fn serve_jwks() -> String {
    let router = Router::new().route(
        "/keys",
        get(|| async { ([(header::CONTENT_TYPE, "application/json")], JWKS_JSON) }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind jwks stub");
    let addr = listener.local_addr().expect("jwks stub addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("jwks stub serve");
    });

    format!("http://{addr}/keys")
}

/// Mint an HS256 token signed with `secret` for the stub key set.
pub fn mint_token_with(sub: &str, aud: &str, expires_in_secs: i64, secret: &[u8]) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64;

    let claims = serde_json::json!({
        "sub": sub,
        "aud": aud,
        "iat": now,
        "exp": now + expires_in_secs,
    });

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("test".to_string());
    encode(&header, &claims, &EncodingKey::from_secret(secret)).expect("token encodes")
}

/// A valid, unexpired token for `sub` with the configured audience.
pub fn mint_token(sub: &str) -> String {
    mint_token_with(sub, AUDIENCE, 3600, SECRET)
}

/// Recording fake for the external directory.
#[derive(Default)]
pub struct MockDirectory {
    users_by_identity: Mutex<HashMap<String, UserRecord>>,
    pub ownerships: Mutex<Vec<(String, String)>>,
    pub removed: Mutex<Vec<String>>,
    pub identity_lookups: Mutex<Vec<String>>,
    pub direct_lookups: Mutex<Vec<String>>,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, identity: &str, user_id: &str, name: &str) {
        let user = UserRecord {
            id: user_id.to_string(),
            display_name: name.to_string(),
            properties: Map::new(),
        };
        self.users_by_identity
            .lock()
            .unwrap()
            .insert(identity.to_string(), user);
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn user_from_identity(&self, identity: &str) -> Result<UserRecord, DirectoryError> {
        self.identity_lookups.lock().unwrap().push(identity.to_string());
        self.users_by_identity
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn get_user(&self, key: &str) -> Result<UserRecord, DirectoryError> {
        self.direct_lookups.lock().unwrap().push(key.to_string());
        self.users_by_identity
            .lock()
            .unwrap()
            .values()
            .find(|user| user.id == key)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn record_ownership(&self, todo_id: &str, owner_id: &str) -> Result<(), DirectoryError> {
        self.ownerships
            .lock()
            .unwrap()
            .push((todo_id.to_string(), owner_id.to_string()));
        Ok(())
    }

    async fn remove_ownership(&self, todo_id: &str) -> Result<(), DirectoryError> {
        self.removed.lock().unwrap().push(todo_id.to_string());
        Ok(())
    }
}

pub enum Decision {
    Allow,
    Deny,
    Fail,
}

/// Recording fake for the external authorizer; returns a fixed decision and
/// records every (policy path, resource context) it is asked about.
pub struct MockAuthorizer {
    decision: Decision,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl MockAuthorizer {
    pub fn allow() -> Arc<Self> {
        Arc::new(Self {
            decision: Decision::Allow,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn deny() -> Arc<Self> {
        Arc::new(Self {
            decision: Decision::Deny,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            decision: Decision::Fail,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn is_allowed(
        &self,
        _identity: &str,
        policy_path: &str,
        resource: Value,
    ) -> Result<bool, AuthorizerError> {
        self.calls
            .lock()
            .unwrap()
            .push((policy_path.to_string(), resource));
        match self.decision {
            Decision::Allow => Ok(true),
            Decision::Deny => Ok(false),
            Decision::Fail => Err(AuthorizerError::MissingDecision),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub directory: Arc<MockDirectory>,
    pub authorizer: Arc<MockAuthorizer>,
    pub store: Store,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call")
    }
}

/// Full application wired against an in-memory store, a stub JWKS server,
/// and the given directory/authorizer fakes.
pub async fn test_app(directory: Arc<MockDirectory>, authorizer: Arc<MockAuthorizer>) -> TestApp {
    let jwks_url = serve_jwks().await;

    let store = Store::in_memory().await.expect("in-memory store");

    let keyset = Arc::new(KeySetCache::new(
        jwks_url,
        Duration::from_secs(300),
        reqwest::Client::new(),
    ));
    let verifier = Arc::new(TokenVerifier::new(keyset, AUDIENCE));

    let state = AppState {
        config: Arc::new(Config::default()),
        verifier,
        authorizer: authorizer.clone(),
        directory: directory.clone(),
        store: store.clone(),
    };

    TestApp {
        router: todo_api::app(state),
        directory,
        authorizer,
        store,
    }
}

/// An app with the canonical fixture: subject "alice" resolving to user
/// "u1", and an authorizer that allows everything.
pub async fn default_app() -> TestApp {
    let directory = MockDirectory::new();
    directory.add_user("alice", "u1", "Alice");
    test_app(directory, MockAuthorizer::allow()).await
}

pub fn authed_get(path: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request builds")
}

pub fn authed_json(method: &str, path: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("body encodes")))
        .expect("request builds")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is JSON")
}
