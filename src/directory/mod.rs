use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;

const IDENTITY_OBJECT_TYPE: &str = "identity";
const USER_OBJECT_TYPE: &str = "user";
const TODO_OBJECT_TYPE: &str = "todo";

const IDENTIFIER_RELATION: &str = "identifier";
const OWNER_RELATION: &str = "owner";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("not found")]
    NotFound,
    #[error("invalid directory address: {0}")]
    Address(#[from] url::ParseError),
    #[error("directory request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A user object resolved from the directory: stable id, display name, and a
/// free-form property bag.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl UserRecord {
    /// Flattened JSON shape served to clients: the property bag with the
    /// object key and display name folded in.
    pub fn as_map(&self) -> Value {
        let mut map = self.properties.clone();
        map.insert("key".to_string(), Value::String(self.id.clone()));
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("name".to_string(), Value::String(self.display_name.clone()));
        Value::Object(map)
    }
}

/// External relationship/object store. Resolves token subjects to user
/// objects and records which user owns which to-do.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a token subject to its user object by following the
    /// `identity --identifier--> user` relation.
    async fn user_from_identity(&self, identity: &str) -> Result<UserRecord, DirectoryError>;

    /// Fetch a user object directly by its key.
    async fn get_user(&self, key: &str) -> Result<UserRecord, DirectoryError>;

    /// Record a `user --owner--> todo` relation.
    async fn record_ownership(&self, todo_id: &str, owner_id: &str)
        -> Result<(), DirectoryError>;

    /// Delete the todo object together with its relations.
    async fn remove_ownership(&self, todo_id: &str) -> Result<(), DirectoryError>;
}

/// REST client for the remote directory service.
pub struct RemoteDirectory {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
struct RelationResponse {
    #[serde(default)]
    results: Vec<Relation>,
}

#[derive(Debug, Deserialize)]
struct Relation {
    subject_id: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    result: DirectoryObject,
}

#[derive(Debug, Deserialize)]
struct DirectoryObject {
    id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl From<DirectoryObject> for UserRecord {
    fn from(obj: DirectoryObject) -> Self {
        UserRecord {
            id: obj.id,
            display_name: obj.display_name,
            properties: obj.properties,
        }
    }
}

impl RemoteDirectory {
    pub fn new(config: &UpstreamConfig, http: reqwest::Client) -> Result<Self, DirectoryError> {
        Ok(Self {
            http,
            base_url: Url::parse(&config.address)?,
            api_key: config.api_key.clone(),
            tenant_id: config.tenant_id.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut url = self.base_url.clone();
        url.set_path(path);
        let mut req = self.http.request(method, url);
        if !self.api_key.is_empty() {
            req = req.header("authorization", format!("basic {}", self.api_key));
        }
        if !self.tenant_id.is_empty() {
            req = req.header("x-tenant-id", &self.tenant_id);
        }
        req
    }

    async fn get_object(
        &self,
        object_type: &str,
        object_id: &str,
    ) -> Result<DirectoryObject, DirectoryError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/api/v3/directory/object/{object_type}/{object_id}"),
            )
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound);
        }

        let body: ObjectResponse = resp.error_for_status()?.json().await?;
        Ok(body.result)
    }
}

#[async_trait]
impl Directory for RemoteDirectory {
    async fn user_from_identity(&self, identity: &str) -> Result<UserRecord, DirectoryError> {
        let resp = self
            .request(reqwest::Method::GET, "/api/v3/directory/relation")
            .query(&[
                ("object_type", IDENTITY_OBJECT_TYPE),
                ("object_id", identity),
                ("relation", IDENTIFIER_RELATION),
                ("subject_type", USER_OBJECT_TYPE),
            ])
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound);
        }

        let body: RelationResponse = resp.error_for_status()?.json().await?;
        let relation = match body.results.first() {
            Some(relation) => relation,
            None => {
                tracing::debug!(identity, "no identifier relation for identity");
                return Err(DirectoryError::NotFound);
            }
        };

        let user = self.get_object(USER_OBJECT_TYPE, &relation.subject_id).await?;
        Ok(user.into())
    }

    async fn get_user(&self, key: &str) -> Result<UserRecord, DirectoryError> {
        let user = self.get_object(USER_OBJECT_TYPE, key).await?;
        Ok(user.into())
    }

    async fn record_ownership(
        &self,
        todo_id: &str,
        owner_id: &str,
    ) -> Result<(), DirectoryError> {
        self.request(reqwest::Method::POST, "/api/v3/directory/relation")
            .json(&json!({
                "object_type": TODO_OBJECT_TYPE,
                "object_id": todo_id,
                "relation": OWNER_RELATION,
                "subject_type": USER_OBJECT_TYPE,
                "subject_id": owner_id,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn remove_ownership(&self, todo_id: &str) -> Result<(), DirectoryError> {
        self.request(
            reqwest::Method::DELETE,
            &format!("/api/v3/directory/object/{TODO_OBJECT_TYPE}/{todo_id}"),
        )
        .query(&[("with_relations", "true")])
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }
}
