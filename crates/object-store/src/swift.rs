//! Swift-style REST adapter for the object-storage port.
//!
//! Authentication goes through the v2 token endpoint: a password
//! login returns a token plus a service catalog, from which the
//! object-store public URL is discovered. Containers map 1:1 to
//! workspaces; access control is a read-modify-write of the
//! container permission headers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use common::models::{User, Workspace};
use common::storage::{StorageError, StorageProvider};

use crate::acl;
use crate::error::SwiftError;

const X_AUTH_TOKEN: &str = "X-Auth-Token";
const X_CONTAINER_READ: &str = "X-Container-Read";
const X_CONTAINER_WRITE: &str = "X-Container-Write";
const X_COPY_FROM: &str = "X-Copy-From";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwiftConfig {
    /// Token endpoint, e.g. `http://keystone:5000/v2.0/tokens`.
    pub auth_url: Url,
    pub username: String,
    pub password: String,
    pub tenant: String,
}

/// A logged-in view of the object store. `login` is called lazily on
/// first use and can be re-invoked to refresh an expired token.
/// Clones share the token.
#[derive(Debug, Clone)]
pub struct SwiftClient {
    config: SwiftConfig,
    http: reqwest::Client,
    session: Arc<RwLock<Option<Session>>>,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    storage_url: Url,
}

impl SwiftClient {
    pub fn new(config: SwiftConfig) -> Self {
        SwiftClient {
            config,
            http: reqwest::Client::new(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Authenticate and discover the object-store endpoint from the
    /// service catalog.
    pub async fn login(&self) -> Result<(), StorageError<SwiftError>> {
        let body = login_body(&self.config);
        let response = self
            .http
            .post(self.config.auth_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(SwiftError::from)?;
        check_status(response.status())?;

        let login: LoginResponse = response.json().await.map_err(SwiftError::from)?;
        let storage_url = login
            .access
            .service_catalog
            .iter()
            .find(|service| service.kind == "object-store")
            .and_then(|service| service.endpoints.first())
            .map(|endpoint| endpoint.public_url.clone())
            .ok_or(StorageError::EndpointNotFound)?;
        let storage_url = Url::parse(&storage_url).map_err(SwiftError::from)?;

        tracing::debug!("logged in against the object store at {}", storage_url);
        *self.session.write() = Some(Session {
            token: login.access.token.id,
            storage_url,
        });
        Ok(())
    }

    async fn session(&self) -> Result<Session, StorageError<SwiftError>> {
        if let Some(session) = self.session.read().clone() {
            return Ok(session);
        }
        self.login().await?;
        self.session
            .read()
            .clone()
            .ok_or(StorageError::Unauthorized)
    }

    fn container_url(
        &self,
        session: &Session,
        container: &str,
    ) -> Result<Url, StorageError<SwiftError>> {
        object_url(&session.storage_url, container, None)
    }

    /// Read the container's write-permission string. Read and write
    /// permissions are kept identical, so one header suffices.
    async fn permissions(
        &self,
        session: &Session,
        workspace: &Workspace,
    ) -> Result<String, StorageError<SwiftError>> {
        let url = self.container_url(session, &workspace.container)?;
        let response = self
            .http
            .head(url)
            .header(X_AUTH_TOKEN, &session.token)
            .send()
            .await
            .map_err(SwiftError::from)?;
        check_status(response.status())?;

        Ok(response
            .headers()
            .get(X_CONTAINER_WRITE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string())
    }

    async fn write_permissions(
        &self,
        session: &Session,
        workspace: &Workspace,
        permissions: &str,
    ) -> Result<(), StorageError<SwiftError>> {
        let url = self.container_url(session, &workspace.container)?;
        let response = self
            .http
            .put(url)
            .header(X_AUTH_TOKEN, &session.token)
            .header(X_CONTAINER_READ, permissions)
            .header(X_CONTAINER_WRITE, permissions)
            .send()
            .await
            .map_err(SwiftError::from)?;
        check_status(response.status())
    }

    fn acl_entry(&self, user: &User) -> String {
        format!("{}:{}", self.config.tenant, user.storage_account)
    }
}

#[async_trait]
impl StorageProvider for SwiftClient {
    type Error = SwiftError;

    async fn create_container(
        &self,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let session = self.session().await?;
        let url = self.container_url(&session, &workspace.container)?;
        let response = self
            .http
            .put(url)
            .header(X_AUTH_TOKEN, &session.token)
            .send()
            .await
            .map_err(SwiftError::from)?;
        check_status(response.status())?;
        tracing::info!("created container {}", workspace.container);
        Ok(())
    }

    async fn delete_container(
        &self,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let session = self.session().await?;
        let url = self.container_url(&session, &workspace.container)?;
        let response = self
            .http
            .delete(url)
            .header(X_AUTH_TOKEN, &session.token)
            .send()
            .await
            .map_err(SwiftError::from)?;
        check_status(response.status())?;
        tracing::info!("deleted container {}", workspace.container);
        Ok(())
    }

    async fn grant_access(
        &self,
        _granter: &User,
        grantee: &User,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let session = self.session().await?;
        let permissions = self.permissions(&session, workspace).await?;
        let entry = self.acl_entry(grantee);
        if acl::contains(&permissions, &entry) {
            return Ok(());
        }
        let updated = acl::grant(&permissions, &entry);
        self.write_permissions(&session, workspace, &updated).await
    }

    async fn revoke_access(
        &self,
        _granter: &User,
        grantee: &User,
        workspace: &Workspace,
    ) -> Result<(), StorageError<Self::Error>> {
        let session = self.session().await?;
        let permissions = self.permissions(&session, workspace).await?;
        let entry = self.acl_entry(grantee);
        if !acl::contains(&permissions, &entry) {
            return Ok(());
        }
        let updated = acl::revoke(&permissions, &entry);
        self.write_permissions(&session, workspace, &updated).await
    }

    async fn copy_chunk(
        &self,
        source: &Workspace,
        target: &Workspace,
        chunk_name: &str,
    ) -> Result<(), StorageError<Self::Error>> {
        let session = self.session().await?;
        let url = object_url(&session.storage_url, &target.container, Some(chunk_name))?;
        let response = self
            .http
            .put(url)
            .header(X_AUTH_TOKEN, &session.token)
            .header(
                X_COPY_FROM,
                format!("/{}/{}", source.container, chunk_name),
            )
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(SwiftError::from)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::ObjectNotFound(chunk_name.to_string()));
        }
        check_status(response.status())
    }
}

fn login_body(config: &SwiftConfig) -> serde_json::Value {
    serde_json::json!({
        "auth": {
            "passwordCredentials": {
                "username": config.username,
                "password": config.password,
            },
            "tenantName": config.tenant,
        }
    })
}

fn object_url(
    storage_url: &Url,
    container: &str,
    object: Option<&str>,
) -> Result<Url, StorageError<SwiftError>> {
    let mut url = storage_url.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| SwiftError::MalformedAuthResponse("storage url cannot be a base".into()))?;
        segments.pop_if_empty().push(container);
        if let Some(object) = object {
            segments.push(object);
        }
    }
    Ok(url)
}

fn check_status(status: StatusCode) -> Result<(), StorageError<SwiftError>> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(StorageError::Unauthorized);
    }
    if !status.is_success() {
        return Err(StorageError::UnexpectedStatus(status.as_u16()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog")]
    service_catalog: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(rename = "type")]
    kind: String,
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
}
