use crate::conf::ArangoConfig;
use crate::index::{IndexInfo, IndexSpec};

use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

/// Server error numbers we react to.
pub const ERROR_DATA_SOURCE_NOT_FOUND: i64 = 1203;
pub const ERROR_DATABASE_NOT_FOUND: i64 = 1228;

#[derive(thiserror::Error, Debug)]
pub enum ArangoError {
    #[error("failed to reach the database server")]
    Connection(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error("database {0} not found")]
    DatabaseNotFound(String),
    #[error("collection {collection} not found in database {database}")]
    CollectionNotFound {
        database: String,
        collection: String,
    },
    #[error("failed to create index on {collection}: {message} (error {error_num})")]
    IndexCreation {
        collection: String,
        error_num: i64,
        message: String,
    },
    #[error("unexpected response from server ({status}): {message} (error {error_num})")]
    Server {
        status: u16,
        error_num: i64,
        message: String,
    },
    #[error("could not parse server response")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Error body returned by the server on failed requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub error_num: i64,
    #[serde(default)]
    pub error_message: String,
}

impl ServerError {
    fn parse(status: StatusCode, body: &str) -> Self {
        let mut error: ServerError = serde_json::from_str(body).unwrap_or_default();
        if error.code == 0 {
            error.code = status.as_u16();
        }
        if error.error_message.is_empty() {
            error.error_message = status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string();
        }
        error
    }

    fn into_arango_error(self) -> ArangoError {
        ArangoError::Server {
            status: self.code,
            error_num: self.error_num,
            message: self.error_message,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerVersion {
    pub server: String,
    pub version: String,
}

/// A collection as resolved in a selected database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct CurrentDatabase {
    result: DatabaseProperties,
}

#[derive(Debug, Deserialize)]
struct DatabaseProperties {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    indexes: Vec<IndexInfo>,
}

/// A server holding several databases.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    type Database: DatabaseHandle;
    async fn use_database(&self, name: &str) -> Result<Self::Database, ArangoError>;
}

/// A database selected on a [`GraphStore`]. Every call is scoped to it.
#[async_trait::async_trait]
pub trait DatabaseHandle: Send + Sync {
    fn name(&self) -> &str;
    async fn collection(&self, name: &str) -> Result<CollectionInfo, ArangoError>;
    async fn ensure_index(
        &self,
        collection: &CollectionInfo,
        spec: &IndexSpec,
    ) -> Result<IndexInfo, ArangoError>;
    async fn indexes(&self, collection: &CollectionInfo) -> Result<Vec<IndexInfo>, ArangoError>;
}

#[derive(Debug, Clone)]
pub struct ArangoClient {
    client: reqwest::Client,
    base_url: Url,
    username: String,
    password: Option<String>,
}

impl ArangoClient {
    pub fn new(config: &ArangoConfig) -> Result<Self, ArangoError> {
        let base_url = Url::parse(&config.url())
            .map_err(|e| ArangoError::InvalidUrl(format!("{}: {}", config.url(), e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ArangoError::InvalidUrl(config.url()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(ArangoClient {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Build a client and check that the server answers.
    #[instrument(skip_all, fields(url = %config.url()), err)]
    pub async fn connect(config: &ArangoConfig) -> Result<Self, ArangoError> {
        let client = ArangoClient::new(config)?;
        let version = client.version().await?;
        info!(
            "connected to {} {} at {}",
            version.server,
            version.version,
            config.url()
        );
        Ok(client)
    }

    fn endpoint(&self, database: Option<&str>, segments: &[&str]) -> Result<Url, ArangoError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ArangoError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            if let Some(database) = database {
                path.push("_db").push(database);
            }
            path.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, self.password.as_ref())
    }

    #[instrument(skip(self), err)]
    pub async fn version(&self) -> Result<ServerVersion, ArangoError> {
        let url = self.endpoint(None, &["_api", "version"])?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        match response.status() {
            status if status.is_success() => parse_body(response).await,
            _ => Err(read_error(response).await.into_arango_error()),
        }
    }

    /// Select a database. Fails when the server does not know it.
    #[instrument(skip(self), err)]
    pub async fn database(&self, name: &str) -> Result<ArangoDatabase, ArangoError> {
        let url = self.endpoint(Some(name), &["_api", "database", "current"])?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        match response.status() {
            status if status.is_success() => {
                let current: CurrentDatabase = parse_body(response).await?;
                debug!("using database {}", current.result.name);
                Ok(ArangoDatabase {
                    client: self.clone(),
                    name: current.result.name,
                })
            }
            StatusCode::NOT_FOUND => Err(ArangoError::DatabaseNotFound(name.to_string())),
            _ => Err(read_error(response).await.into_arango_error()),
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for ArangoClient {
    type Database = ArangoDatabase;

    async fn use_database(&self, name: &str) -> Result<ArangoDatabase, ArangoError> {
        self.database(name).await
    }
}

#[derive(Debug, Clone)]
pub struct ArangoDatabase {
    client: ArangoClient,
    name: String,
}

impl ArangoDatabase {
    fn not_found(&self, error: ServerError, collection: &str) -> ArangoError {
        match error.error_num {
            ERROR_DATABASE_NOT_FOUND => ArangoError::DatabaseNotFound(self.name.clone()),
            ERROR_DATA_SOURCE_NOT_FOUND => ArangoError::CollectionNotFound {
                database: self.name.clone(),
                collection: collection.to_string(),
            },
            _ => error.into_arango_error(),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseHandle for ArangoDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(database = %self.name), err)]
    async fn collection(&self, name: &str) -> Result<CollectionInfo, ArangoError> {
        let url = self
            .client
            .endpoint(Some(&self.name), &["_api", "collection", name])?;
        let response = self.client.request(reqwest::Method::GET, url).send().await?;
        match response.status() {
            status if status.is_success() => parse_body(response).await,
            StatusCode::NOT_FOUND => {
                let error = read_error(response).await;
                Err(self.not_found(error, name))
            }
            _ => Err(read_error(response).await.into_arango_error()),
        }
    }

    #[instrument(
        skip(self, collection, spec),
        fields(database = %self.name, collection = %collection.name, spec = %spec),
        err
    )]
    async fn ensure_index(
        &self,
        collection: &CollectionInfo,
        spec: &IndexSpec,
    ) -> Result<IndexInfo, ArangoError> {
        let url = self.client.endpoint(Some(&self.name), &["_api", "index"])?;
        let response = self
            .client
            .request(reqwest::Method::POST, url)
            .query(&[("collection", collection.name.as_str())])
            .json(spec)
            .send()
            .await?;
        match response.status() {
            // 200 when an equivalent index exists, 201 when it was created
            StatusCode::OK | StatusCode::CREATED => parse_body(response).await,
            StatusCode::NOT_FOUND => {
                let error = read_error(response).await;
                Err(self.not_found(error, &collection.name))
            }
            _ => {
                let error = read_error(response).await;
                Err(ArangoError::IndexCreation {
                    collection: collection.name.clone(),
                    error_num: error.error_num,
                    message: error.error_message,
                })
            }
        }
    }

    #[instrument(skip(self, collection), fields(database = %self.name, collection = %collection.name), err)]
    async fn indexes(&self, collection: &CollectionInfo) -> Result<Vec<IndexInfo>, ArangoError> {
        let url = self.client.endpoint(Some(&self.name), &["_api", "index"])?;
        let response = self
            .client
            .request(reqwest::Method::GET, url)
            .query(&[("collection", collection.name.as_str())])
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => {
                let list: IndexList = parse_body(response).await?;
                Ok(list.indexes)
            }
            StatusCode::NOT_FOUND => {
                let error = read_error(response).await;
                Err(self.not_found(error, &collection.name))
            }
            _ => Err(read_error(response).await.into_arango_error()),
        }
    }
}

async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T, ArangoError> {
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

async fn read_error(response: Response) -> ServerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ServerError::parse(status, &body)
}
