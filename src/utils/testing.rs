// Stand-ins for the database server used by the tests: an in-memory store
// behind the store traits, and a scripted HTTP server for the real client
use crate::arango::{ArangoError, CollectionInfo, DatabaseHandle, GraphStore};
use crate::index::{IndexInfo, IndexSpec};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TEST_CONFIG_FILE: &str = "tests/config.test.yaml";

fn primary_index(collection: &str) -> IndexInfo {
    IndexInfo {
        id: format!("{}/0", collection),
        name: "primary".to_string(),
        kind: "primary".to_string(),
        fields: vec!["_key".to_string()],
        sparse: false,
        unique: true,
        is_newly_created: false,
    }
}

#[derive(Debug)]
struct MemoryCollection {
    id: String,
    indexes: Vec<IndexInfo>,
    rejection: Option<(i64, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    databases: HashMap<String, HashMap<String, MemoryCollection>>,
    next_id: u64,
    created: usize,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Keeps databases, collections and indexes in a shared map. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_database(self, database: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .databases
            .entry(database.to_string())
            .or_default();
        self
    }

    pub fn with_collection(self, database: &str, collection: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id();
            state
                .databases
                .entry(database.to_string())
                .or_default()
                .entry(collection.to_string())
                .or_insert_with(|| MemoryCollection {
                    id: id.to_string(),
                    indexes: vec![primary_index(collection)],
                    rejection: None,
                });
        }
        self
    }

    /// Make every index request on the collection fail with the given server error.
    pub fn reject_indexes(
        self,
        database: &str,
        collection: &str,
        error_num: i64,
        message: &str,
    ) -> Self {
        if let Some(coll) = self
            .state
            .lock()
            .unwrap()
            .databases
            .get_mut(database)
            .and_then(|colls| colls.get_mut(collection))
        {
            coll.rejection = Some((error_num, message.to_string()));
        }
        self
    }

    /// Number of indexes created since the store was built.
    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created
    }

    /// Indexes of a collection, excluding the primary index every collection has.
    pub fn indexes_of(&self, database: &str, collection: &str) -> Vec<IndexInfo> {
        self.state
            .lock()
            .unwrap()
            .databases
            .get(database)
            .and_then(|colls| colls.get(collection))
            .map(|coll| {
                coll.indexes
                    .iter()
                    .filter(|index| index.kind != "primary")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryStore {
    type Database = MemoryDatabase;

    async fn use_database(&self, name: &str) -> Result<MemoryDatabase, ArangoError> {
        if !self.state.lock().unwrap().databases.contains_key(name) {
            return Err(ArangoError::DatabaseNotFound(name.to_string()));
        }
        Ok(MemoryDatabase {
            store: self.clone(),
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    store: MemoryStore,
    name: String,
}

impl MemoryDatabase {
    fn collection_not_found(&self, collection: &str) -> ArangoError {
        ArangoError::CollectionNotFound {
            database: self.name.clone(),
            collection: collection.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collection(&self, name: &str) -> Result<CollectionInfo, ArangoError> {
        let state = self.store.state.lock().unwrap();
        let coll = state
            .databases
            .get(&self.name)
            .ok_or_else(|| ArangoError::DatabaseNotFound(self.name.clone()))?
            .get(name)
            .ok_or_else(|| self.collection_not_found(name))?;
        Ok(CollectionInfo {
            id: coll.id.clone(),
            name: name.to_string(),
        })
    }

    async fn ensure_index(
        &self,
        collection: &CollectionInfo,
        spec: &IndexSpec,
    ) -> Result<IndexInfo, ArangoError> {
        let mut state = self.store.state.lock().unwrap();
        let id = state.next_id();
        let coll = state
            .databases
            .get_mut(&self.name)
            .and_then(|colls| colls.get_mut(&collection.name))
            .ok_or_else(|| self.collection_not_found(&collection.name))?;

        if let Some((error_num, message)) = &coll.rejection {
            return Err(ArangoError::IndexCreation {
                collection: collection.name.clone(),
                error_num: *error_num,
                message: message.clone(),
            });
        }

        if let Some(existing) = coll
            .indexes
            .iter()
            .find(|index| spec.is_satisfied_by(index) && index.kind == spec.kind.to_string())
        {
            return Ok(IndexInfo {
                is_newly_created: false,
                ..existing.clone()
            });
        }

        let index = IndexInfo {
            id: format!("{}/{}", collection.name, id),
            name: format!("idx_{}", id),
            kind: spec.kind.to_string(),
            fields: spec.fields.clone(),
            sparse: spec.sparse,
            unique: spec.unique,
            is_newly_created: true,
        };
        coll.indexes.push(IndexInfo {
            is_newly_created: false,
            ..index.clone()
        });
        state.created += 1;
        Ok(index)
    }

    async fn indexes(&self, collection: &CollectionInfo) -> Result<Vec<IndexInfo>, ArangoError> {
        let state = self.store.state.lock().unwrap();
        let coll = state
            .databases
            .get(&self.name)
            .and_then(|colls| colls.get(&collection.name))
            .ok_or_else(|| self.collection_not_found(&collection.name))?;
        Ok(coll.indexes.clone())
    }
}

/// A request received by a [`ScriptedServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string
    pub target: String,
    pub body: String,
}

#[derive(Debug, Clone)]
struct ScriptedRoute {
    method: String,
    target: String,
    status: u16,
    body: String,
}

/// HTTP server on a local port answering fixed responses per method and target.
/// Unknown requests get a 500. Every connection is closed after one response.
#[derive(Debug, Clone)]
pub struct ScriptedServer {
    port: u16,
    routes: Arc<Mutex<Vec<ScriptedRoute>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let server = ScriptedServer {
            port: listener.local_addr()?.port(),
            routes: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let handler = server.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = handler.answer(socket).await;
                });
            }
        });

        Ok(server)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn respond(
        &self,
        method: &str,
        target: &str,
        status: u16,
        body: serde_json::Value,
    ) -> &Self {
        self.routes.lock().unwrap().push(ScriptedRoute {
            method: method.to_string(),
            target: target.to_string(),
            status,
            body: body.to_string(),
        });
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn answer(&self, mut socket: TcpStream) -> std::io::Result<()> {
        let request = read_request(&mut socket).await?;

        let route = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|route| route.method == request.method && route.target == request.target)
            .cloned();
        self.requests.lock().unwrap().push(request);

        let (status, body) = match route {
            Some(route) => (route.status, route.body),
            None => (
                500,
                r#"{"error":true,"code":500,"errorNum":4,"errorMessage":"no route"}"#.to_string(),
            ),
        };
        let response = format!(
            "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await?;
        socket.shutdown().await
    }
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body_end = buffer.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    Ok(RecordedRequest {
        method,
        target,
        body,
    })
}
