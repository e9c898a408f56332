use belres::arango::{ArangoClient, ArangoError, DatabaseHandle, GraphStore};
use belres::conf::ArangoConfig;
use belres::index::IndexSpec;
use belres::provision::{
    bel_index_plan, ensure_indexes, verify_indexes, ProvisionError, BEL_DATABASE,
    EQUIVALENCE_NODES, ORTHOLOG_NODES,
};
use belres::utils::testing::ScriptedServer;
use serde_json::json;
use std::sync::Once;

static BYPASS_PROXY: Once = Once::new();

fn local_config(port: u16) -> ArangoConfig {
    // the scripted server is local, never route it through a proxy
    BYPASS_PROXY.call_once(|| std::env::set_var("NO_PROXY", "127.0.0.1"));
    ArangoConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ArangoConfig::default()
    }
}

fn config_for(server: &ScriptedServer) -> ArangoConfig {
    local_config(server.port())
}

async fn bel_server() -> ScriptedServer {
    let server = ScriptedServer::start().await.unwrap();
    server
        .respond(
            "GET",
            "/_api/version",
            200,
            json!({"server": "arango", "version": "3.11.5", "license": "community"}),
        )
        .respond(
            "GET",
            "/_db/bel/_api/database/current",
            200,
            json!({"error": false, "code": 200, "result": {"name": "bel", "id": "81", "isSystem": false}}),
        )
        .respond(
            "GET",
            "/_db/bel/_api/collection/ortholog_nodes",
            200,
            json!({"error": false, "code": 200, "id": "101", "name": "ortholog_nodes", "status": 3, "type": 2}),
        );
    server
}

async fn connect(server: &ScriptedServer) -> ArangoClient {
    ArangoClient::connect(&config_for(server)).await.unwrap()
}

fn not_found(error_num: i64, message: &str) -> serde_json::Value {
    json!({"error": true, "code": 404, "errorNum": error_num, "errorMessage": message})
}

fn created_index(id: &str, newly_created: bool) -> serde_json::Value {
    let code = if newly_created { 201 } else { 200 };
    json!({
        "fields": ["tax_id"],
        "id": id,
        "isNewlyCreated": newly_created,
        "name": "idx_1736",
        "sparse": true,
        "type": "persistent",
        "unique": false,
        "error": false,
        "code": code,
    })
}

#[tokio::test]
async fn test_connect_reads_version() {
    let server = bel_server().await;
    let client = connect(&server).await;

    let version = client.version().await.unwrap();
    assert_eq!(version.server, "arango");
    assert_eq!(version.version, "3.11.5");

    let requests = server.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/_api/version");
}

#[tokio::test]
async fn test_connect_unauthorized() {
    let server = ScriptedServer::start().await.unwrap();
    server.respond(
        "GET",
        "/_api/version",
        401,
        json!({"error": true, "code": 401, "errorNum": 11, "errorMessage": "not authorized to execute this request"}),
    );

    let result = ArangoClient::connect(&config_for(&server)).await;
    assert!(matches!(
        result,
        Err(ArangoError::Server { status: 401, error_num: 11, .. })
    ));
}

#[tokio::test]
async fn test_connection_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let result = ArangoClient::connect(&local_config(port)).await;
    assert!(matches!(result, Err(ArangoError::Connection(_))));
}

#[tokio::test]
async fn test_unknown_database() {
    let server = bel_server().await;
    server.respond(
        "GET",
        "/_db/nope/_api/database/current",
        404,
        not_found(1228, "database not found"),
    );
    let client = connect(&server).await;

    let result = client.use_database("nope").await;
    assert!(matches!(result, Err(ArangoError::DatabaseNotFound(ref name)) if name == "nope"));
}

#[tokio::test]
async fn test_select_database() {
    let server = bel_server().await;
    let client = connect(&server).await;

    let db = client.use_database(BEL_DATABASE).await.unwrap();
    assert_eq!(db.name(), "bel");

    let collection = db.collection(ORTHOLOG_NODES).await.unwrap();
    assert_eq!(collection.id, "101");
    assert_eq!(collection.name, ORTHOLOG_NODES);
}

#[tokio::test]
async fn test_unknown_collection() {
    let server = bel_server().await;
    server.respond(
        "GET",
        "/_db/bel/_api/collection/equivalence_nodes",
        404,
        not_found(1203, "collection or view not found"),
    );
    let client = connect(&server).await;
    let db = client.use_database(BEL_DATABASE).await.unwrap();

    match db.collection(EQUIVALENCE_NODES).await {
        Err(ArangoError::CollectionNotFound {
            database,
            collection,
        }) => {
            assert_eq!(database, "bel");
            assert_eq!(collection, EQUIVALENCE_NODES);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_collection_lookup_in_dropped_database() {
    let server = bel_server().await;
    server.respond(
        "GET",
        "/_db/bel/_api/collection/equivalence_nodes",
        404,
        not_found(1228, "database not found"),
    );
    let client = connect(&server).await;
    let db = client.use_database(BEL_DATABASE).await.unwrap();

    let result = db.collection(EQUIVALENCE_NODES).await;
    assert!(matches!(result, Err(ArangoError::DatabaseNotFound(ref name)) if name == "bel"));
}

#[tokio::test]
async fn test_unexpected_not_found() {
    let server = bel_server().await;
    server.respond(
        "GET",
        "/_db/bel/_api/collection/equivalence_nodes",
        404,
        json!({}),
    );
    let client = connect(&server).await;
    let db = client.use_database(BEL_DATABASE).await.unwrap();

    let result = db.collection(EQUIVALENCE_NODES).await;
    assert!(matches!(
        result,
        Err(ArangoError::Server { status: 404, error_num: 0, .. })
    ));
}

#[tokio::test]
async fn test_index_created() {
    let server = bel_server().await;
    server.respond(
        "POST",
        "/_db/bel/_api/index?collection=ortholog_nodes",
        201,
        created_index("ortholog_nodes/68", true),
    );
    let client = connect(&server).await;
    let db = client.use_database(BEL_DATABASE).await.unwrap();
    let collection = db.collection(ORTHOLOG_NODES).await.unwrap();

    let index = db
        .ensure_index(&collection, &IndexSpec::sparse_hash("tax_id"))
        .await
        .unwrap();
    assert_eq!(index.id, "ortholog_nodes/68");
    assert!(index.is_newly_created);

    let post = server
        .requests()
        .into_iter()
        .find(|request| request.method == "POST")
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&post.body).unwrap();
    assert_eq!(
        body,
        json!({"type": "hash", "fields": ["tax_id"], "sparse": true, "unique": false})
    );
}

#[tokio::test]
async fn test_index_already_present() {
    let server = bel_server().await;
    server.respond(
        "POST",
        "/_db/bel/_api/index?collection=ortholog_nodes",
        200,
        created_index("ortholog_nodes/68", false),
    );
    let client = connect(&server).await;
    let db = client.use_database(BEL_DATABASE).await.unwrap();
    let collection = db.collection(ORTHOLOG_NODES).await.unwrap();

    let index = db
        .ensure_index(&collection, &IndexSpec::sparse_hash("tax_id"))
        .await
        .unwrap();
    assert_eq!(index.id, "ortholog_nodes/68");
    assert!(!index.is_newly_created);
}

#[tokio::test]
async fn test_index_creation_rejected() {
    let server = bel_server().await;
    server.respond(
        "POST",
        "/_db/bel/_api/index?collection=ortholog_nodes",
        400,
        json!({"error": true, "code": 400, "errorNum": 10, "errorMessage": "bad parameter"}),
    );
    let client = connect(&server).await;
    let db = client.use_database(BEL_DATABASE).await.unwrap();
    let collection = db.collection(ORTHOLOG_NODES).await.unwrap();

    match db
        .ensure_index(&collection, &IndexSpec::sparse_hash("tax_id"))
        .await
    {
        Err(ArangoError::IndexCreation {
            collection,
            error_num,
            message,
        }) => {
            assert_eq!(collection, ORTHOLOG_NODES);
            assert_eq!(error_num, 10);
            assert_eq!(message, "bad parameter");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_ensure_indexes_stops_at_missing_collection() {
    let server = bel_server().await;
    server
        .respond(
            "POST",
            "/_db/bel/_api/index?collection=ortholog_nodes",
            201,
            created_index("ortholog_nodes/68", true),
        )
        .respond(
            "GET",
            "/_db/bel/_api/collection/equivalence_nodes",
            404,
            not_found(1203, "collection or view not found"),
        );
    let client = connect(&server).await;

    let result = ensure_indexes(&client, BEL_DATABASE, &bel_index_plan()).await;
    assert!(matches!(
        result,
        Err(ProvisionError::Arango(ArangoError::CollectionNotFound { ref collection, .. }))
            if collection == EQUIVALENCE_NODES
    ));

    let posts: Vec<String> = server
        .requests()
        .into_iter()
        .filter(|request| request.method == "POST")
        .map(|request| request.target)
        .collect();
    assert_eq!(posts, vec!["/_db/bel/_api/index?collection=ortholog_nodes"]);
}

#[tokio::test]
async fn test_verify_indexes_lists_indexes() {
    let server = bel_server().await;
    server
        .respond(
            "GET",
            "/_db/bel/_api/collection/equivalence_nodes",
            200,
            json!({"id": "102", "name": "equivalence_nodes"}),
        )
        .respond(
            "GET",
            "/_db/bel/_api/index?collection=ortholog_nodes",
            200,
            json!({
                "error": false,
                "code": 200,
                "indexes": [
                    {"id": "ortholog_nodes/0", "type": "primary", "fields": ["_key"], "sparse": false, "unique": true},
                    {"id": "ortholog_nodes/68", "type": "persistent", "fields": ["tax_id"], "sparse": true, "unique": false}
                ],
                "identifiers": {}
            }),
        )
        .respond(
            "GET",
            "/_db/bel/_api/index?collection=equivalence_nodes",
            200,
            json!({
                "error": false,
                "code": 200,
                "indexes": [
                    {"id": "equivalence_nodes/0", "type": "primary", "fields": ["_key"], "sparse": false, "unique": true},
                    {"id": "equivalence_nodes/71", "type": "persistent", "fields": ["namespace"], "sparse": true, "unique": true}
                ],
                "identifiers": {}
            }),
        );
    let client = connect(&server).await;

    let missing = verify_indexes(&client, BEL_DATABASE, &bel_index_plan())
        .await
        .unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].collection, EQUIVALENCE_NODES);
    assert!(server
        .requests()
        .iter()
        .all(|request| request.method == "GET"));
}
