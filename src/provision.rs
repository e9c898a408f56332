//! Index provisioning for the BEL resource database.
//!
//! Indexes are requested one collection at a time, in plan order. The server
//! answers an index request with the existing index when an equivalent one is
//! already there, so running a plan twice leaves the database unchanged.
//! A failure stops the run; indexes created before it are kept.

use crate::arango::{ArangoError, DatabaseHandle, GraphStore};
use crate::index::{IndexInfo, IndexSpec};

use tracing::{info, instrument, warn};

pub const BEL_DATABASE: &str = "bel";
pub const ORTHOLOG_NODES: &str = "ortholog_nodes";
pub const EQUIVALENCE_NODES: &str = "equivalence_nodes";

#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("database name must not be empty")]
    EmptyDatabaseName,
    #[error("no indexes to provision")]
    EmptyPlan,
    #[error("database error")]
    Arango(#[from] ArangoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub collection: String,
    pub spec: IndexSpec,
}

impl IndexTarget {
    pub fn new(collection: &str, spec: IndexSpec) -> Self {
        IndexTarget {
            collection: collection.to_string(),
            spec,
        }
    }
}

/// Sparse hash indexes used by the ortholog and equivalence lookups.
pub fn bel_index_plan() -> Vec<IndexTarget> {
    vec![
        IndexTarget::new(ORTHOLOG_NODES, IndexSpec::sparse_hash("tax_id")),
        IndexTarget::new(EQUIVALENCE_NODES, IndexSpec::sparse_hash("namespace")),
    ]
}

#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub collection: String,
    pub index: IndexInfo,
}

impl IndexOutcome {
    pub fn created(&self) -> bool {
        self.index.is_newly_created
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub database: String,
    /// One entry per target, in plan order
    pub outcomes: Vec<IndexOutcome>,
}

impl ProvisionReport {
    pub fn created_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.created()).count()
    }

    pub fn existing_count(&self) -> usize {
        self.outcomes.len() - self.created_count()
    }

    pub fn index_ids(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.index.id.as_str()).collect()
    }
}

fn validate(database_name: &str, targets: &[IndexTarget]) -> Result<(), ProvisionError> {
    if database_name.trim().is_empty() {
        return Err(ProvisionError::EmptyDatabaseName);
    }
    if targets.is_empty() {
        return Err(ProvisionError::EmptyPlan);
    }
    Ok(())
}

/// Make sure every target index exists, creating the missing ones.
#[instrument(skip(store, targets), fields(targets = targets.len()), err)]
pub async fn ensure_indexes<S: GraphStore>(
    store: &S,
    database_name: &str,
    targets: &[IndexTarget],
) -> Result<ProvisionReport, ProvisionError> {
    validate(database_name, targets)?;

    let db = store.use_database(database_name).await?;

    let mut outcomes = Vec::with_capacity(targets.len());
    for target in targets {
        let collection = db.collection(&target.collection).await?;
        let index = db.ensure_index(&collection, &target.spec).await?;
        if index.is_newly_created {
            info!(
                "created index {} ({}) on {}",
                index.id, target.spec, collection.name
            );
        } else {
            info!(
                "index {} ({}) already present on {}",
                index.id, target.spec, collection.name
            );
        }
        outcomes.push(IndexOutcome {
            collection: collection.name,
            index,
        });
    }

    Ok(ProvisionReport {
        database: db.name().to_string(),
        outcomes,
    })
}

/// Return the targets without a matching index. Nothing is created.
#[instrument(skip(store, targets), fields(targets = targets.len()), err)]
pub async fn verify_indexes<S: GraphStore>(
    store: &S,
    database_name: &str,
    targets: &[IndexTarget],
) -> Result<Vec<IndexTarget>, ProvisionError> {
    validate(database_name, targets)?;

    let db = store.use_database(database_name).await?;

    let mut missing = Vec::new();
    for target in targets {
        let collection = db.collection(&target.collection).await?;
        let indexes = db.indexes(&collection).await?;
        if !indexes.iter().any(|index| target.spec.is_satisfied_by(index)) {
            warn!("missing index {} on {}", target.spec, collection.name);
            missing.push(target.clone());
        }
    }

    Ok(missing)
}
