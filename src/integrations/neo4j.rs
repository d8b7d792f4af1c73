//! Graph database integration with Neo4j

use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::{debug, info};

use super::{with_timeout, PathStore, Service};
use crate::config::Neo4jSettings;
use crate::graphrag::retrieval::RecallResult;
use crate::graphrag::Triple;
use crate::{Error, Result};

/// Graph store backed by Neo4j
///
/// Entities are `(:Entity {name})` nodes; every triple becomes a
/// `[:RELATES {name: predicate, inferred}]` relationship between them.
pub struct GraphStore {
    graph: Graph,
    timeout: Duration,
}

impl GraphStore {
    /// Connect to Neo4j server
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await?;

        Ok(Self {
            graph,
            timeout: Duration::from_secs(30),
        })
    }

    /// Connect using the `neo4j` config section
    pub async fn from_settings(settings: &Neo4jSettings) -> Result<Self> {
        if settings.password.is_empty() {
            return Err(Error::Config("NEO4J_PASSWORD not set".to_string()));
        }
        let connect = Self::new(&settings.uri, &settings.user, &settings.password);
        let mut store = with_timeout(Service::GraphStore, settings.timeout, connect).await?;
        store.timeout = settings.timeout;
        info!("Connected to Neo4j at {}", settings.uri);
        Ok(store)
    }

    /// Initialize schema with constraints and indexes
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing Neo4j schema...");

        let statements = [
            "CREATE CONSTRAINT entity_name IF NOT EXISTS FOR (e:Entity) REQUIRE e.name IS UNIQUE",
            "CREATE INDEX relates_name IF NOT EXISTS FOR ()-[r:RELATES]-() ON (r.name)",
        ];

        for statement in statements {
            self.graph.run(query(statement)).await?;
        }

        info!("Schema initialized successfully");
        Ok(())
    }

    /// Remove every entity and its relationships
    pub async fn clear(&self) -> Result<()> {
        self.graph
            .run(query("MATCH (e:Entity) DETACH DELETE e"))
            .await?;
        info!("Cleared all Entity nodes");
        Ok(())
    }

    /// Create or update one triple
    pub async fn upsert_triple(&self, triple: &Triple) -> Result<()> {
        let q = query(
            "MERGE (s:Entity {name: $subject})
             MERGE (o:Entity {name: $object})
             MERGE (s)-[r:RELATES {name: $predicate}]->(o)
             SET r.inferred = $inferred",
        )
        .param("subject", triple.subject.clone())
        .param("object", triple.object.clone())
        .param("predicate", triple.predicate.clone())
        .param("inferred", triple.inferred);

        with_timeout(Service::GraphStore, self.timeout, async {
            self.graph.run(q).await.map_err(Error::from)
        })
        .await?;
        debug!(
            "Upserted triple: {} -[{}]-> {}",
            triple.subject, triple.predicate, triple.object
        );
        Ok(())
    }

    /// Bulk upsert triples
    pub async fn import_triples(&self, triples: &[Triple]) -> Result<usize> {
        let mut count = 0;
        for triple in triples {
            self.upsert_triple(triple).await?;
            count += 1;
        }
        info!("Upserted {} triples to Neo4j", count);
        Ok(count)
    }

    /// Get graph statistics
    pub async fn stats(&self) -> Result<GraphStats> {
        let counts = query(
            "MATCH (e:Entity) WITH count(e) AS entities
             OPTIONAL MATCH (:Entity)-[r]->(:Entity)
             RETURN entities, count(r) AS relations",
        );

        let mut result = self.graph.execute(counts).await?;

        if let Some(row) = result.next().await? {
            return Ok(GraphStats {
                entity_count: row.get::<i64>("entities").unwrap_or(0) as u64,
                relation_count: row.get::<i64>("relations").unwrap_or(0) as u64,
            });
        }

        Ok(GraphStats::default())
    }

    async fn fetch_paths(&self, names: &[String], max_hops: usize) -> Result<Vec<RecallResult>> {
        let q = query(&path_query(max_hops)).param("names", names.to_vec());

        let mut result = self.graph.execute(q).await?;
        let mut paths = Vec::new();

        while let Some(row) = result.next().await? {
            let rel_chain: Vec<String> = row.get("rel_chain").unwrap_or_default();
            let node_names: Vec<String> = row.get("node_names").unwrap_or_default();
            if let Some(path) = RecallResult::from_path(node_names, rel_chain) {
                paths.push(path);
            }
        }

        Ok(paths)
    }
}

#[async_trait]
impl PathStore for GraphStore {
    async fn paths(&self, names: &[String], max_hops: usize) -> Result<Vec<RecallResult>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        with_timeout(
            Service::GraphStore,
            self.timeout,
            self.fetch_paths(names, max_hops),
        )
        .await
    }
}

/// Multi-hop traversal query.
///
/// Variable-length bounds cannot be parameters, so `max_hops` is formatted in;
/// it is a validated integer, never user text.
pub fn path_query(max_hops: usize) -> String {
    let max_hops = max_hops.max(1);
    format!(
        "WITH $names AS name_list
         MATCH (n:Entity) WHERE n.name IN name_list
         WITH collect(n) AS query_nodes
         UNWIND query_nodes AS start_node
         MATCH path = (start_node)-[*1..{max_hops}]-(end:Entity)
         WHERE start_node <> end
         RETURN DISTINCT start_node.name AS head,
                [r IN relationships(path) | coalesce(r.name, type(r))] AS rel_chain,
                end.name AS tail,
                length(path) AS hop_count,
                [x IN nodes(path) | x.name] AS node_names
         ORDER BY hop_count ASC, head ASC"
    )
}

/// Graph statistics
#[derive(Debug, Default)]
pub struct GraphStats {
    pub entity_count: u64,
    pub relation_count: u64,
}
