//! Minimal client for a Confluent-compatible schema registry.
//!
//! Each schema id gets its own [`SchemaRegistry`] holding the schema and
//! everything it references, fetched once and cached.

use std::collections::HashMap;

use anyhow::{Context, Result};
use dynaproto::SchemaRegistry;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

/// File name the schema behind a schema id is registered under.
pub const MAIN_SCHEMA: &str = "__main__.proto";

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaResponse {
    pub schema: String,
    #[serde(default)]
    pub references: Vec<SchemaReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaReference {
    pub name: String,
    pub subject: String,
    pub version: i64,
}

/// Where schema text and its references are fetched from.
pub trait SchemaSource {
    fn schema_by_id(&self, schema_id: u32) -> Result<SchemaResponse>;

    fn schema_by_version(&self, subject: &str, version: i64) -> Result<SchemaResponse>;
}

/// [`SchemaSource`] backed by the registry's REST API.
pub struct HttpSchemaSource {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl HttpSchemaSource {
    pub fn new(base_url: &str, insecure: bool) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()
            .context("building HTTP client")?;

        Ok(HttpSchemaSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "fetching schema");
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;

        response
            .json()
            .with_context(|| format!("decoding response from {url}"))
    }
}

impl SchemaSource for HttpSchemaSource {
    fn schema_by_id(&self, schema_id: u32) -> Result<SchemaResponse> {
        self.get_json(&format!("{}/schemas/ids/{schema_id}", self.base_url))
    }

    fn schema_by_version(&self, subject: &str, version: i64) -> Result<SchemaResponse> {
        self.get_json(&format!(
            "{}/subjects/{subject}/versions/{version}",
            self.base_url
        ))
    }
}

pub struct SchemaRegistryClient<S> {
    source: S,
    cache: HashMap<u32, SchemaRegistry>,
}

impl<S: SchemaSource> SchemaRegistryClient<S> {
    pub fn new(source: S) -> Self {
        SchemaRegistryClient {
            source,
            cache: HashMap::new(),
        }
    }

    /// Registry holding the schema for `schema_id`, fetching it on first use.
    pub fn registry_for_id(&mut self, schema_id: u32) -> Result<&SchemaRegistry> {
        if !self.cache.contains_key(&schema_id) {
            let registry = self.fetch_registry(schema_id)?;
            self.cache.insert(schema_id, registry);
        }
        Ok(&self.cache[&schema_id])
    }

    fn fetch_registry(&self, schema_id: u32) -> Result<SchemaRegistry> {
        let response = self.source.schema_by_id(schema_id)?;

        let mut registry = SchemaRegistry::new();
        for reference in &response.references {
            self.add_reference(&mut registry, reference)?;
        }
        registry
            .add_schema(MAIN_SCHEMA, &response.schema)
            .with_context(|| format!("registering schema id {schema_id}"))?;

        info!(schema_id, types = registry.type_names().count(), "loaded schema");
        Ok(registry)
    }

    fn add_reference(&self, registry: &mut SchemaRegistry, reference: &SchemaReference) -> Result<()> {
        // Shared imports show up once per referrer.
        if registry.find_file(&reference.name).is_ok() {
            return Ok(());
        }

        let response = self
            .source
            .schema_by_version(&reference.subject, reference.version)?;
        for nested in &response.references {
            self.add_reference(registry, nested)?;
        }

        registry
            .add_schema(&reference.name, &response.schema)
            .with_context(|| {
                format!(
                    "registering '{}' ({} v{})",
                    reference.name, reference.subject, reference.version
                )
            })?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use anyhow::anyhow;

    use super::*;

    /// In-memory schema source that records every fetch.
    #[derive(Default)]
    pub(crate) struct StaticSource {
        by_id: HashMap<u32, SchemaResponse>,
        by_version: HashMap<(String, i64), SchemaResponse>,
        pub(crate) fetches: RefCell<Vec<String>>,
    }

    impl StaticSource {
        pub(crate) fn with_id(mut self, schema_id: u32, schema: &str, references: &[(&str, &str)]) -> Self {
            self.by_id.insert(schema_id, response(schema, references));
            self
        }

        pub(crate) fn with_subject(mut self, subject: &str, schema: &str, references: &[(&str, &str)]) -> Self {
            self.by_version
                .insert((subject.to_string(), 1), response(schema, references));
            self
        }
    }

    // References are (file name, subject) pairs, always version 1.
    fn response(schema: &str, references: &[(&str, &str)]) -> SchemaResponse {
        SchemaResponse {
            schema: schema.to_string(),
            references: references
                .iter()
                .map(|(name, subject)| SchemaReference {
                    name: name.to_string(),
                    subject: subject.to_string(),
                    version: 1,
                })
                .collect(),
        }
    }

    impl SchemaSource for StaticSource {
        fn schema_by_id(&self, schema_id: u32) -> Result<SchemaResponse> {
            self.fetches.borrow_mut().push(format!("id:{schema_id}"));
            self.by_id
                .get(&schema_id)
                .cloned()
                .ok_or_else(|| anyhow!("no schema with id {schema_id}"))
        }

        fn schema_by_version(&self, subject: &str, version: i64) -> Result<SchemaResponse> {
            self.fetches.borrow_mut().push(format!("{subject}/{version}"));
            self.by_version
                .get(&(subject.to_string(), version))
                .cloned()
                .ok_or_else(|| anyhow!("no subject {subject} v{version}"))
        }
    }

    fn diamond() -> StaticSource {
        StaticSource::default()
            .with_subject(
                "money",
                "syntax = \"proto3\"; package shared; message Money { int64 units = 1; }",
                &[],
            )
            .with_subject(
                "order",
                "syntax = \"proto3\"; import \"money.proto\"; message Order { shared.Money total = 1; }",
                &[("money.proto", "money")],
            )
            .with_subject(
                "refund",
                "syntax = \"proto3\"; import \"money.proto\"; message Refund { shared.Money amount = 1; }",
                &[("money.proto", "money")],
            )
            .with_id(
                1,
                r#"syntax = "proto3";
                import "order.proto";
                import "refund.proto";
                message Ledger { Order order = 1; Refund refund = 2; }"#,
                &[("order.proto", "order"), ("refund.proto", "refund")],
            )
    }

    #[test]
    fn shared_references_are_registered_once_before_their_referrers() {
        let mut client = SchemaRegistryClient::new(diamond());
        let registry = client.registry_for_id(1).expect("schema should load");

        assert_eq!(
            registry.file_names().collect::<Vec<_>>(),
            vec!["money.proto", "order.proto", "refund.proto", MAIN_SCHEMA]
        );
        assert!(registry.contains_type("Ledger"));
        assert!(registry.contains_type("shared.Money"));

        assert_eq!(
            *client.source.fetches.borrow(),
            vec!["id:1", "order/1", "money/1", "refund/1"]
        );
    }

    #[test]
    fn registries_are_cached_per_schema_id() {
        let mut client = SchemaRegistryClient::new(diamond());
        client.registry_for_id(1).expect("first load");
        client.registry_for_id(1).expect("cached load");

        let id_fetches = client
            .source
            .fetches
            .borrow()
            .iter()
            .filter(|fetch| fetch.starts_with("id:"))
            .count();
        assert_eq!(id_fetches, 1);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let mut client = SchemaRegistryClient::new(diamond());
        assert!(client.registry_for_id(2).is_err());
        assert!(client.registry_for_id(2).is_err());
        assert_eq!(*client.source.fetches.borrow(), vec!["id:2", "id:2"]);
    }
}
