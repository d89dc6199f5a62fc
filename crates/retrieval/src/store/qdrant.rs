//! Qdrant-backed vector store.
//!
//! Collections are created with a single unnamed multi-vector field compared
//! by MaxSim. Point ids are the numeric page identities; the identity is also
//! kept as an indexed integer payload field so the highest one can be read
//! back with an ordered scroll.

use super::{check_entries, VectorStore};
use crate::types::{
    CollectionConfig, Distance, EntryPayload, IndexEntry, MultiVector, PageId,
    ScalarQuantization, SearchResult,
};
use docseek_core::config::StoreSettings;
use docseek_core::{AppError, AppResult};
use qdrant_client::qdrant::{
    self, point_id::PointIdOptions, quantization_config::Quantization, vectors_config,
    CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Direction,
    FieldType, Memory, MultiVectorComparator, MultiVectorConfigBuilder, OrderByBuilder,
    PayloadStorageParamsBuilder, PointId, PointStruct, QuantizationType, Query,
    QueryPointsBuilder, ScalarQuantizationBuilder, ScrollPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, Vector, VectorInput, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Integer payload field mirroring the point id.
const IDENTITY_KEY: &str = "identity";

/// Vector store talking to a Qdrant server over gRPC.
pub struct QdrantStore {
    client: Qdrant,
    /// Layouts seen through this client, used to validate upserts locally
    layouts: RwLock<HashMap<String, CollectionConfig>>,
}

impl QdrantStore {
    /// Build a client; no connection is made until the first call.
    pub fn new(settings: &StoreSettings, timeout: Duration) -> AppResult<Self> {
        let mut builder = Qdrant::from_url(&settings.url)
            .timeout(timeout)
            .skip_compatibility_check();

        if let Some(api_key) = &settings.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            layouts: RwLock::new(HashMap::new()),
        })
    }

    async fn layout(&self, name: &str) -> AppResult<CollectionConfig> {
        let cached = self.layouts.read().await.get(name).cloned();
        match cached {
            Some(config) => Ok(config),
            None => self.collection_config(name).await?.ok_or_else(|| {
                AppError::NotReady(format!("Collection '{}' does not exist", name))
            }),
        }
    }
}

fn store_error(context: &str, err: QdrantError) -> AppError {
    let message = err.to_string();
    if message.contains("Not found") || message.contains("doesn't exist") {
        AppError::NotReady(format!("{}: {}", context, message))
    } else {
        AppError::StoreUnavailable(format!("{}: {}", context, message))
    }
}

fn to_qdrant_distance(distance: Distance) -> qdrant::Distance {
    match distance {
        Distance::Cosine => qdrant::Distance::Cosine,
        Distance::Dot => qdrant::Distance::Dot,
        Distance::Euclid => qdrant::Distance::Euclid,
    }
}

fn from_qdrant_distance(distance: qdrant::Distance) -> AppResult<Distance> {
    match distance {
        qdrant::Distance::Cosine => Ok(Distance::Cosine),
        qdrant::Distance::Dot => Ok(Distance::Dot),
        qdrant::Distance::Euclid => Ok(Distance::Euclid),
        other => Err(AppError::Config(format!(
            "Unsupported collection distance: {:?}",
            other
        ))),
    }
}

fn payload_to_qdrant(payload: &EntryPayload) -> HashMap<String, QdrantValue> {
    let mut map = HashMap::new();
    map.insert(
        "source_filename".to_string(),
        QdrantValue::from(payload.source_filename.clone()),
    );
    map.insert("source".to_string(), QdrantValue::from(payload.source.clone()));
    if let Some(page_number) = payload.page_number {
        map.insert("page_number".to_string(), QdrantValue::from(page_number as i64));
    }
    if let Some(text) = &payload.extracted_text {
        map.insert("extracted_text".to_string(), QdrantValue::from(text.clone()));
    }
    map
}

fn payload_from_qdrant(payload: &HashMap<String, QdrantValue>) -> Option<EntryPayload> {
    use qdrant::value::Kind;

    let string = |key: &str| match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    };

    let page_number = match payload.get("page_number").and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => u32::try_from(*n).ok(),
        _ => None,
    };

    Some(EntryPayload {
        source_filename: string("source_filename")?,
        page_number,
        extracted_text: string("extracted_text"),
        source: string("source").unwrap_or_default(),
    })
}

fn point_from_entry(entry: IndexEntry) -> PointStruct {
    let mut payload = payload_to_qdrant(&entry.payload);
    payload.insert(
        IDENTITY_KEY.to_string(),
        QdrantValue::from(entry.identity.0 as i64),
    );
    PointStruct::new(
        entry.identity.0,
        Vector::new_multi(entry.vectors.into_vectors()),
        payload,
    )
}

fn point_identity(id: Option<PointId>) -> AppResult<PageId> {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(n)) => Ok(PageId(n)),
        other => Err(AppError::NotFound(format!(
            "Point has no numeric id: {:?}",
            other
        ))),
    }
}

fn scalar_quantization(quantization: &ScalarQuantization) -> ScalarQuantizationBuilder {
    let builder = ScalarQuantizationBuilder::default()
        .r#type(QuantizationType::Int8.into())
        .quantile(quantization.quantile);
    if quantization.always_ram {
        builder.memory(Memory::Pinned)
    } else {
        builder
    }
}

fn quantization_from(scalar: &qdrant::ScalarQuantization) -> ScalarQuantization {
    ScalarQuantization {
        bits: if scalar.r#type == QuantizationType::Int8 as i32 { 8 } else { 0 },
        quantile: scalar.quantile.unwrap_or(0.99),
        always_ram: scalar.memory == Some(Memory::Pinned as i32),
    }
}

fn payload_on_disk(params: &qdrant::CollectionParams) -> bool {
    params.payload.as_ref().and_then(|p| p.memory) == Some(Memory::Cold as i32)
}

fn config_from_info(info: &qdrant::CollectionInfo) -> AppResult<CollectionConfig> {
    let config = info
        .config
        .as_ref()
        .ok_or_else(|| AppError::StoreUnavailable("Collection info missing config".to_string()))?;

    let params = config
        .params
        .as_ref()
        .ok_or_else(|| AppError::StoreUnavailable("Collection info missing params".to_string()))?;

    let vector_params = match params.vectors_config.as_ref().and_then(|vc| vc.config.as_ref()) {
        Some(vectors_config::Config::Params(p)) => p,
        _ => {
            return Err(AppError::Config(
                "Collection does not use a single unnamed vector field".to_string(),
            ))
        }
    };

    if vector_params.multivector_config.is_none() {
        return Err(AppError::Config(
            "Collection is not configured for multi-vectors".to_string(),
        ));
    }

    let quantization = match config
        .quantization_config
        .as_ref()
        .and_then(|q| q.quantization.as_ref())
    {
        Some(Quantization::Scalar(scalar)) => Some(quantization_from(scalar)),
        _ => None,
    };

    Ok(
        CollectionConfig::new(
            vector_params.size as usize,
            from_qdrant_distance(vector_params.distance())?,
        )
        .with_quantization(quantization)
        .with_on_disk_payload(payload_on_disk(params)),
    )
}

#[async_trait::async_trait]
impl VectorStore for QdrantStore {
    fn backend_name(&self) -> &str {
        "qdrant"
    }

    #[instrument(skip(self))]
    async fn collection_config(&self, name: &str) -> AppResult<Option<CollectionConfig>> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| store_error("Failed to check collection", e))?;

        let config = if exists {
            let info = self
                .client
                .collection_info(name)
                .await
                .map_err(|e| store_error("Failed to read collection info", e))?;
            info.result.as_ref().map(config_from_info).transpose()?
        } else {
            None
        };

        let mut layouts = self.layouts.write().await;
        match &config {
            Some(config) => layouts.insert(name.to_string(), config.clone()),
            None => layouts.remove(name),
        };
        Ok(config)
    }

    #[instrument(skip(self, config), fields(dimension = config.dimension))]
    async fn create_or_replace_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> AppResult<()> {
        config.validate()?;

        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| store_error("Failed to check collection", e))?;
        if exists {
            debug!("Dropping existing collection '{}'", name);
            self.layouts.write().await.remove(name);
            self.client
                .delete_collection(name)
                .await
                .map_err(|e| store_error("Failed to delete collection", e))?;
        }

        let vectors = VectorParamsBuilder::new(
            config.dimension as u64,
            to_qdrant_distance(config.distance),
        )
        .multivector_config(MultiVectorConfigBuilder::new(MultiVectorComparator::MaxSim));

        let mut builder = CreateCollectionBuilder::new(name).vectors_config(vectors);

        if config.on_disk_payload {
            builder = builder.payload(PayloadStorageParamsBuilder::new().memory(Memory::Cold));
        }

        if let Some(quantization) = &config.quantization {
            builder = builder.quantization_config(scalar_quantization(quantization));
        }

        self.client
            .create_collection(builder)
            .await
            .map_err(|e| store_error("Failed to create collection", e))?;

        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(name, IDENTITY_KEY, FieldType::Integer)
                    .wait(true),
            )
            .await
            .map_err(|e| store_error("Failed to index identity field", e))?;

        self.layouts
            .write()
            .await
            .insert(name.to_string(), config.clone());

        Ok(())
    }

    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn upsert(&self, name: &str, entries: Vec<IndexEntry>) -> AppResult<()> {
        let layout = self.layout(name).await?;
        check_entries(&layout, &entries)?;

        let points: Vec<PointStruct> = entries.into_iter().map(point_from_entry).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
            .await
            .map_err(|e| store_error("Failed to upsert points", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn count(&self, name: &str) -> AppResult<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(name).exact(true))
            .await
            .map_err(|e| store_error("Failed to count points", e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn max_identity(&self, name: &str) -> AppResult<Option<PageId>> {
        let request = ScrollPointsBuilder::new(name)
            .limit(1)
            .order_by(OrderByBuilder::new(IDENTITY_KEY).direction(Direction::Desc as i32))
            .with_payload(false)
            .with_vectors(false);

        let response = self
            .client
            .scroll(request)
            .await
            .map_err(|e| store_error("Failed to read highest identity", e))?;

        response
            .result
            .into_iter()
            .next()
            .map(|point| point_identity(point.id))
            .transpose()
    }

    #[instrument(skip(self, query), fields(query_vectors = query.len()))]
    async fn query(
        &self,
        name: &str,
        query: &MultiVector,
        limit: usize,
    ) -> AppResult<Vec<SearchResult>> {
        let request = QueryPointsBuilder::new(name)
            .query(Query::new_nearest(VectorInput::new_multi(
                query.vectors().to_vec(),
            )))
            .limit(limit as u64)
            .with_payload(true);

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| store_error("Failed to query points", e))?;

        response
            .result
            .into_iter()
            .map(|point| {
                Ok(SearchResult {
                    identity: point_identity(point.id)?,
                    score: point.score,
                    payload: payload_from_qdrant(&point.payload),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant::{vector, vectors::VectorsOptions};

    fn entry(id: u64, dimension: usize) -> IndexEntry {
        IndexEntry {
            identity: PageId(id),
            vectors: MultiVector::new(vec![vec![0.25; dimension], vec![0.5; dimension]]).unwrap(),
            payload: EntryPayload {
                source_filename: format!("report_page_{}.png", id + 1),
                page_number: Some(id as u32 + 1),
                extracted_text: None,
                source: "document_archive".to_string(),
            },
        }
    }

    #[test]
    fn test_payload_roundtrip_fields() {
        let payload = EntryPayload {
            source_filename: "report_page_4.png".to_string(),
            page_number: Some(4),
            extracted_text: Some("Climate agreement".to_string()),
            source: "document_archive".to_string(),
        };

        let map = payload_to_qdrant(&payload);
        assert_eq!(map.len(), 4);
        assert_eq!(payload_from_qdrant(&map), Some(payload));
    }

    #[test]
    fn test_payload_without_filename_is_none() {
        let mut map = HashMap::new();
        map.insert("source".to_string(), QdrantValue::from("x".to_string()));
        assert!(payload_from_qdrant(&map).is_none());
    }

    #[test]
    fn test_optional_payload_fields_omitted() {
        let payload = EntryPayload {
            source_filename: "a.png".to_string(),
            page_number: None,
            extracted_text: None,
            source: "archive".to_string(),
        };
        let map = payload_to_qdrant(&payload);
        assert!(!map.contains_key("page_number"));
        assert!(!map.contains_key("extracted_text"));
    }

    #[test]
    fn test_point_carries_multi_vector_and_identity() {
        let point = point_from_entry(entry(6, 3));

        assert_eq!(point_identity(point.id.clone()).unwrap(), PageId(6));
        assert_eq!(
            point.payload.get(IDENTITY_KEY),
            Some(&QdrantValue::from(6i64))
        );
        assert!(payload_from_qdrant(&point.payload).is_some());

        let vector = match point.vectors.and_then(|v| v.vectors_options) {
            Some(VectorsOptions::Vector(vector)) => vector,
            other => panic!("expected a single unnamed vector, got {:?}", other),
        };
        match vector.vector {
            Some(vector::Vector::MultiDense(multi)) => {
                assert_eq!(multi.vectors.len(), 2);
                assert!(multi.vectors.iter().all(|v| v.data.len() == 3));
            }
            other => panic!("expected a multi-vector, got {:?}", other),
        }
    }

    #[test]
    fn test_quantization_memory_placement() {
        let pinned = ScalarQuantization {
            bits: 8,
            quantile: 0.95,
            always_ram: true,
        };
        assert_eq!(quantization_from(&scalar_quantization(&pinned).build()), pinned);

        let paged = ScalarQuantization {
            always_ram: false,
            ..pinned
        };
        assert_eq!(quantization_from(&scalar_quantization(&paged).build()), paged);
    }

    #[test]
    fn test_payload_placement_read_from_memory_setting() {
        let on_disk = qdrant::CollectionParams {
            payload: Some(PayloadStorageParamsBuilder::new().memory(Memory::Cold).build()),
            ..Default::default()
        };
        assert!(payload_on_disk(&on_disk));
        assert!(!payload_on_disk(&qdrant::CollectionParams::default()));
    }

    #[test]
    fn test_distance_mapping() {
        for distance in [Distance::Cosine, Distance::Dot, Distance::Euclid] {
            assert_eq!(
                from_qdrant_distance(to_qdrant_distance(distance)).unwrap(),
                distance
            );
        }
        assert!(from_qdrant_distance(qdrant::Distance::Manhattan).is_err());
    }

    #[tokio::test]
    async fn test_upsert_dimension_mismatch_is_config_error() {
        let settings = StoreSettings {
            url: "http://127.0.0.1:6999".to_string(),
            ..Default::default()
        };
        let store = QdrantStore::new(&settings, Duration::from_millis(200)).unwrap();
        store
            .layouts
            .write()
            .await
            .insert("pages".to_string(), CollectionConfig::new(4, Distance::Cosine));

        // Rejected locally, before any request reaches the unreachable server.
        let result = store.upsert("pages", vec![entry(0, 4), entry(1, 2)]).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
