//! Object storage sink backed by the `object_store` crate's unified
//! `ObjectStore` trait, parsed from the destination's `target` URL (so the
//! same sink serves S3, GCS, Azure or a local/in-memory store depending on
//! what scheme the deployment configures).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use url::Url;

use crate::error::{FileHorizonError, FileHorizonResult};
use crate::model::WriteOptions;

use super::Sink;

pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    base_path: ObjectPath,
}

impl ObjectStoreSink {
    pub fn from_url(target: &str) -> FileHorizonResult<Self> {
        let url = Url::parse(target).map_err(|e| FileHorizonError::Configuration {
            field: "FileDestinations[].Target".to_string(),
            message: format!("invalid object store URL {target}: {e}"),
        })?;
        let (store, base_path) =
            object_store::parse_url(&url).map_err(|e| FileHorizonError::Configuration {
                field: "FileDestinations[].Target".to_string(),
                message: format!("unsupported object store URL {target}: {e}"),
            })?;
        Ok(Self {
            store: Arc::from(store),
            base_path,
        })
    }
}

#[async_trait]
impl Sink for ObjectStoreSink {
    async fn write(
        &self,
        target_path: &str,
        content: &[u8],
        _options: &WriteOptions,
    ) -> FileHorizonResult<Duration> {
        let start = Instant::now();
        let full_path = self.base_path.clone().join(target_path.trim_start_matches('/'));
        self.store
            .put(&full_path, PutPayload::from(content.to_vec()))
            .await
            .map_err(|e| FileHorizonError::SinkWrite {
                sink: "object_store".to_string(),
                reason: e.to_string(),
            })?;
        Ok(start.elapsed())
    }
}
