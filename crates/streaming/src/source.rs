use formats::{FlatMaterial, PreparedAsset, prepare_glb};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::AssetLoadError;
use crate::request::LoadRequest;

/// Starts asset loads on behalf of the cache.
///
/// `load` must return immediately. The result is delivered later through
/// [`LoadRequest::complete`], from any thread.
pub trait AssetSource {
    fn load(&self, request: LoadRequest);
}

/// Fetches assets over HTTP and prepares them off the calling thread.
///
/// One `GET` per request, no authentication and no range requests. Decoding
/// and origin normalization run on the runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
    runtime: Handle,
    material: FlatMaterial,
}

impl HttpAssetSource {
    pub fn new(runtime: Handle, material: FlatMaterial) -> Self {
        Self::with_client(reqwest::Client::new(), runtime, material)
    }

    pub fn with_client(client: reqwest::Client, runtime: Handle, material: FlatMaterial) -> Self {
        Self {
            client,
            runtime,
            material,
        }
    }
}

impl AssetSource for HttpAssetSource {
    fn load(&self, request: LoadRequest) {
        let client = self.client.clone();
        let material = self.material;
        self.runtime.spawn(async move {
            let url = request.url().clone();
            let result = fetch_and_prepare(&client, url.as_str(), material).await;
            if let Err(err) = &result {
                warn!(url = %url, error = %err, "asset fetch failed");
            }
            if !request.complete(result) {
                debug!(url = %url, "asset cache dropped before load finished");
            }
        });
    }
}

async fn fetch_and_prepare(
    client: &reqwest::Client,
    url: &str,
    material: FlatMaterial,
) -> Result<PreparedAsset, AssetLoadError> {
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    debug!(url, bytes = bytes.len(), "asset fetched");

    let prepared = tokio::task::spawn_blocking(move || prepare_glb(&bytes, material))
        .await
        .map_err(|err| AssetLoadError::Worker(err.to_string()))??;
    Ok(prepared)
}
