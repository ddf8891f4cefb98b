use tracing::debug;

use crate::client::Client;
use crate::error::ClientError;
use crate::models::ModelList;

impl Client {
    /// List available models, one page at a time.
    ///
    /// `cursor` is the opaque position returned by the server; `None` starts
    /// from the beginning.
    pub async fn list_models(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ModelList, ClientError> {
        let path = models_path(cursor, limit);
        debug!(cursor = cursor.unwrap_or_default(), limit, "listing models");
        let resp = self.get(&path).await?;
        self.handle_response(resp).await
    }
}

fn models_path(cursor: Option<&str>, limit: u32) -> String {
    let cursor = cursor.unwrap_or_default();
    format!(
        "/v1/models?cursor={}&limit={}",
        urlencoding::encode(cursor),
        limit
    )
}
