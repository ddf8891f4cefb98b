use promptline_stream::TypedStream;
use tracing::debug;

use crate::client::Client;
use crate::error::ClientError;
use crate::models::{CompletionRequest, CompletionResponse};

const COMPLETIONS_PATH: &str = "/v1/completions";

impl Client {
    /// Create a completion and wait for the full response.
    pub async fn create_completion(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, ClientError> {
        debug!(model = %req.model, "creating completion");
        let resp = self.post(COMPLETIONS_PATH, req).await?;
        self.handle_response(resp).await
    }

    /// Stream a completion. `stream` is forced on in the request body.
    ///
    /// Each `data` event decodes into one [`CompletionResponse`] chunk; the
    /// caller reads both channels until they close.
    pub async fn stream_completions(
        &self,
        req: &CompletionRequest,
    ) -> TypedStream<CompletionResponse> {
        let req = CompletionRequest {
            stream: true,
            ..req.clone()
        };
        debug!(model = %req.model, "streaming completion");
        self.open_stream(COMPLETIONS_PATH, &req).await
    }
}
