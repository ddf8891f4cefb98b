use promptline_stream::TypedStream;
use tracing::debug;

use crate::client::Client;
use crate::error::ClientError;
use crate::models::{MessageRequest, MessageResponse};

const MESSAGES_PATH: &str = "/v1/messages";

impl Client {
    /// Send a chat request and wait for the full response.
    pub async fn create_message(&self, req: &MessageRequest) -> Result<MessageResponse, ClientError> {
        debug!(model = %req.model, messages = req.messages.len(), "creating message");
        let resp = self.post(MESSAGES_PATH, req).await?;
        self.handle_response(resp).await
    }

    /// Stream a chat response. `stream` is forced on in the request body.
    pub async fn stream_messages(&self, req: &MessageRequest) -> TypedStream<MessageResponse> {
        let req = MessageRequest {
            stream: true,
            ..req.clone()
        };
        debug!(model = %req.model, messages = req.messages.len(), "streaming message");
        self.open_stream(MESSAGES_PATH, &req).await
    }
}
