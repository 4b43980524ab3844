//! Scripted gateway for tests: answers through a closure and records every request.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{GatewayError, GatewayRequest, GatewayResponse, ImagePart, ModelGateway, ResponsePart};

type Responder = dyn Fn(&GatewayRequest, usize) -> Result<GatewayResponse, GatewayError> + Send + Sync;

pub struct ScriptedGateway {
    responder: Box<Responder>,
    captured: Arc<Mutex<Vec<GatewayRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedGateway {
    /// `responder` receives the request and its zero-based call number.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&GatewayRequest, usize) -> Result<GatewayResponse, GatewayError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Box::new(responder),
            captured: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Always answers with the same text.
    pub fn with_text(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text_response(&text)))
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.captured.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn generate(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let call = {
            let mut captured = self.captured.lock().unwrap();
            captured.push(request.clone());
            captured.len() - 1
        };
        // Yield so sibling branches interleave like real network calls.
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        (self.responder)(&request, call)
    }
}

pub fn text_response(text: &str) -> GatewayResponse {
    GatewayResponse {
        parts: vec![ResponsePart::Text(text.to_string())],
    }
}

pub fn image_response(data: &[u8]) -> GatewayResponse {
    GatewayResponse {
        parts: vec![ResponsePart::Image(png(data))],
    }
}

pub fn png(data: &[u8]) -> ImagePart {
    ImagePart {
        mime_type: "image/png".to_string(),
        data: Bytes::copy_from_slice(data),
    }
}
