//! The OpenAI-compatible provider.

use crate::{
    catalog::catalog,
    http::Transport,
    sse::{SseDecoder, SseEvent},
    wire::{ChatRequest, ChatResponse, ModelList},
};
use async_trait::async_trait;
use compact_str::CompactString;
use futures_util::StreamExt;
use parking_lot::Mutex;
use qcore::{
    Capabilities, ChunkStream, CostEstimate, EventBus, GenerationRequest, GenerationResult,
    HealthSnapshot, HealthStatus, ModelInfo, Provider, ProviderBase, ProviderConfig,
    ProviderDescriptor, ProviderError, ProviderEvent, ProviderState, Result, RetryPolicy, Usage,
    model::default_context_limit,
};
use tokio::time::Instant;

const COMPLETIONS: &str = "/chat/completions";

/// Provider for any vendor speaking the OpenAI chat completions dialect.
///
/// The transport is built on initialize and dropped on dispose; every
/// request path fails fast with `NotReady` until then.
pub struct OpenAiCompat {
    base: ProviderBase,
    top_k: bool,
    catalog: Vec<ModelInfo>,
    transport: Mutex<Option<Transport>>,
    listed: Mutex<Vec<CompactString>>,
}

impl OpenAiCompat {
    /// Create a provider for `descriptor`, priced from the built-in catalog
    /// matching its id.
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let catalog = catalog(&descriptor.id);
        Self {
            base: ProviderBase::new(descriptor),
            top_k: false,
            catalog,
            transport: Mutex::new(None),
            listed: Mutex::new(Vec::new()),
        }
    }

    /// OpenAI.
    pub fn openai() -> Self {
        Self::new(
            ProviderDescriptor::new("openai", "OpenAI", remote())
                .with_endpoint("https://api.openai.com/v1"),
        )
    }

    /// Groq.
    pub fn groq() -> Self {
        Self::new(
            ProviderDescriptor::new("groq", "Groq", remote())
                .with_endpoint("https://api.groq.com/openai/v1"),
        )
    }

    /// OpenRouter. Accepts `top_k`.
    pub fn openrouter() -> Self {
        Self::new(
            ProviderDescriptor::new("openrouter", "OpenRouter", remote())
                .with_endpoint("https://openrouter.ai/api/v1"),
        )
        .with_top_k(true)
    }

    /// A local Ollama server. No credential, no pricing.
    pub fn ollama() -> Self {
        let caps = Capabilities::NONE.streaming().local().custom_endpoint();
        Self::new(
            ProviderDescriptor::new("ollama", "Ollama", caps)
                .with_endpoint("http://localhost:11434/v1"),
        )
        .with_top_k(true)
    }

    /// Any other compatible server at `endpoint`. The credential is optional.
    pub fn custom(
        id: impl Into<CompactString>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let caps = Capabilities::NONE.streaming().custom_endpoint();
        Self::new(ProviderDescriptor::new(id, name, caps).with_endpoint(endpoint))
    }

    /// Whether to forward `top_k` to the vendor.
    pub fn with_top_k(mut self, top_k: bool) -> Self {
        self.top_k = top_k;
        self
    }

    /// Replace the price table.
    pub fn with_catalog(mut self, catalog: Vec<ModelInfo>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the retry backoff schedule.
    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        Self {
            base: self.base.with_retry_policy(retry),
            ..self
        }
    }

    fn endpoint(&self, config: &ProviderConfig) -> Result<String> {
        config
            .endpoint
            .clone()
            .or_else(|| self.base.descriptor().default_endpoint.clone())
            .ok_or_else(|| ProviderError::invalid_config(self.base.id(), "no endpoint configured"))
    }

    fn transport(&self) -> Result<Transport> {
        self.transport
            .lock()
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: Some(self.base.descriptor().id.clone()),
            })
    }

    /// Vendor listing in vendor order, priced from the catalog where known.
    fn merge(&self, listed: ModelList) -> Vec<ModelInfo> {
        let descriptor = self.base.descriptor();
        let local = descriptor.capabilities.local;
        listed
            .data
            .into_iter()
            .map(|entry| {
                if let Some(known) = self.catalog.iter().find(|m| m.id == entry.id) {
                    return known.clone();
                }
                let mut model = ModelInfo::remote(
                    entry.id.clone(),
                    entry.id.as_str(),
                    default_context_limit(&entry.id),
                    0.0,
                    0.0,
                );
                model.currency = descriptor.currency.clone();
                model.local = local;
                model.installed = local;
                model
            })
            .collect()
    }
}

fn remote() -> Capabilities {
    Capabilities::NONE
        .streaming()
        .function_calling()
        .requires_credential()
        .custom_endpoint()
}

#[async_trait]
impl Provider for OpenAiCompat {
    fn descriptor(&self) -> &ProviderDescriptor {
        self.base.descriptor()
    }

    fn state(&self) -> ProviderState {
        self.base.state()
    }

    fn config(&self) -> Option<ProviderConfig> {
        self.base.config()
    }

    fn last_health(&self) -> Option<HealthSnapshot> {
        self.base.last_health()
    }

    fn events(&self) -> &EventBus<ProviderEvent> {
        self.base.events()
    }

    async fn initialize(&self, config: ProviderConfig) -> Result<()> {
        self.base
            .initialize_with(config, |config| async move {
                let endpoint = self.endpoint(&config)?;
                let transport = Transport::new(self.base.id(), &endpoint, &config)?;
                tracing::debug!("provider '{}': endpoint {}", self.base.id(), transport.base());
                *self.transport.lock() = Some(transport);
                Ok(())
            })
            .await
    }

    async fn available_models(&self) -> Result<Vec<ModelInfo>> {
        self.base.ensure_ready()?;
        let transport = self.transport()?;
        let listed = transport.models().await;
        self.base.observe(&listed);
        let models = self.merge(listed?);

        let ids: Vec<CompactString> = models.iter().map(|m| m.id.clone()).collect();
        let changed = {
            let mut last = self.listed.lock();
            let changed = *last != ids;
            *last = ids;
            changed
        };
        if changed {
            self.base.events().emit(&ProviderEvent::ModelsChanged {
                count: models.len(),
            });
        }
        Ok(models)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let config = self.base.ensure_ready()?;
        let transport = self.transport()?;
        let body = ChatRequest::new(request, self.top_k);
        let result = self
            .base
            .with_retry(config.max_retries, || {
                transport.post_json::<ChatResponse>(COMPLETIONS, &body)
            })
            .await
            .map(ChatResponse::into_result);
        self.base.observe(&result);
        result
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        self.base.ensure_streaming()?;
        let config = self.base.ensure_ready()?;
        let transport = self.transport()?;
        let body = ChatRequest::new(request, self.top_k).stream();
        let opened = self
            .base
            .with_retry(config.max_retries, || transport.post(COMPLETIONS, &body))
            .await;
        self.base.observe(&opened);
        let response = opened?;

        let provider = self.base.id().to_owned();
        Ok(Box::pin(async_stream::stream! {
            let mut decoder = SseDecoder::default();
            let mut assembler = Assembler::default();
            let mut bytes = response.bytes_stream();
            let mut done = false;
            while !done {
                let events = match bytes.next().await {
                    Some(Ok(next)) => decoder.push(&next),
                    Some(Err(e)) => {
                        yield Err(transport.stream_error(e));
                        return;
                    }
                    None => {
                        done = true;
                        decoder.finish().into_iter().collect()
                    }
                };
                for event in events {
                    let data = match event {
                        SseEvent::Done => {
                            done = true;
                            break;
                        }
                        SseEvent::Data(data) => data,
                    };
                    match serde_json::from_str::<ChatResponse>(&data) {
                        Ok(chunk) => {
                            if let Some(chunk) = assembler.accept(chunk.into_chunk()) {
                                yield Ok(chunk);
                            }
                        }
                        Err(e) => tracing::warn!("{provider}: skipping malformed chunk: {e}, data: {data}"),
                    }
                }
            }
            if let Some(last) = assembler.finish() {
                yield Ok(last);
            }
        }))
    }

    fn estimate_cost(&self, usage: &Usage, model: &str) -> CostEstimate {
        self.base.estimate_cost(&self.catalog, usage, model)
    }

    async fn check_health(&self) -> Result<HealthStatus> {
        if self.base.config().is_none() {
            return Err(ProviderError::NotConfigured {
                provider: Some(self.base.descriptor().id.clone()),
            });
        }
        let transport = self.transport()?;
        let started = Instant::now();
        let probe = transport.models().await;
        let latency = started.elapsed();
        let result = Ok(match probe {
            Ok(_) => HealthStatus::healthy(latency),
            Err(e) => HealthStatus::unhealthy(latency, e.to_string()),
        });
        self.base.record_health(&result);
        result
    }

    async fn dispose(&self) {
        self.transport.lock().take();
        self.listed.lock().clear();
        self.base.dispose();
    }
}

impl std::fmt::Debug for OpenAiCompat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompat")
            .field("base", &self.base)
            .field("top_k", &self.top_k)
            .finish()
    }
}

/// Holds back the finishing chunk until the trailing usage chunk arrives,
/// so the final chunk a caller sees carries usage when the vendor sent it.
#[derive(Default)]
struct Assembler {
    pending: Option<GenerationResult>,
}

impl Assembler {
    fn accept(&mut self, chunk: GenerationResult) -> Option<GenerationResult> {
        if let Some(mut pending) = self.pending.take() {
            if chunk.text.is_empty() && chunk.finish_reason.is_none() {
                pending.usage = chunk.usage.or(pending.usage);
                return Some(pending);
            }
            // Content after a finish reason: release what we held first.
            self.pending = Some(chunk);
            return Some(pending);
        }
        if chunk.finish_reason.is_some() && chunk.usage.is_none() {
            self.pending = Some(chunk);
            return None;
        }
        if chunk.text.is_empty() && chunk.usage.is_none() && chunk.finish_reason.is_none() {
            return None;
        }
        Some(chunk)
    }

    fn finish(&mut self) -> Option<GenerationResult> {
        self.pending.take()
    }
}
