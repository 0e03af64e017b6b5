//! Request orchestration.
//!
//! A dispatch walks `Resolving -> (CacheHit | Requesting) -> Streaming -> Completed | Failed`.
//! Streaming is lazy: provider events are only pulled when a consumer polls one of the
//! per-choice output sequences, and units belonging to other choices are parked until
//! their own consumer asks for them. Dropping every sequence before the provider
//! finishes aborts the HTTP request and records the request as cancelled.

use crate::cache::{CacheKey, CacheStore, CachedOutputs};
use crate::completion::{Completion, OutputStream};
use crate::config::EngineConfig;
use crate::decoder::{decode_document, EventStreamExt, ResponseFormat};
use crate::normalize::{normalize, ChoiceError};
use crate::provider::ProviderDescriptor;
use crate::registry::{ModelRegistry, Route};
use crate::transaction::{Transaction, TransactionOutcome, TransactionSink};
use crate::types::{ChoiceUnit, CompletionRequest, OutputUnit, RequestMeta};
use crate::Error;
use futures::future::{self, join_all};
use futures::stream::{self, select_all, BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What the demultiplexer pulls from the transport.
enum Feed {
    /// A decoded event. The slot is set when the call was fanned out and every
    /// event of that call belongs to one choice.
    Event(Option<usize>, Result<Value, Error>),
    /// A fanned-out call reached the end of its body.
    Closed(usize),
}

type FeedStream = BoxStream<'static, Feed>;

/// Issues completion requests and hands back lazily streamed outputs.
pub struct Dispatcher {
    registry: Arc<ModelRegistry>,
    client: Client,
    cache: Option<Arc<dyn CacheStore>>,
    transactions: Option<Arc<dyn TransactionSink>>,
    origin: String,
}

impl Dispatcher {
    /// Create a dispatcher from engine configuration.
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let origin = config.origin.clone();
        let registry = Arc::new(ModelRegistry::new(Arc::new(config)));

        Ok(Self::with_registry(registry, client).with_origin(origin))
    }

    /// Create a dispatcher over an existing registry and HTTP client.
    pub fn with_registry(registry: Arc<ModelRegistry>, client: Client) -> Self {
        Self {
            registry,
            client,
            cache: None,
            transactions: None,
            origin: "llm-relay".to_string(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_transactions(mut self, sink: Arc<dyn TransactionSink>) -> Self {
        self.transactions = Some(sink);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Dispatch a request.
    ///
    /// Errors before the first byte of the response (resolution, payload building,
    /// non-2xx status) are returned here. Errors while streaming end the affected
    /// output sequence instead.
    pub async fn dispatch(&self, request: CompletionRequest) -> Result<Completion, Error> {
        let mut ledger = self
            .transactions
            .as_ref()
            .map(|sink| Ledger::new(sink.clone(), &self.origin, &request));

        debug!(
            model_id = ?request.model_id,
            outputs = request.num_outputs,
            stream = request.stream,
            "dispatching completion"
        );

        if request.num_outputs == 0 {
            return Err(fail(ledger, Error::config("num_outputs must be at least 1")).await);
        }

        let route = match self.registry.resolve_request(&request) {
            Ok(route) => route,
            Err(error) => {
                warn!(%error, "model resolution failed");
                return Err(fail(ledger, error).await);
            }
        };
        let provider = route.provider().to_string();
        let model = route.model_for(&request);
        if let Some(ledger) = ledger.as_mut() {
            ledger.route = Some((provider.clone(), model.clone()));
        }

        let cache = match (&self.cache, request.cache) {
            (Some(store), true) => match CacheKey::for_request(&request) {
                Ok(key) => Some((store.clone(), key)),
                Err(error) => return Err(fail(ledger, error).await),
            },
            _ => None,
        };

        if let Some((store, key)) = &cache {
            match store.get(key).await {
                Ok(Some(outputs)) => {
                    info!(
                        provider = %provider,
                        model = %model,
                        %key,
                        "replaying cached completion"
                    );
                    if let Some(ledger) = ledger {
                        ledger
                            .record(TransactionOutcome::Completed {
                                outputs: outputs.clone(),
                                cached: true,
                            })
                            .await;
                    }
                    return Ok(replay(outputs, provider, model));
                }
                Ok(None) => debug!(%key, "cache miss"),
                Err(error) => warn!(%error, "cache lookup failed, calling provider"),
            }
        }

        let feed = match self.request(&route, &request, &model).await {
            Ok(feed) => feed,
            Err(error) => return Err(fail(ledger, error).await),
        };

        let finisher = Finisher {
            provider: provider.clone(),
            model: model.clone(),
            ledger,
            cache,
        };
        let demux = Demux::new(
            feed,
            route.descriptor.clone(),
            request.num_outputs as usize,
            finisher,
        );

        Ok(Completion::new(demux.into_streams(), provider, model, false))
    }

    /// Issue the upstream call, or one call per output when the provider can
    /// only return a single choice.
    async fn request(
        &self,
        route: &Route,
        request: &CompletionRequest,
        model: &str,
    ) -> Result<FeedStream, Error> {
        let descriptor = &route.descriptor;
        let outputs = request.num_outputs;
        let stream = request.stream && descriptor.supports_streaming();

        if outputs > 1 && !descriptor.supports_multiple_choices() {
            debug!(
                provider = descriptor.model_provider(),
                calls = outputs,
                "fanning out single-choice provider"
            );
            let meta = RequestMeta {
                model: model.to_string(),
                stream,
                choices: 1,
            };
            let calls = (0..outputs as usize)
                .map(|slot| self.open(route, request, meta.clone(), Some(slot)));
            let feeds = join_all(calls)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(select_all(feeds).boxed());
        }

        let meta = RequestMeta {
            model: model.to_string(),
            stream,
            choices: outputs,
        };
        self.open(route, request, meta, None).await
    }

    async fn open(
        &self,
        route: &Route,
        request: &CompletionRequest,
        meta: RequestMeta,
        slot: Option<usize>,
    ) -> Result<FeedStream, Error> {
        let descriptor = &route.descriptor;
        let provider = descriptor.model_provider();
        let body = descriptor.transform_request(request, &meta)?;
        let accept = if meta.stream {
            "text/event-stream"
        } else {
            "application/json"
        };

        debug!(
            provider,
            model = %meta.model,
            stream = meta.stream,
            choices = meta.choices,
            "sending request"
        );

        let response = self
            .client
            .post(descriptor.url(request))
            .headers(descriptor.auth_headers(&route.credentials)?)
            .header(ACCEPT, accept)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider, status = status.as_u16(), "provider rejected request");
            return Err(Error::ProviderHttp {
                provider: provider.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let events: BoxStream<'static, Result<Value, Error>> =
            match ResponseFormat::detect(content_type.as_deref(), meta.stream) {
                ResponseFormat::EventStream => {
                    let sentinel = descriptor.end_of_stream_sentinel().map(str::to_owned);
                    response.bytes_stream().json_events(sentinel).boxed()
                }
                ResponseFormat::Json => stream::once(async move {
                    response
                        .bytes()
                        .await
                        .map_err(Error::from)
                        .and_then(|body| decode_document(&body))
                })
                .boxed(),
            };

        let feed = events.map(move |event| Feed::Event(slot, event));
        Ok(match slot {
            Some(slot) => feed
                .chain(stream::once(future::ready(Feed::Closed(slot))))
                .boxed(),
            None => feed.boxed(),
        })
    }
}

fn replay(outputs: CachedOutputs, provider: String, model: String) -> Completion {
    let choices = outputs
        .into_iter()
        .map(|units| -> OutputStream { Box::pin(stream::iter(units.into_iter().map(Ok))) })
        .collect();
    Completion::new(choices, provider, model, true)
}

/// Pending transaction record for one request.
///
/// Dropped without being recorded (the caller abandoned `dispatch`), it records
/// the request as cancelled.
struct Ledger {
    sink: Arc<dyn TransactionSink>,
    origin: String,
    /// Taken when the transaction is built, so it is built at most once.
    request: Option<CompletionRequest>,
    route: Option<(String, String)>,
}

impl Ledger {
    fn new(sink: Arc<dyn TransactionSink>, origin: &str, request: &CompletionRequest) -> Self {
        Self {
            sink,
            origin: origin.to_string(),
            request: Some(request.clone()),
            route: None,
        }
    }

    fn transaction(&mut self, outcome: TransactionOutcome) -> Option<Transaction> {
        let request = self.request.take()?;
        let mut transaction = Transaction::new(std::mem::take(&mut self.origin), request, outcome);
        if let Some((provider, model)) = self.route.take() {
            transaction = transaction.with_route(provider, model);
        }
        Some(transaction)
    }

    async fn record(mut self, outcome: TransactionOutcome) {
        if let Some(transaction) = self.transaction(outcome) {
            self.sink.record(transaction).await;
        }
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        let Some(transaction) = self.transaction(TransactionOutcome::Cancelled {
            outputs: Vec::new(),
        }) else {
            return;
        };
        let sink = self.sink.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("dispatch abandoned, recording cancellation");
                handle.spawn(async move { sink.record(transaction).await });
            }
            Err(_) => warn!("dispatch abandoned outside a runtime, cancellation not recorded"),
        }
    }
}

/// Record a failure that happened before streaming started. Timeouts count as
/// cancellations.
async fn fail(ledger: Option<Ledger>, error: Error) -> Error {
    if let Some(ledger) = ledger {
        let outcome = if error.is_timeout() {
            TransactionOutcome::Cancelled {
                outputs: Vec::new(),
            }
        } else {
            TransactionOutcome::Failed {
                error: error.to_string(),
                outputs: Vec::new(),
            }
        };
        ledger.record(outcome).await;
    }
    error
}

/// Terminal bookkeeping, run exactly once per streamed request.
struct Finisher {
    provider: String,
    model: String,
    ledger: Option<Ledger>,
    cache: Option<(Arc<dyn CacheStore>, CacheKey)>,
}

impl Finisher {
    async fn finish(self, outcome: TransactionOutcome) {
        match &outcome {
            TransactionOutcome::Completed { outputs, .. } => {
                info!(provider = %self.provider, model = %self.model, "completion finished");
                if let Some((store, key)) = &self.cache {
                    match store.set(key, outputs.clone()).await {
                        Ok(()) => debug!(%key, "cached completion"),
                        Err(error) => warn!(%error, %key, "cache write failed"),
                    }
                }
            }
            TransactionOutcome::Failed { error, .. } => {
                warn!(provider = %self.provider, model = %self.model, %error, "completion failed");
            }
            TransactionOutcome::Cancelled { .. } => {
                info!(provider = %self.provider, model = %self.model, "completion cancelled");
            }
        }

        if let Some(ledger) = self.ledger {
            ledger.record(outcome).await;
        }
    }
}

#[derive(Debug)]
enum ChoiceState {
    Open,
    Completed,
    Failed { error: String, timed_out: bool },
}

/// Per-choice buffer between the shared feed and that choice's consumer.
struct ChoiceSlot {
    /// Units pulled on behalf of a sibling choice wait here. Not bounded: the
    /// feed only advances when some consumer polls, and a choice must stay
    /// readable after its siblings were drained to the end.
    pending: VecDeque<Result<OutputUnit, Error>>,
    /// Every unit produced for this choice, delivered or not.
    produced: Vec<OutputUnit>,
    state: ChoiceState,
}

impl ChoiceSlot {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            produced: Vec::new(),
            state: ChoiceState::Open,
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, ChoiceState::Open)
    }

    fn is_failed(&self) -> bool {
        matches!(self.state, ChoiceState::Failed { .. })
    }

    fn push(&mut self, unit: OutputUnit) {
        self.produced.push(unit.clone());
        self.pending.push_back(Ok(unit));
    }

    fn complete(&mut self) {
        if self.is_open() {
            self.state = ChoiceState::Completed;
        }
    }

    fn fail(&mut self, error: Error) {
        let timed_out = error.is_timeout();
        self.fail_with(error, timed_out);
    }

    /// `timed_out` is passed separately because duplicated transport errors lose it.
    fn fail_with(&mut self, error: Error, timed_out: bool) {
        if !self.is_open() {
            return;
        }
        self.state = ChoiceState::Failed {
            error: error.to_string(),
            timed_out,
        };
        self.pending.push_back(Err(error));
    }
}

/// Splits one request's event feed into per-choice sequences.
struct Demux {
    feed: Option<FeedStream>,
    descriptor: Arc<dyn ProviderDescriptor>,
    choices: Vec<ChoiceSlot>,
    finisher: Option<Finisher>,
}

impl Demux {
    fn new(
        feed: FeedStream,
        descriptor: Arc<dyn ProviderDescriptor>,
        outputs: usize,
        finisher: Finisher,
    ) -> Self {
        Self {
            feed: Some(feed),
            descriptor,
            choices: (0..outputs).map(|_| ChoiceSlot::new()).collect(),
            finisher: Some(finisher),
        }
    }

    fn into_streams(self) -> Vec<OutputStream> {
        let outputs = self.choices.len();
        let shared = Arc::new(Mutex::new(self));

        (0..outputs)
            .map(|index| -> OutputStream {
                let shared = shared.clone();
                Box::pin(async_stream::stream! {
                    loop {
                        let next = {
                            let mut demux = shared.lock().await;
                            demux.next_for(index).await
                        };
                        match next {
                            Some(item) => yield item,
                            None => break,
                        }
                    }
                })
            })
            .collect()
    }

    /// Next item for one choice, pulling from the feed until one is available
    /// or the choice is closed.
    async fn next_for(&mut self, index: usize) -> Option<Result<OutputUnit, Error>> {
        loop {
            if let Some(item) = self.choices[index].pending.pop_front() {
                return Some(item);
            }
            if !self.choices[index].is_open() {
                return None;
            }

            let next = match self.feed.as_mut() {
                Some(feed) => feed.next().await,
                None => None,
            };
            match next {
                Some(Feed::Event(slot, event)) => self.route(slot, event),
                Some(Feed::Closed(slot)) => {
                    if let Some(choice) = self.choices.get_mut(slot) {
                        choice.complete();
                    }
                }
                None => self.choices.iter_mut().for_each(ChoiceSlot::complete),
            }

            if self.choices.iter().all(|choice| !choice.is_open()) {
                // Releases the connection before the terminal bookkeeping
                self.feed = None;
                self.finish().await;
            }
        }
    }

    fn route(&mut self, slot: Option<usize>, event: Result<Value, Error>) {
        let normalized = event.and_then(|event| normalize(&event, self.descriptor.as_ref()));

        let items = match normalized {
            Ok(items) => items,
            Err(error) => {
                warn!(%error, "event could not be attributed to a choice");
                match slot.and_then(|slot| self.choices.get_mut(slot)) {
                    Some(choice) => choice.fail(error),
                    None => self.fail_open(error),
                }
                return;
            }
        };

        for item in items {
            match item {
                Ok(ChoiceUnit { index, unit }) => {
                    let index = slot.unwrap_or(index);
                    match self.choices.get_mut(index) {
                        Some(choice) if choice.is_open() => choice.push(unit),
                        _ => debug!(index, "dropping unit for closed or unknown choice"),
                    }
                }
                Err(ChoiceError { index, error }) => {
                    let index = slot.unwrap_or(index);
                    warn!(index, %error, "choice terminated");
                    if let Some(choice) = self.choices.get_mut(index) {
                        choice.fail(error);
                    }
                }
            }
        }
    }

    /// End every open choice with the same error; the last one gets the original.
    fn fail_open(&mut self, error: Error) {
        let timed_out = error.is_timeout();
        let open: Vec<usize> = (0..self.choices.len())
            .filter(|&index| self.choices[index].is_open())
            .collect();

        if let Some((&last, rest)) = open.split_last() {
            for &index in rest {
                self.choices[index].fail_with(error.duplicate(), timed_out);
            }
            self.choices[last].fail_with(error, timed_out);
        }
    }

    fn outputs(&self) -> CachedOutputs {
        self.choices
            .iter()
            .map(|choice| choice.produced.clone())
            .collect()
    }

    fn outcome(&self) -> TransactionOutcome {
        let outputs = self.outputs();
        let mut failure = None;

        for choice in &self.choices {
            if let ChoiceState::Failed { error, timed_out } = &choice.state {
                if *timed_out {
                    return TransactionOutcome::Cancelled { outputs };
                }
                failure.get_or_insert_with(|| error.clone());
            }
        }

        match failure {
            Some(error) => TransactionOutcome::Failed { error, outputs },
            None => TransactionOutcome::Completed {
                outputs,
                cached: false,
            },
        }
    }

    async fn finish(&mut self) {
        if let Some(finisher) = self.finisher.take() {
            finisher.finish(self.outcome()).await;
        }
    }
}

impl Drop for Demux {
    fn drop(&mut self) {
        let Some(finisher) = self.finisher.take() else {
            return;
        };
        // A choice that already failed makes the request a failure even if its
        // siblings were abandoned.
        let outcome = if self.choices.iter().any(ChoiceSlot::is_failed) {
            self.outcome()
        } else {
            TransactionOutcome::Cancelled {
                outputs: self.outputs(),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(finisher.finish(outcome));
            }
            Err(_) => warn!(
                provider = %finisher.provider,
                "output sequences dropped outside a runtime, cancellation not recorded"
            ),
        }
    }
}
