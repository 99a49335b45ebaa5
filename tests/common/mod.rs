#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amazon_scraper::{
    Credentials, QueryPayload, RequestPipeline, ScraperConfig, Sleeper, Transport,
    TransportError, TransportResponse,
};
use async_trait::async_trait;
use serde_json::Value;

pub type Scripted = Result<TransportResponse, TransportError>;

pub fn ok(body: Value) -> Scripted {
    Ok(TransportResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn status(code: u16) -> Scripted {
    Ok(TransportResponse {
        status: code,
        body: String::new(),
    })
}

pub fn raw(code: u16, body: &str) -> Scripted {
    Ok(TransportResponse {
        status: code,
        body: body.to_string(),
    })
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<Scripted>,
    queries: Vec<QueryPayload>,
}

/// Replays canned responses in order and records every query it receives.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                responses: responses.into(),
                queries: Vec::new(),
            })),
        }
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().queries.len()
    }

    pub fn queries(&self) -> Vec<QueryPayload> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_query(
        &self,
        _credentials: &Credentials,
        query: &QueryPayload,
    ) -> Result<TransportResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into())))
    }
}

/// Never answers within any sane timeout.
#[derive(Clone, Default)]
pub struct StalledTransport {
    calls: Arc<Mutex<usize>>,
}

impl StalledTransport {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transport for StalledTransport {
    async fn post_query(
        &self,
        _credentials: &Credentials,
        _query: &QueryPayload,
    ) -> Result<TransportResponse, TransportError> {
        *self.calls.lock().unwrap() += 1;
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(TransportError::Other("unreachable".into()))
    }
}

/// Records requested sleeps instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("scraper-user", "scraper-pass")
}

pub fn pipeline<T: Transport>(
    transport: T,
    config: ScraperConfig,
) -> (RequestPipeline<T>, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let pipeline =
        RequestPipeline::with_transport(credentials(), config, transport, sleeper.clone());
    (pipeline, sleeper)
}
