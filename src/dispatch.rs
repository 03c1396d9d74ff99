// Transport seam: sends built envelopes to the hub with retry, backoff and duplicate suppression
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{HubEndpoint, RetryConfig};
use crate::error::DispatchError;
use crate::model::soap::SoapRequest;
use crate::parser::{ResponseParser, XmlNode};

// Acknowledged ids kept for duplicate suppression before the oldest are evicted
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

// Raw hub reply as received off the wire.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: Bytes,
    pub elapsed: Duration,
}

impl TransportReply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    // True when the body is a SOAP envelope whose Body holds a Fault.
    pub fn is_fault(&self) -> bool {
        XmlNode::parse(&self.text())
            .map(|doc| doc.path(&["Body", "Fault"]).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait SoapTransport: Send + Sync + 'static {
    async fn send(&self, request: &SoapRequest) -> Result<TransportReply, DispatchError>;
}

// POSTs envelopes over HTTP. Holds no session state between calls.
#[derive(Debug, Clone)]
pub struct HttpSoapTransport {
    http: Client,
    url: String,
    timeout: Duration,
}

impl HttpSoapTransport {
    pub fn new(endpoint: &HubEndpoint, timeout: Duration) -> Result<Self, DispatchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: endpoint.url.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    async fn send(&self, request: &SoapRequest) -> Result<TransportReply, DispatchError> {
        let started = Instant::now();
        let mut builder = self.http.post(&self.url).body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(self.timeout.as_millis() as u64)
            } else {
                DispatchError::Network(e.to_string())
            }
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::Network(e.to_string()))?;

        let reply = TransportReply {
            status: status.as_u16(),
            body,
            elapsed: started.elapsed(),
        };

        // SOAP faults travel with HTTP 500 and are left to the dispatcher and parser
        if !status.is_success() && !(reply.status == 500 && reply.is_fault()) {
            return Err(DispatchError::HttpStatus {
                status_code: reply.status,
                message: reply.text().chars().take(200).collect(),
                is_retryable: status.is_server_error() || reply.status == 429,
            });
        }

        Ok(reply)
    }
}

// Per message id delivery state kept by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    InFlight,
    Acknowledged,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Delivery {
    Sent { reply: TransportReply, attempts: u32 },
    // The hub answered with a SOAP fault. The message id stays open for a resend.
    Faulted { reply: TransportReply, attempts: u32 },
    // The message id was already delivered or is being delivered by another call.
    Skipped(DeliveryStatus),
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    status: DeliveryStatus,
    updated: Instant,
}

impl LedgerEntry {
    fn new(status: DeliveryStatus) -> Self {
        Self {
            status,
            updated: Instant::now(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DispatchStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_faulted: usize,
    pub requests_retried: usize,
    pub duplicates_skipped: usize,
    pub ledger_evictions: usize,
    pub average_response_time_ms: f64,
    pub max_response_time_ms: f64,
}

impl DispatchStats {
    fn record_latency(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let n = self.requests_succeeded as f64;
        self.average_response_time_ms = if n <= 1.0 {
            ms
        } else {
            self.average_response_time_ms + (ms - self.average_response_time_ms) / n
        };
        self.max_response_time_ms = self.max_response_time_ms.max(ms);
    }
}

// Exponential backoff for the given retry attempt (0-based), spread by the jitter factor.
pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    let base_backoff_ms = (config.initial_backoff_ms as f64
        * config.backoff_multiplier.powf(retry_attempt as f64))
    .min(config.max_backoff_ms as f64);

    let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
    let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

    Duration::from_millis(backoff_ms as u64)
}

pub struct Dispatcher<T: SoapTransport> {
    transport: Arc<T>,
    retry: RetryConfig,
    ledger: DashMap<String, LedgerEntry>,
    ledger_capacity: usize,
    stats: Mutex<DispatchStats>,
}

impl<T: SoapTransport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry,
            ledger: DashMap::new(),
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            stats: Mutex::new(DispatchStats::default()),
        }
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity.max(1);
        self
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().clone()
    }

    pub fn status(&self, message_id: &str) -> Option<DeliveryStatus> {
        self.ledger.get(message_id).map(|e| e.status)
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    // Drops acknowledged ids older than `max_age`. In-flight and failed ids are kept.
    pub fn prune_acknowledged(&self, max_age: Duration) -> usize {
        let before = self.ledger.len();
        self.ledger
            .retain(|_, e| e.status != DeliveryStatus::Acknowledged || e.updated.elapsed() < max_age);
        let removed = before.saturating_sub(self.ledger.len());
        self.stats.lock().ledger_evictions += removed;
        removed
    }

    // Evicts the oldest acknowledged ids once the ledger is over capacity
    fn evict_overflow(&self) {
        let excess = self.ledger.len().saturating_sub(self.ledger_capacity);
        if excess == 0 {
            return;
        }
        let mut acknowledged: Vec<(Instant, String)> = self
            .ledger
            .iter()
            .filter(|e| e.status == DeliveryStatus::Acknowledged)
            .map(|e| (e.updated, e.key().clone()))
            .collect();
        acknowledged.sort();

        let mut removed = 0;
        for (_, id) in acknowledged.into_iter().take(excess) {
            if self
                .ledger
                .remove_if(&id, |_, e| e.status == DeliveryStatus::Acknowledged)
                .is_some()
            {
                removed += 1;
            }
        }
        debug!(removed, capacity = self.ledger_capacity, "evicted acknowledged ids");
        self.stats.lock().ledger_evictions += removed;
    }

    fn record(&self, message_id: &str, status: DeliveryStatus) {
        self.ledger
            .insert(message_id.to_string(), LedgerEntry::new(status));
    }

    // Claims the message id unless it is already delivered or in flight
    fn claim(&self, message_id: &str) -> Option<DeliveryStatus> {
        match self.ledger.entry(message_id.to_string()) {
            Entry::Occupied(entry) if entry.get().status != DeliveryStatus::Failed => {
                Some(entry.get().status)
            }
            Entry::Occupied(mut entry) => {
                entry.insert(LedgerEntry::new(DeliveryStatus::InFlight));
                None
            }
            Entry::Vacant(entry) => {
                entry.insert(LedgerEntry::new(DeliveryStatus::InFlight));
                None
            }
        }
    }

    // Sends one envelope, retrying retryable failures. A message id already acknowledged
    // is not sent again. A SOAP fault reply leaves the id resendable.
    pub async fn dispatch(&self, request: &SoapRequest) -> Result<Delivery, DispatchError> {
        if let Some(status) = self.claim(&request.message_id) {
            debug!(message_id = %request.message_id, ?status, "skipping duplicate dispatch");
            self.stats.lock().duplicates_skipped += 1;
            return Ok(Delivery::Skipped(status));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.stats.lock().requests_sent += 1;

            match self.transport.send(request).await {
                Ok(reply) if reply.is_fault() => {
                    self.record(&request.message_id, DeliveryStatus::Failed);
                    self.stats.lock().requests_faulted += 1;
                    warn!(
                        message_id = %request.message_id,
                        attempts,
                        status = reply.status,
                        "hub answered with a SOAP fault"
                    );
                    return Ok(Delivery::Faulted { reply, attempts });
                }
                Ok(reply) => {
                    self.record(&request.message_id, DeliveryStatus::Acknowledged);
                    self.evict_overflow();
                    {
                        let mut stats = self.stats.lock();
                        stats.requests_succeeded += 1;
                        stats.record_latency(reply.elapsed);
                    }
                    info!(
                        message_id = %request.message_id,
                        hotel = %request.hotel_code,
                        attempts,
                        status = reply.status,
                        "envelope delivered"
                    );
                    return Ok(Delivery::Sent { reply, attempts });
                }
                Err(e) if e.is_retryable() && attempts <= self.retry.max_retries => {
                    let backoff = calculate_backoff(attempts - 1, &self.retry);
                    warn!(
                        message_id = %request.message_id,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "dispatch failed, retrying"
                    );
                    self.stats.lock().requests_retried += 1;
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    self.record(&request.message_id, DeliveryStatus::Failed);
                    self.stats.lock().requests_failed += 1;
                    warn!(message_id = %request.message_id, attempts, error = %e, "dispatch failed");
                    return Err(if e.is_retryable() {
                        DispatchError::RetriesExhausted {
                            message_id: request.message_id.clone(),
                            attempts,
                            last_error: e.to_string(),
                        }
                    } else {
                        e
                    });
                }
            }
        }
    }

    // Sends independent envelopes (e.g. rate shards) concurrently; results keep input order.
    pub async fn dispatch_all(&self, requests: &[SoapRequest]) -> Vec<Result<Delivery, DispatchError>> {
        join_all(requests.iter().map(|r| self.dispatch(r))).await
    }

    // Sends one envelope and parses the reply. `None` when the message id was skipped.
    pub async fn dispatch_and_parse<P: ResponseParser>(
        &self,
        request: &SoapRequest,
        parser: &P,
    ) -> Result<Option<P::Output>, DispatchError> {
        match self.dispatch(request).await? {
            Delivery::Sent { reply, .. } | Delivery::Faulted { reply, .. } => {
                Ok(Some(parser.parse(&reply.text(), Some(reply.elapsed))))
            }
            Delivery::Skipped(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::InventoryParser;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const ACK: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><OTA_HotelInvCountNotifRS EchoToken="e"><Success/></OTA_HotelInvCountNotifRS></soap:Body></soap:Envelope>"#;

    // Replays a fixed script of outcomes, then answers with a success ack
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportReply, DispatchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<TransportReply, DispatchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn ok_reply() -> TransportReply {
        TransportReply {
            status: 200,
            body: Bytes::from_static(ACK.as_bytes()),
            elapsed: Duration::from_millis(5),
        }
    }

    fn server_fault() -> TransportReply {
        TransportReply {
            status: 500,
            body: Bytes::from_static(
                br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>Busy</faultstring></soap:Fault></soap:Body></soap:Envelope>"#,
            ),
            elapsed: Duration::from_millis(7),
        }
    }

    fn unavailable() -> DispatchError {
        DispatchError::HttpStatus {
            status_code: 503,
            message: "Service Unavailable".into(),
            is_retryable: true,
        }
    }

    #[async_trait]
    impl SoapTransport for ScriptedTransport {
        async fn send(&self, _request: &SoapRequest) -> Result<TransportReply, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| Ok(ok_reply()))
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn request(id: &str) -> SoapRequest {
        SoapRequest {
            message_id: id.to_string(),
            action: "http://htng.org/2011B/OTA_HotelInvCountNotifRQ".into(),
            body: "<soap:Envelope/>".into(),
            hotel_code: "HOTEL1".into(),
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        let delays: Vec<u64> = (0..5)
            .map(|n| calculate_backoff(n, &config).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000]);
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let config = RetryConfig {
            jitter_factor: 0.2,
            ..RetryConfig::default()
        };
        for _ in 0..50 {
            let ms = calculate_backoff(1, &config).as_millis() as u64;
            assert!((180..=220).contains(&ms), "{} out of band", ms);
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let transport = ScriptedTransport::new(vec![Err(unavailable()), Err(unavailable())]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(3));

        let delivery = assert_ok!(dispatcher.dispatch(&request("m-1")).await);
        assert!(matches!(delivery, Delivery::Sent { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
        assert_eq!(dispatcher.status("m-1"), Some(DeliveryStatus::Acknowledged));

        let stats = dispatcher.stats();
        assert_eq!(stats.requests_sent, 3);
        assert_eq!(stats.requests_retried, 2);
        assert_eq!(stats.requests_succeeded, 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let transport = ScriptedTransport::new(vec![
            Err(unavailable()),
            Err(unavailable()),
            Err(unavailable()),
        ]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(2));

        let err = assert_err!(dispatcher.dispatch(&request("m-2")).await);
        assert!(matches!(
            err,
            DispatchError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(dispatcher.status("m-2"), Some(DeliveryStatus::Failed));
        assert_eq!(dispatcher.stats().requests_failed, 1);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(DispatchError::HttpStatus {
            status_code: 401,
            message: "Unauthorized".into(),
            is_retryable: false,
        })]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(3));

        let err = assert_err!(dispatcher.dispatch(&request("m-3")).await);
        assert!(matches!(err, DispatchError::HttpStatus { status_code: 401, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_acknowledged_message_is_not_resent() {
        let transport = ScriptedTransport::new(vec![]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(3));

        assert_ok!(dispatcher.dispatch(&request("m-4")).await);
        let again = assert_ok!(dispatcher.dispatch(&request("m-4")).await);
        assert!(matches!(
            again,
            Delivery::Skipped(DeliveryStatus::Acknowledged)
        ));
        assert_eq!(transport.calls(), 1);
        assert_eq!(dispatcher.stats().duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_message_can_be_resent() {
        let transport = ScriptedTransport::new(vec![Err(unavailable())]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(0));

        assert_err!(dispatcher.dispatch(&request("m-5")).await);
        let retry = assert_ok!(dispatcher.dispatch(&request("m-5")).await);
        assert!(matches!(retry, Delivery::Sent { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_soap_fault_leaves_message_resendable() {
        let transport = ScriptedTransport::new(vec![Ok(server_fault())]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(3));

        let parsed = assert_ok!(
            dispatcher
                .dispatch_and_parse(&request("m-7"), &InventoryParser)
                .await
        )
        .unwrap();
        assert!(!parsed.is_success());
        assert_eq!(parsed.base.error_code.as_deref(), Some("soap:Server"));
        assert_eq!(dispatcher.status("m-7"), Some(DeliveryStatus::Failed));
        assert_eq!(dispatcher.stats().requests_faulted, 1);

        let again = assert_ok!(dispatcher.dispatch(&request("m-7")).await);
        assert!(matches!(again, Delivery::Sent { attempts: 1, .. }));
        assert_eq!(dispatcher.status("m-7"), Some(DeliveryStatus::Acknowledged));
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn test_fault_detection_reads_the_body() {
        assert!(server_fault().is_fault());
        assert!(!ok_reply().is_fault());
        let mentions_fault = TransportReply {
            status: 200,
            body: Bytes::from_static(b"<Envelope><Body><Note>Fault tolerant</Note></Body></Envelope>"),
            elapsed: Duration::ZERO,
        };
        assert!(!mentions_fault.is_fault());
    }

    #[tokio::test]
    async fn test_ledger_evicts_oldest_acknowledged() {
        let transport = ScriptedTransport::new(vec![]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(0)).with_ledger_capacity(2);

        for id in ["a", "b", "c"] {
            assert_ok!(dispatcher.dispatch(&request(id)).await);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(dispatcher.ledger_len(), 2);
        assert_eq!(dispatcher.status("a"), None);
        assert_eq!(dispatcher.status("c"), Some(DeliveryStatus::Acknowledged));
        assert_eq!(dispatcher.stats().ledger_evictions, 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_failed_ids() {
        let transport = ScriptedTransport::new(vec![Err(unavailable())]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(0));

        assert_err!(dispatcher.dispatch(&request("lost")).await);
        assert_ok!(dispatcher.dispatch(&request("done")).await);

        assert_eq!(dispatcher.prune_acknowledged(Duration::ZERO), 1);
        assert_eq!(dispatcher.status("done"), None);
        assert_eq!(dispatcher.status("lost"), Some(DeliveryStatus::Failed));
    }

    #[tokio::test]
    async fn test_dispatch_all_keeps_order() {
        let transport = ScriptedTransport::new(vec![]);
        let dispatcher = Dispatcher::new(transport.clone(), fast_retry(1));
        let shards: Vec<SoapRequest> = (0..4).map(|i| request(&format!("shard-{}", i))).collect();

        let results = dispatcher.dispatch_all(&shards).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| matches!(r, Ok(Delivery::Sent { .. }))));
        assert_eq!(transport.calls(), 4);
        assert!(shards
            .iter()
            .all(|s| dispatcher.status(&s.message_id) == Some(DeliveryStatus::Acknowledged)));
    }

    #[tokio::test]
    async fn test_dispatch_and_parse_stamps_duration() {
        let transport = ScriptedTransport::new(vec![]);
        let dispatcher = Dispatcher::new(transport, fast_retry(0));

        let parsed = assert_ok!(
            dispatcher
                .dispatch_and_parse(&request("m-6"), &InventoryParser)
                .await
        )
        .unwrap();
        assert!(parsed.is_success());
        assert_eq!(parsed.base.duration, Some(Duration::from_millis(5)));
        assert_eq!(parsed.base.echo_token.as_deref(), Some("e"));
    }
}
