//! Mock transport for testing
//!
//! Simulates a SIMK43 engine ECU on the far side of the K-Line: it answers
//! session, timing, security, memory and live data requests, runs a
//! keepalive once initialised and can be scripted to reject or fail
//! individual services.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kwp_core::PortInfo;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{KwpResponse, KwpTransport, TransportError, TransportFactory};
use crate::config::MockConfig;
use crate::kwp::{positive_response, service_id, NegativeResponseCode};
use crate::security::compute_key;

/// Local identifier of the simulated engine live data block
pub const LIVE_DATA_LOCAL_ID: u8 = 0x01;

/// Size of the simulated live data payload, local identifier echo included
pub const LIVE_DATA_LEN: usize = 161;

/// Requests kept in the request log, oldest dropped first
pub const REQUEST_LOG_CAPACITY: usize = 512;

/// Transports a factory keeps for inspection, oldest dropped first
pub const OPENED_HISTORY_CAPACITY: usize = 8;

struct MockState {
    open: AtomicBool,
    closed: Notify,
    timeout: RwLock<Duration>,
    /// Scripted responses (request prefix -> raw response incl. status byte)
    responses: RwLock<Vec<(Vec<u8>, Vec<u8>)>>,
    rejected: RwLock<HashMap<u8, u8>>,
    failing: RwLock<HashSet<u8>>,
    delays: RwLock<HashMap<u8, Duration>>,
    memory: RwLock<Vec<(u32, Vec<u8>)>>,
    live_data: RwLock<HashMap<u8, Vec<u8>>>,
    requests: Mutex<VecDeque<Vec<u8>>>,
    last_activity: Mutex<Instant>,
    keepalive_count: AtomicU64,
    keepalive_handle: Mutex<Option<JoinHandle<()>>>,
    unlocked: AtomicBool,
    polls: AtomicU64,
}

/// Mock K-Line transport for testing
pub struct MockTransport {
    port: String,
    config: MockConfig,
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new(port: impl Into<String>, config: MockConfig) -> Self {
        Self {
            port: port.into(),
            config,
            state: Arc::new(MockState {
                open: AtomicBool::new(true),
                closed: Notify::new(),
                timeout: RwLock::new(Duration::from_secs(2)),
                responses: RwLock::new(Vec::new()),
                rejected: RwLock::new(HashMap::new()),
                failing: RwLock::new(HashSet::new()),
                delays: RwLock::new(HashMap::new()),
                memory: RwLock::new(Self::default_memory()),
                live_data: RwLock::new(HashMap::new()),
                requests: Mutex::new(VecDeque::new()),
                last_activity: Mutex::new(Instant::now()),
                keepalive_count: AtomicU64::new(0),
                keepalive_handle: Mutex::new(None),
                unlocked: AtomicBool::new(false),
                polls: AtomicU64::new(0),
            }),
        }
    }

    /// Add a scripted response for requests starting with `request`
    ///
    /// `response` holds the status byte followed by the payload. A `0x7F`
    /// status is reported as a negative response.
    pub fn add_response(&self, request: Vec<u8>, response: Vec<u8>) {
        self.state.responses.write().push((request, response));
    }

    /// Answer every request for `service` with a negative response
    pub fn reject_service(&self, service: u8, nrc: u8) {
        self.state.rejected.write().insert(service, nrc);
    }

    /// Make every request for `service` fail at the transport level
    pub fn fail_service(&self, service: u8) {
        self.state.failing.write().insert(service);
    }

    /// Delay responses to `service` on top of the configured latency
    pub fn set_delay(&self, service: u8, delay: Duration) {
        self.state.delays.write().insert(service, delay);
    }

    /// Map `data` into the simulated address space at `address`
    pub fn set_memory(&self, address: u32, data: Vec<u8>) {
        let mut memory = self.state.memory.write();
        memory.retain(|(start, _)| *start != address);
        memory.push((address, data));
    }

    /// Remove every mapped memory region
    pub fn clear_memory(&self) {
        self.state.memory.write().clear();
    }

    /// Fix the payload returned for a local identifier
    ///
    /// `data` is returned verbatim after the status byte, so it normally
    /// starts with the local identifier echo.
    pub fn set_live_data(&self, local_id: u8, data: Vec<u8>) {
        self.state.live_data.write().insert(local_id, data);
    }

    /// Most recent requests, service id first
    ///
    /// Holds at most [`REQUEST_LOG_CAPACITY`] entries.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.requests.lock().iter().cloned().collect()
    }

    /// Most recent requests for one service
    pub fn requests_for(&self, service: u8) -> Vec<Vec<u8>> {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|r| r.first() == Some(&service))
            .cloned()
            .collect()
    }

    pub fn keepalive_count(&self) -> u64 {
        self.state.keepalive_count.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        *self.state.timeout.read()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state.unlocked.load(Ordering::SeqCst)
    }

    /// Number of live data blocks served
    pub fn poll_count(&self) -> u64 {
        self.state.polls.load(Ordering::SeqCst)
    }

    fn default_memory() -> Vec<(u32, Vec<u8>)> {
        vec![
            // SIMK43 8mbit identification window
            (0x082014, b"6621".to_vec()),
            // Calibration id and description
            (0x090000, b"CAL6621A".to_vec()),
            (0x090040, b"SIMK43_8".to_vec()),
        ]
    }

    fn find_scripted(&self, request: &[u8]) -> Option<Vec<u8>> {
        let responses = self.state.responses.read();

        // First try exact match
        for (req, resp) in responses.iter() {
            if req == request {
                return Some(resp.clone());
            }
        }

        // Then try prefix match for variable-length requests
        for (req, resp) in responses.iter() {
            if request.starts_with(req) {
                return Some(resp.clone());
            }
        }

        None
    }

    /// Simulated ECU behaviour for unscripted requests
    fn simulate(&self, service: u8, data: &[u8]) -> Vec<u8> {
        let negative = |nrc: NegativeResponseCode| {
            vec![service_id::NEGATIVE_RESPONSE, service, u8::from(nrc)]
        };
        let positive = |payload: &[u8]| {
            let mut response = vec![positive_response(service)];
            response.extend_from_slice(payload);
            response
        };

        match (service, data) {
            (service_id::START_COMMUNICATION, _) => positive(&[0xEF, 0x8F]),
            (service_id::STOP_COMMUNICATION, _) => positive(&[]),
            (service_id::STOP_DIAGNOSTIC_SESSION, _) => positive(&[]),
            (service_id::START_DIAGNOSTIC_SESSION, [session]) => positive(&[*session]),
            (service_id::ACCESS_TIMING_PARAMETERS, [0x00]) => {
                positive(&[0x00, 0x00, 0x01, 0x00, 0x14, 0x00])
            }
            (service_id::ACCESS_TIMING_PARAMETERS, [0x03, _, _, _, _, _]) => positive(&[0x03]),
            (service_id::SECURITY_ACCESS, [0x01]) => {
                if self.state.unlocked.load(Ordering::SeqCst) {
                    positive(&[0x01, 0x00, 0x00])
                } else {
                    let [hi, lo] = self.config.seed.to_be_bytes();
                    positive(&[0x01, hi, lo])
                }
            }
            (service_id::SECURITY_ACCESS, [0x02, hi, lo]) => {
                if u16::from_be_bytes([*hi, *lo]) == compute_key(self.config.seed) {
                    self.state.unlocked.store(true, Ordering::SeqCst);
                    positive(&[0x02, 0x34])
                } else {
                    negative(NegativeResponseCode::InvalidKey)
                }
            }
            (service_id::READ_MEMORY_BY_ADDRESS, [a, b, c, size]) => {
                let address = u32::from_be_bytes([0, *a, *b, *c]);
                match self.read_region(address, usize::from(*size)) {
                    Some(bytes) => positive(&bytes),
                    None => negative(NegativeResponseCode::RequestOutOfRange),
                }
            }
            (service_id::READ_DATA_BY_LOCAL_ID, [local_id]) => {
                let scripted = self.state.live_data.read().get(local_id).cloned();
                let block = match scripted {
                    Some(block) => Some(block),
                    None if *local_id == LIVE_DATA_LOCAL_ID => Some(self.engine_block()),
                    None => None,
                };
                match block {
                    Some(block) => {
                        self.state.polls.fetch_add(1, Ordering::SeqCst);
                        positive(&block)
                    }
                    None => negative(NegativeResponseCode::RequestOutOfRange),
                }
            }
            (service_id::TESTER_PRESENT, _) => positive(&[]),
            (
                service_id::START_DIAGNOSTIC_SESSION
                | service_id::ACCESS_TIMING_PARAMETERS
                | service_id::SECURITY_ACCESS
                | service_id::READ_MEMORY_BY_ADDRESS
                | service_id::READ_DATA_BY_LOCAL_ID,
                _,
            ) => negative(NegativeResponseCode::SubFunctionNotSupportedInvalidFormat),
            _ => negative(NegativeResponseCode::ServiceNotSupported),
        }
    }

    fn read_region(&self, address: u32, size: usize) -> Option<Vec<u8>> {
        let memory = self.state.memory.read();
        memory.iter().find_map(|(start, bytes)| {
            let offset = usize::try_from(address.checked_sub(*start)?).ok()?;
            bytes.get(offset..offset.checked_add(size)?).map(<[u8]>::to_vec)
        })
    }

    /// Engine live data that drifts a little on every poll
    fn engine_block(&self) -> Vec<u8> {
        let tick = self.state.polls.load(Ordering::SeqCst);
        let mut block = vec![0u8; LIVE_DATA_LEN];
        block[0] = LIVE_DATA_LOCAL_ID;
        // Battery voltage, 14.02 V
        block[1] = 138;
        // Coolant and oil temperature, 90 C
        block[4] = 120;
        block[6] = 130;
        // Intake air, 24 C
        block[9] = 96;
        block[11] = (tick % 40) as u8;
        block[15..17].copy_from_slice(&(320 + (tick % 64) as u16).to_le_bytes());
        let rpm = 800 + ((tick * 25) % 1200) as u16;
        block[31..33].copy_from_slice(&rpm.to_le_bytes());
        block[38..40].copy_from_slice(&(90 + (tick % 80) as u16).to_le_bytes());
        block[145] = 1;
        block
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.state.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }

    async fn wait_for_response(&self, service: u8) -> Result<(), TransportError> {
        let extra = self
            .state
            .delays
            .read()
            .get(&service)
            .copied()
            .unwrap_or_default();
        let delay = Duration::from_millis(self.config.latency_ms) + extra;
        if delay.is_zero() {
            return Ok(());
        }

        let timeout = *self.state.timeout.read();
        let closed = self.state.closed.notified();
        tokio::pin!(closed);
        // Register before checking, so a concurrent close cannot slip between
        closed.as_mut().enable();
        self.ensure_open()?;

        tokio::select! {
            _ = tokio::time::sleep(delay.min(timeout)) => {}
            _ = closed => return Err(TransportError::ConnectionClosed),
        }

        if delay > timeout {
            return Err(TransportError::Timeout(timeout.as_millis() as u64));
        }
        Ok(())
    }
}

#[async_trait]
impl KwpTransport for MockTransport {
    fn port(&self) -> &str {
        &self.port
    }

    async fn init(
        &self,
        start: &[u8],
        keepalive: &[u8],
        keepalive_interval: Duration,
    ) -> Result<(), TransportError> {
        let Some((&service, data)) = start.split_first() else {
            return Err(TransportError::InvalidConfig(
                "empty start request".to_string(),
            ));
        };
        self.execute(service, data).await?;

        let state = self.state.clone();
        let port = self.port.clone();
        let request = keepalive.to_vec();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive_interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !state.open.load(Ordering::SeqCst) {
                    break;
                }

                let mut last = state.last_activity.lock();
                if last.elapsed() >= keepalive_interval {
                    *last = Instant::now();
                    state.keepalive_count.fetch_add(1, Ordering::SeqCst);
                    debug!(port = %port, request = %hex::encode(&request), "Mock keepalive");
                }
            }
        });

        if let Some(previous) = self.state.keepalive_handle.lock().replace(handle) {
            previous.abort();
        }
        debug!(
            port = %self.port,
            interval_ms = keepalive_interval.as_millis() as u64,
            "Mock transport initialised"
        );
        Ok(())
    }

    async fn execute(&self, service: u8, data: &[u8]) -> Result<KwpResponse, TransportError> {
        self.ensure_open()?;

        let mut request = vec![service];
        request.extend_from_slice(data);
        {
            let mut requests = self.state.requests.lock();
            if requests.len() == REQUEST_LOG_CAPACITY {
                requests.pop_front();
            }
            requests.push_back(request.clone());
        }
        *self.state.last_activity.lock() = Instant::now();

        self.wait_for_response(service).await?;
        self.ensure_open()?;

        if self.state.failing.read().contains(&service) {
            return Err(TransportError::ReceiveFailed(format!(
                "no response to service 0x{:02X}",
                service
            )));
        }
        if let Some(&nrc) = self.state.rejected.read().get(&service) {
            return Err(TransportError::NegativeResponse { service, nrc });
        }

        let raw = self
            .find_scripted(&request)
            .unwrap_or_else(|| self.simulate(service, data));

        match raw.split_first() {
            Some((&service_id::NEGATIVE_RESPONSE, rest)) => Err(TransportError::NegativeResponse {
                service: rest.first().copied().unwrap_or(service),
                nrc: rest.get(1).copied().unwrap_or(0x10),
            }),
            Some((&status, rest)) => Ok(KwpResponse::new(status, rest.to_vec())),
            None => Err(TransportError::ReceiveFailed("empty response".to_string())),
        }
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.state.timeout.write() = timeout;
    }

    async fn close(&self) {
        if self.state.open.swap(false, Ordering::SeqCst) {
            self.state.closed.notify_waiters();
            if let Some(handle) = self.state.keepalive_handle.lock().take() {
                handle.abort();
            }
            debug!(port = %self.port, "Mock transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.state.keepalive_handle.lock().take() {
            handle.abort();
        }
    }
}

type OpenHook = Arc<dyn Fn(&MockTransport) + Send + Sync>;

/// Opens [`MockTransport`]s and keeps them for inspection
pub struct MockTransportFactory {
    config: MockConfig,
    opened: Mutex<VecDeque<Arc<MockTransport>>>,
    unavailable: RwLock<HashSet<String>>,
    on_open: RwLock<Option<OpenHook>>,
}

impl MockTransportFactory {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            opened: Mutex::new(VecDeque::new()),
            unavailable: RwLock::new(HashSet::new()),
            on_open: RwLock::new(None),
        }
    }

    /// Make `open` fail for this port
    pub fn set_unavailable(&self, port: impl Into<String>) {
        self.unavailable.write().insert(port.into());
    }

    /// Run `hook` on every transport right after it is opened
    pub fn on_open(&self, hook: impl Fn(&MockTransport) + Send + Sync + 'static) {
        *self.on_open.write() = Some(Arc::new(hook));
    }

    /// Most recently opened transports, oldest first
    ///
    /// Holds at most [`OPENED_HISTORY_CAPACITY`] transports.
    pub fn opened(&self) -> Vec<Arc<MockTransport>> {
        self.opened.lock().iter().cloned().collect()
    }

    pub fn last_opened(&self) -> Option<Arc<MockTransport>> {
        self.opened.lock().back().cloned()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn open(&self, port: &str) -> Result<Arc<dyn KwpTransport>, TransportError> {
        if self.unavailable.read().contains(port) {
            return Err(TransportError::ConnectionFailed(format!(
                "cannot open {}",
                port
            )));
        }

        let transport = Arc::new(MockTransport::new(port, self.config.clone()));
        let hook = self.on_open.read().clone();
        if let Some(hook) = hook {
            hook(&transport);
        }
        {
            let mut opened = self.opened.lock();
            if opened.len() == OPENED_HISTORY_CAPACITY {
                opened.pop_front();
            }
            opened.push_back(transport.clone());
        }

        debug!(port, "Mock transport opened");
        Ok(transport)
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        Ok(self
            .config
            .ports
            .iter()
            .map(|port| PortInfo::new(port.clone(), "Mock K-Line interface"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock() -> MockTransport {
        MockTransport::new("/dev/ttyUSB0", MockConfig::default())
    }

    #[tokio::test]
    async fn test_scripted_exact_then_prefix() {
        let transport = mock();
        transport.add_response(vec![0x21], vec![0x61, 0xAA]);
        transport.add_response(vec![0x21, 0x02], vec![0x61, 0xBB]);

        let exact = transport.execute(0x21, &[0x02]).await.unwrap();
        assert_eq!(exact.data, vec![0xBB]);
        let prefix = transport.execute(0x21, &[0x05]).await.unwrap();
        assert_eq!(prefix.data, vec![0xAA]);
    }

    #[tokio::test]
    async fn test_scripted_negative_response() {
        let transport = mock();
        transport.add_response(vec![0x10, 0x85], vec![0x7F, 0x10, 0x22]);

        assert_eq!(
            transport.execute(0x10, &[0x85]).await,
            Err(TransportError::NegativeResponse {
                service: 0x10,
                nrc: 0x22
            })
        );
    }

    #[tokio::test]
    async fn test_security_handshake() {
        let transport = mock();
        let seed = transport.execute(0x27, &[0x01]).await.unwrap();
        assert_eq!(seed.data, vec![0x01, 0x3A, 0x5C]);

        let wrong = transport.execute(0x27, &[0x02, 0x00, 0x01]).await;
        assert!(matches!(
            wrong,
            Err(TransportError::NegativeResponse { nrc: 0x35, .. })
        ));

        let [hi, lo] = compute_key(0x3A5C).to_be_bytes();
        transport.execute(0x27, &[0x02, hi, lo]).await.unwrap();
        assert!(transport.is_unlocked());

        let again = transport.execute(0x27, &[0x01]).await.unwrap();
        assert_eq!(again.data, vec![0x01, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_memory_regions() {
        let transport = mock();
        assert_eq!(
            transport.read_memory(0x090002, 4).await.unwrap(),
            b"L662".to_vec()
        );
        assert!(matches!(
            transport.read_memory(0x090006, 4).await,
            Err(TransportError::NegativeResponse { nrc: 0x31, .. })
        ));
    }

    #[tokio::test]
    async fn test_engine_block_layout() {
        let transport = mock();
        let response = transport.execute(0x21, &[0x01]).await.unwrap();
        assert_eq!(response.status, 0x61);
        assert_eq!(response.data.len(), LIVE_DATA_LEN);
        assert_eq!(response.data[0], LIVE_DATA_LOCAL_ID);
        assert_eq!(transport.poll_count(), 1);

        assert!(matches!(
            transport.execute(0x21, &[0x07]).await,
            Err(TransportError::NegativeResponse { nrc: 0x31, .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let transport = mock();
        transport.fail_service(0x21);
        transport.reject_service(0x83, 0x11);

        assert!(matches!(
            transport.execute(0x21, &[0x01]).await,
            Err(TransportError::ReceiveFailed(_))
        ));
        assert!(matches!(
            transport.execute(0x83, &[0x00]).await,
            Err(TransportError::NegativeResponse { nrc: 0x11, .. })
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let transport = mock();
        transport.close().await;
        transport.close().await;
        assert!(!transport.is_open());
        assert_eq!(
            transport.execute(0x3E, &[0x01]).await,
            Err(TransportError::ConnectionClosed)
        );
    }

    #[tokio::test]
    async fn test_close_interrupts_pending_request() {
        let transport = Arc::new(mock());
        transport.set_timeout(Duration::from_secs(30));
        transport.set_delay(0x27, Duration::from_secs(30));

        let pending = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.execute(0x27, &[0x01]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.close().await;

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_response_slower_than_timeout() {
        let transport = mock();
        transport.set_timeout(Duration::from_millis(10));
        transport.set_delay(0x23, Duration::from_millis(50));

        assert_eq!(
            transport.read_memory(0x082014, 4).await,
            Err(TransportError::Timeout(10))
        );
    }

    #[tokio::test]
    async fn test_keepalive_fires_when_idle() {
        let transport = mock();
        transport
            .init(&[0x81], &[0x3E, 0x01], Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(transport.keepalive_count() >= 2);

        transport.close().await;
        let count = transport.keepalive_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(transport.keepalive_count(), count);
    }

    #[tokio::test]
    async fn test_factory() {
        let factory = MockTransportFactory::new(MockConfig::default());
        factory.set_unavailable("/dev/ttyUSB9");
        factory.on_open(|t| t.reject_service(0x83, 0x11));

        assert!(factory.open("/dev/ttyUSB9").await.is_err());
        let transport = factory.open("/dev/ttyUSB0").await.unwrap();
        assert_eq!(transport.port(), "/dev/ttyUSB0");
        assert!(transport.execute(0x83, &[0x00]).await.is_err());
        assert_eq!(factory.opened().len(), 1);

        let ports = factory.list_ports().await.unwrap();
        assert_eq!(ports, vec![PortInfo::new("/dev/ttyUSB0", "Mock K-Line interface")]);
    }

    #[tokio::test]
    async fn test_request_log_is_bounded() {
        let transport = mock();
        for i in 0..REQUEST_LOG_CAPACITY + 10 {
            transport.execute(0x3E, &[i as u8]).await.unwrap();
        }

        let requests = transport.requests();
        assert_eq!(requests.len(), REQUEST_LOG_CAPACITY);
        // Oldest entries went first
        assert_eq!(requests[0], vec![0x3E, 10]);
        assert_eq!(requests.last(), Some(&vec![0x3E, (REQUEST_LOG_CAPACITY + 9) as u8]));
    }

    #[tokio::test]
    async fn test_factory_history_is_bounded() {
        let factory = MockTransportFactory::new(MockConfig::default());
        for _ in 0..OPENED_HISTORY_CAPACITY + 3 {
            factory.open("/dev/ttyUSB0").await.unwrap().close().await;
        }
        let last = factory.open("/dev/ttyUSB0").await.unwrap();

        let opened = factory.opened();
        assert_eq!(opened.len(), OPENED_HISTORY_CAPACITY);
        let newest = factory.last_opened().unwrap();
        assert_eq!(
            Arc::as_ptr(&newest) as *const u8,
            Arc::as_ptr(&last) as *const u8
        );
        assert!(opened[..OPENED_HISTORY_CAPACITY - 1]
            .iter()
            .all(|t| !t.is_open()));
    }
}
