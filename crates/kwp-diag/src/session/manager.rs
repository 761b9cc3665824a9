//! Session manager: serializes start/stop and owns the active worker

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use kwp_conv::{build_schema, Catalog, ConvResult};
use kwp_core::{
    BridgeError, BridgeResult, BroadcastHub, PortInfo, SessionControl, SessionState,
    SessionStatus, StreamEvent,
};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::SessionContext;
use super::worker::Worker;
use crate::config::SessionConfig;
use crate::identify::{builtin_table, IdentificationEntry};
use crate::transport::TransportFactory;

struct ActiveSession {
    ctx: Arc<SessionContext>,
    handle: JoinHandle<()>,
}

/// Runs at most one diagnostic session at a time
pub struct SessionManager {
    factory: Arc<dyn TransportFactory>,
    hub: BroadcastHub,
    catalog: Arc<Catalog>,
    table: Arc<Vec<IdentificationEntry>>,
    config: SessionConfig,
    status: Arc<RwLock<SessionStatus>>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    /// Create a manager polling `catalog`
    ///
    /// The catalog is validated first. The hub greets every viewer with the
    /// schema built from it, so announced columns always match the records.
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        catalog: Arc<Catalog>,
        config: SessionConfig,
    ) -> ConvResult<Self> {
        catalog.validate()?;
        let schema = build_schema(&catalog, &config.device_name);
        let hub = BroadcastHub::new(
            StreamEvent::line(schema.to_line()),
            config.subscriber_queue,
        );

        Ok(Self {
            factory,
            hub,
            catalog,
            table: Arc::new(builtin_table()),
            config,
            status: Arc::new(RwLock::new(SessionStatus::default())),
            active: Mutex::new(None),
        })
    }

    /// Replace the ECU identification table
    pub fn with_identification_table(mut self, table: Vec<IdentificationEntry>) -> Self {
        self.table = Arc::new(table);
        self
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Cancel a session, close its transport and wait for its worker
    ///
    /// A worker that does not exit within the stop timeout is aborted.
    async fn shutdown(&self, mut session: ActiveSession) {
        {
            let mut status = self.status.write();
            if status.state.is_active() {
                status.state = SessionState::Stopping;
            }
        }

        session.ctx.cancel();
        session.ctx.release().await;

        match tokio::time::timeout(self.config.stop_timeout(), &mut session.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(port = %session.ctx.port(), error = %e, "Session worker panicked");
                self.finish_aborted(&session.ctx);
            }
            Err(_) => {
                warn!(
                    port = %session.ctx.port(),
                    timeout_ms = self.config.stop_timeout_ms,
                    "Session worker did not stop in time, aborting"
                );
                session.handle.abort();
                // Returns as soon as the task is torn down
                let _ = session.handle.await;
                self.finish_aborted(&session.ctx);
            }
        }
    }

    fn finish_aborted(&self, ctx: &SessionContext) {
        self.status.write().state = SessionState::Stopped;
        ctx.announce_termination(&self.hub);
    }
}

#[async_trait]
impl SessionControl for SessionManager {
    async fn start(&self, port: &str) -> BridgeResult<()> {
        let port = port.trim();
        if port.is_empty() {
            return Err(BridgeError::InvalidRequest("missing port".to_string()));
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(previous = %previous.ctx.port(), "Stopping previous session");
            self.shutdown(previous).await;
        }

        let ctx = Arc::new(SessionContext::new(port));
        *self.status.write() = SessionStatus {
            state: SessionState::Connecting,
            port: Some(port.to_string()),
            ecu: None,
            started_at: Some(Utc::now()),
        };

        let worker = Worker {
            ctx: ctx.clone(),
            factory: self.factory.clone(),
            hub: self.hub.clone(),
            catalog: self.catalog.clone(),
            table: self.table.clone(),
            config: self.config.clone(),
            status: self.status.clone(),
        };
        let handle = tokio::spawn(worker.run());
        *active = Some(ActiveSession { ctx, handle });

        info!(port, "Session started");
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(session) => {
                let port = session.ctx.port().to_string();
                self.shutdown(session).await;
                info!(port = %port, "Session stopped");
            }
            None => debug!("Stop requested without an active session"),
        }
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    async fn list_ports(&self) -> BridgeResult<Vec<PortInfo>> {
        self.factory
            .list_ports()
            .await
            .map_err(|e| BridgeError::Ports(e.to_string()))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            session.ctx.cancel();
            session.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::MockConfig;
    use crate::transport::mock::MockTransportFactory;
    use crate::transport::KwpTransport;
    use kwp_conv::{ConvError, DataSource, Parameter};
    use kwp_core::Subscription;

    fn manager(config: SessionConfig) -> (Arc<MockTransportFactory>, SessionManager) {
        let factory = Arc::new(MockTransportFactory::new(MockConfig::default()));
        let manager =
            SessionManager::new(factory.clone(), Arc::new(Catalog::builtin()), config).unwrap();
        (factory, manager)
    }

    fn fast() -> SessionConfig {
        SessionConfig {
            poll_interval_ms: 5,
            subscriber_queue: 4096,
            ..SessionConfig::default()
        }
    }

    async fn wait_for(viewer: &mut Subscription, text: &str) -> Vec<StreamEvent> {
        let mut seen = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), viewer.recv()).await {
                Ok(Some(event)) => {
                    let done = event.text().starts_with(text);
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                other => panic!("no '{}' on the stream: {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_invalid_catalog_rejected() {
        let factory = Arc::new(MockTransportFactory::new(MockConfig::default()));
        let catalog = Catalog::new(vec![DataSource::new(
            0x01,
            vec![Parameter::new("Engine Speed", "RPM", 31, 0)],
        )]);

        match SessionManager::new(factory, Arc::new(catalog), fast()) {
            Err(ConvError::InvalidParameter { name, .. }) => assert_eq!(name, "Engine Speed"),
            Err(other) => panic!("Expected InvalidParameter, got {:?}", other),
            Ok(_) => panic!("Expected InvalidParameter, got a manager"),
        }
    }

    #[tokio::test]
    async fn test_announced_schema_matches_records() {
        let catalog = Catalog::new(vec![DataSource::new(
            0x01,
            vec![
                Parameter::new("Battery voltage", "V", 1, 1),
                Parameter::new("Engine Speed", "RPM", 31, 2),
            ],
        )]);
        let config = SessionConfig {
            device_name: "SIMK43".to_string(),
            ..fast()
        };
        let expected = build_schema(&catalog, "SIMK43").to_line();
        let factory = Arc::new(MockTransportFactory::new(MockConfig::default()));
        let manager = SessionManager::new(factory, Arc::new(catalog), config).unwrap();
        assert_eq!(manager.hub().handshake(), &StreamEvent::line(expected.clone()));

        let mut viewer = manager.hub().subscribe();
        manager.start("/dev/ttyUSB0").await.unwrap();
        let events = wait_for(&mut viewer, "DATA ").await;
        manager.stop().await.unwrap();

        let lines: Vec<&str> = events
            .iter()
            .filter(|e| e.is_line())
            .map(StreamEvent::text)
            .collect();
        assert_eq!(lines[..2], [expected.as_str(), expected.as_str()]);
        // One column per announced field, after the timestamp
        assert_eq!(lines[2].split(',').count(), 3);
    }

    #[tokio::test]
    async fn test_missing_port_rejected() {
        let (factory, manager) = manager(fast());
        for port in ["", "   "] {
            match manager.start(port).await {
                Err(BridgeError::InvalidRequest(msg)) => assert_eq!(msg, "missing port"),
                other => panic!("Expected InvalidRequest, got {:?}", other),
            }
        }
        assert!(factory.opened().is_empty());
        assert_eq!(manager.status().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_without_session_is_noop() {
        let (_factory, manager) = manager(fast());
        manager.stop().await.unwrap();
        manager.stop().await.unwrap();
        assert_eq!(manager.status().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_stream_stop() {
        let (factory, manager) = manager(fast());
        let mut viewer = manager.hub().subscribe();

        manager.start("/dev/ttyUSB0").await.unwrap();
        wait_for(&mut viewer, "DATA ").await;

        let status = manager.status();
        assert_eq!(status.state, SessionState::Streaming);
        assert_eq!(status.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(status.ecu.as_deref(), Some("SIMK43 8mbit"));
        assert!(status.started_at.is_some());

        manager.stop().await.unwrap();
        assert_eq!(manager.status().state, SessionState::Stopped);
        assert!(!factory.last_opened().unwrap().is_open());
        wait_for(&mut viewer, "Session on /dev/ttyUSB0 terminated").await;

        // Second stop is a no-op
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_terminates_previous_first() {
        let (factory, manager) = manager(fast());
        let mut viewer = manager.hub().subscribe();

        manager.start("/dev/ttyUSB0").await.unwrap();
        manager.start("/dev/ttyUSB1").await.unwrap();

        let events = wait_for(&mut viewer, "Starting session on /dev/ttyUSB1").await;
        let texts: Vec<&str> = events.iter().map(StreamEvent::text).collect();
        let terminated = texts
            .iter()
            .position(|t| *t == "Session on /dev/ttyUSB0 terminated")
            .expect("first session terminated");
        assert_eq!(terminated, texts.len() - 2);

        wait_for(&mut viewer, "Logging..").await;
        let opened = factory.opened();
        assert_eq!(opened.len(), 2);
        assert!(!opened[0].is_open());
        assert_eq!(manager.status().port.as_deref(), Some("/dev/ttyUSB1"));

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_during_slow_bring_up() {
        let (factory, manager) = manager(fast());
        factory.on_open(|t| t.set_delay(0x23, Duration::from_secs(30)));
        let mut viewer = manager.hub().subscribe();

        manager.start("/dev/ttyUSB0").await.unwrap();
        wait_for(&mut viewer, "Trying to identify ECU automatically..").await;

        tokio::time::timeout(Duration::from_secs(3), manager.stop())
            .await
            .expect("stop returns promptly")
            .unwrap();
        assert_eq!(manager.status().state, SessionState::Stopped);

        let events = wait_for(&mut viewer, "Session on /dev/ttyUSB0 terminated").await;
        assert!(!events.iter().any(|e| e.text() == "Logging.."));
    }

    #[tokio::test]
    async fn test_bring_up_failure_sets_error() {
        let (factory, manager) = manager(fast());
        factory.set_unavailable("/dev/ttyUSB3");
        let mut viewer = manager.hub().subscribe();

        manager.start("/dev/ttyUSB3").await.unwrap();
        wait_for(&mut viewer, "Session on /dev/ttyUSB3 terminated").await;
        assert_eq!(manager.status().state, SessionState::Error);

        // Finished sessions are reaped quietly
        manager.stop().await.unwrap();
        assert_eq!(manager.status().state, SessionState::Error);
    }

    #[tokio::test]
    async fn test_list_ports() {
        let (_factory, manager) = manager(fast());
        let ports = manager.list_ports().await.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_custom_identification_table() {
        let (_factory, manager) = manager(fast());
        let manager = manager.with_identification_table(vec![IdentificationEntry::new(
            0x82014,
            &[b"6621"],
            crate::identify::EcuDescriptor::new("Bench ECU", 0, 1024),
        )]);
        let mut viewer = manager.hub().subscribe();

        manager.start("/dev/ttyUSB0").await.unwrap();
        wait_for(&mut viewer, "Found! Bench ECU").await;
        manager.stop().await.unwrap();
    }
}
