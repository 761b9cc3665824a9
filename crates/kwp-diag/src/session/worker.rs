//! Session worker: bring-up sequence and polling loop

use std::sync::Arc;

use chrono::Utc;
use kwp_conv::{decode_source_into, Catalog, TelemetryRecord};
use kwp_core::{BroadcastHub, SessionState, SessionStatus};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::context::SessionContext;
use crate::config::SessionConfig;
use crate::identify::{identify, read_calibration, IdentificationEntry};
use crate::kwp::{service_id, session_type, tester_present, timing_parameter, KwpError, KwpService};
use crate::security::{self, UnlockOutcome};
use crate::transport::{TransportError, TransportFactory};

/// Why a session ended
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("Session cancelled")]
    Cancelled,

    #[error("Cannot open {port}: {source}")]
    Open {
        port: String,
        source: TransportError,
    },

    #[error("Initialization failed: {0}")]
    Init(TransportError),

    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        source: KwpError,
    },

    #[error("Polling failed: {0}")]
    Poll(KwpError),
}

pub(crate) struct Worker {
    pub ctx: Arc<SessionContext>,
    pub factory: Arc<dyn TransportFactory>,
    pub hub: BroadcastHub,
    pub catalog: Arc<Catalog>,
    pub table: Arc<Vec<IdentificationEntry>>,
    pub config: SessionConfig,
    pub status: Arc<RwLock<SessionStatus>>,
}

impl Worker {
    pub async fn run(self) {
        let result = self.session().await;

        let final_state = match result {
            Ok(()) | Err(SessionError::Cancelled) => SessionState::Stopped,
            Err(e) if self.ctx.is_cancelled() => {
                debug!(port = %self.ctx.port(), error = %e, "Error after cancellation");
                SessionState::Stopped
            }
            Err(e @ SessionError::Poll(_)) => {
                warn!(port = %self.ctx.port(), error = %e, "Streaming aborted");
                self.hub.log(e.to_string());
                self.set_state(SessionState::Stopping);
                SessionState::Stopped
            }
            Err(e) => {
                warn!(port = %self.ctx.port(), error = %e, "Bring-up failed");
                self.hub.log(format!("Session failed: {}", e));
                SessionState::Error
            }
        };

        self.ctx.release().await;
        self.set_state(final_state);
        self.ctx.announce_termination(&self.hub);
    }

    async fn session(&self) -> Result<(), SessionError> {
        let port = self.ctx.port().to_string();
        self.set_state(SessionState::Connecting);
        self.log(format!("Starting session on {}", port));

        let transport = self
            .factory
            .open(&port)
            .await
            .map_err(|source| SessionError::Open {
                port: port.clone(),
                source,
            })?;
        if !self.ctx.attach(transport.clone()) {
            transport.close().await;
            return Err(SessionError::Cancelled);
        }
        let kwp = KwpService::new(transport.clone());

        if let Err(e) = kwp.stop_diagnostic_session().await {
            debug!(error = %e, "No stale diagnostic session to stop");
        }
        self.check_cancelled()?;

        transport.set_timeout(self.config.default_timeout());
        self.log("Selected protocol: kline. Initializing..");
        transport
            .init(
                &[service_id::START_COMMUNICATION],
                &[service_id::TESTER_PRESENT, tester_present::RESPONSE_REQUIRED],
                self.config.keepalive_interval(),
            )
            .await
            .map_err(SessionError::Init)?;
        self.check_cancelled()?;

        self.log("Trying to start diagnostic session");
        kwp.start_diagnostic_session(session_type::FLASH_REPROGRAMMING)
            .await
            .map_err(|source| SessionError::Step {
                step: "Flash diagnostic session",
                source,
            })?;
        transport.set_timeout(self.config.bringup_timeout());

        self.enter(SessionState::TimingNegotiation)?;
        self.log("Set timing parameters to maximum");
        match negotiate_timing(&kwp).await {
            Ok(true) => debug!("Timing parameters applied"),
            Ok(false) => self.log("Timing limits incomplete, keeping defaults"),
            Err(e) => self.log(format!("Timing parameters not applied: {}", e)),
        }

        self.enter(SessionState::SecurityUnlock)?;
        self.log("Security Access");
        match security::unlock(&kwp).await {
            Ok(UnlockOutcome::AlreadyUnlocked) => self.log("Security access already granted"),
            Ok(UnlockOutcome::Unlocked { .. }) => self.log("Security access granted"),
            Err(e) => self.log(format!("Security access failed: {}", e)),
        }

        self.enter(SessionState::Identifying)?;
        self.identify_ecu(&kwp).await?;

        kwp.start_diagnostic_session(session_type::DEFAULT)
            .await
            .map_err(|source| SessionError::Step {
                step: "Default diagnostic session",
                source,
            })?;
        transport.set_timeout(self.config.default_timeout());

        self.log("Building parameter header");
        self.hub.publish(self.hub.handshake().clone());

        self.log("Logging..");
        self.enter(SessionState::Streaming)?;
        self.poll(&kwp).await
    }

    async fn identify_ecu(&self, kwp: &KwpService) -> Result<(), SessionError> {
        self.log("Trying to identify ECU automatically..");
        let Some(ecu) = identify(kwp, &self.table).await else {
            self.log("ECU not identified, continuing without calibration info");
            return self.check_cancelled();
        };

        self.log(format!("Found! {}", ecu.name));
        self.status.write().ecu = Some(ecu.name.clone());
        self.check_cancelled()?;

        self.log("Trying to find calibration..");
        match read_calibration(kwp, &ecu).await {
            Ok(info) => self.log(format!(
                "Found! Description: {}, calibration: {}",
                info.description, info.calibration
            )),
            Err(e) => self.log(format!("Calibration read failed: {}", e)),
        }
        self.check_cancelled()
    }

    async fn poll(&self, kwp: &KwpService) -> Result<(), SessionError> {
        let mut values = Vec::with_capacity(self.catalog.parameter_count());

        loop {
            if self.ctx.is_cancelled() {
                return Ok(());
            }

            values.clear();
            for source in self.catalog.sources() {
                let block = kwp
                    .read_data_by_local_id(source.local_identifier)
                    .await
                    .map_err(SessionError::Poll)?;
                decode_source_into(&block, source, &mut values);
            }

            let record = TelemetryRecord::new(Utc::now().timestamp_millis(), values.clone());
            self.hub.line(record.to_line());

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    fn enter(&self, state: SessionState) -> Result<(), SessionError> {
        self.check_cancelled()?;
        self.set_state(state);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.ctx.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut status = self.status.write();
        if status.state != state {
            debug!(port = %self.ctx.port(), from = %status.state, to = %state, "Session state");
            status.state = state;
        }
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(port = %self.ctx.port(), "{}", message);
        self.hub.log(message);
    }
}

/// Read the timing limits and apply them
///
/// Returns `false` when the ECU reports fewer values than can be set.
async fn negotiate_timing(kwp: &KwpService) -> Result<bool, KwpError> {
    let limits = kwp.read_timing_limits().await?;
    let Some(values) = limits.get(..timing_parameter::VALUE_COUNT) else {
        return Ok(false);
    };
    kwp.set_timing_parameters(values).await?;
    Ok(true)
}
