//! KWP2000 service layer for diagnostic communication

use std::sync::Arc;

use tracing::trace;

use super::{
    positive_response, security_sub_function, service_id, timing_parameter, KwpError,
};
use crate::transport::KwpTransport;

/// KWP2000 service layer over a transport
#[derive(Clone)]
pub struct KwpService {
    transport: Arc<dyn KwpTransport>,
}

impl KwpService {
    pub fn new(transport: Arc<dyn KwpTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn KwpTransport> {
        &self.transport
    }

    /// Send a request and return the payload of its positive response
    async fn send_request(&self, service: u8, data: &[u8]) -> Result<Vec<u8>, KwpError> {
        trace!(
            service = format!("0x{:02X}", service),
            request = %hex::encode(data),
            "KWP request"
        );

        let response = self.transport.execute(service, data).await?;

        if response.status != positive_response(service) {
            return Err(KwpError::InvalidResponse(format!(
                "Unexpected response 0x{:02X} to service 0x{:02X}",
                response.status, service
            )));
        }

        trace!(
            service = format!("0x{:02X}", service),
            response = %hex::encode(&response.data),
            "KWP response"
        );
        Ok(response.data)
    }

    /// Start Diagnostic Session (0x10)
    pub async fn start_diagnostic_session(&self, session_type: u8) -> Result<(), KwpError> {
        self.send_request(service_id::START_DIAGNOSTIC_SESSION, &[session_type])
            .await?;
        Ok(())
    }

    /// Stop Diagnostic Session (0x20)
    pub async fn stop_diagnostic_session(&self) -> Result<(), KwpError> {
        self.send_request(service_id::STOP_DIAGNOSTIC_SESSION, &[])
            .await?;
        Ok(())
    }

    /// Access Timing Parameters (0x83 00) - read the ECU's limits
    ///
    /// Returns the timing bytes following the sub-function echo.
    pub async fn read_timing_limits(&self) -> Result<Vec<u8>, KwpError> {
        let response = self
            .send_request(
                service_id::ACCESS_TIMING_PARAMETERS,
                &[timing_parameter::READ_LIMITS],
            )
            .await?;

        Ok(response.get(1..).unwrap_or_default().to_vec())
    }

    /// Access Timing Parameters (0x83 03) - apply timing values
    pub async fn set_timing_parameters(&self, values: &[u8]) -> Result<(), KwpError> {
        let mut request = vec![timing_parameter::SET_VALUES];
        request.extend_from_slice(values);
        self.send_request(service_id::ACCESS_TIMING_PARAMETERS, &request)
            .await?;
        Ok(())
    }

    /// Security Access - Request Seed (0x27 01)
    ///
    /// Returns the seed bytes following the sub-function echo.
    pub async fn request_seed(&self) -> Result<Vec<u8>, KwpError> {
        let response = self
            .send_request(
                service_id::SECURITY_ACCESS,
                &[security_sub_function::REQUEST_SEED],
            )
            .await?;

        Ok(response.get(1..).unwrap_or_default().to_vec())
    }

    /// Security Access - Send Key (0x27 02)
    pub async fn send_key(&self, key: u16) -> Result<(), KwpError> {
        let [hi, lo] = key.to_be_bytes();
        self.send_request(
            service_id::SECURITY_ACCESS,
            &[security_sub_function::SEND_KEY, hi, lo],
        )
        .await?;
        Ok(())
    }

    /// Read Memory By Address (0x23)
    pub async fn read_memory(&self, address: u32, size: u8) -> Result<Vec<u8>, KwpError> {
        let data = self.transport.read_memory(address, size).await?;
        trace!(
            address = format!("0x{:06X}", address),
            data = %hex::encode(&data),
            "Memory read"
        );
        Ok(data)
    }

    /// Read Data By Local Identifier (0x21)
    ///
    /// Returns the full response payload, starting with the local
    /// identifier echo. Parameter offsets are relative to this payload.
    pub async fn read_data_by_local_id(&self, local_id: u8) -> Result<Vec<u8>, KwpError> {
        self.send_request(service_id::READ_DATA_BY_LOCAL_ID, &[local_id])
            .await
    }
}
