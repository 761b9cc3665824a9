//! Seed/key security access
//!
//! The unlock is attempted once per session during bring-up. The outcome is
//! reported to the caller, which decides whether a failure matters.

use tracing::debug;

use crate::kwp::{KwpError, KwpService};

const KEY_INITIAL: u16 = 0x9360;
const KEY_ROUNDS: usize = 36;

/// Compute the security key for a seed
pub fn compute_key(seed: u16) -> u16 {
    (0..KEY_ROUNDS).fold(KEY_INITIAL, |acc, _| (acc << 1) ^ seed)
}

/// Result of a successful unlock exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// ECU answered with a zero seed, no key was sent
    AlreadyUnlocked,
    /// Key was computed and accepted
    Unlocked { seed: u16, key: u16 },
}

/// Request a seed and answer it with the computed key
pub async fn unlock(service: &KwpService) -> Result<UnlockOutcome, KwpError> {
    let seed = service.request_seed().await?;
    let [hi, lo] = match seed.as_slice() {
        [hi, lo, ..] => [*hi, *lo],
        _ => {
            return Err(KwpError::InvalidResponse(format!(
                "Seed too short: {} byte(s)",
                seed.len()
            )))
        }
    };

    if hi == 0 && lo == 0 {
        debug!("ECU reports security already unlocked");
        return Ok(UnlockOutcome::AlreadyUnlocked);
    }

    let seed = u16::from_be_bytes([hi, lo]);
    let key = compute_key(seed);
    debug!(seed = format!("0x{:04X}", seed), key = format!("0x{:04X}", key), "Sending key");
    service.send_key(key).await?;

    Ok(UnlockOutcome::Unlocked { seed, key })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::MockConfig;
    use crate::kwp::NegativeResponseCode;
    use crate::transport::mock::MockTransport;

    #[test]
    fn test_compute_key_vectors() {
        assert_eq!(compute_key(0x0000), 0x0000);
        assert_eq!(compute_key(0x0001), 0xFFFF);
        assert_eq!(compute_key(0x1234), 0xF1EC);
        assert_eq!(compute_key(0x3A5C), 0x1634);
        assert_eq!(compute_key(0xFFFF), 0x5555);
        assert_eq!(compute_key(0xBEEF), 0x95A5);
    }

    #[test]
    fn test_compute_key_is_deterministic() {
        for seed in [0u16, 7, 0x8000, 0xA5A5, u16::MAX] {
            assert_eq!(compute_key(seed), compute_key(seed));
        }
    }

    #[tokio::test]
    async fn test_unlock_sends_computed_key() {
        let mock = Arc::new(MockTransport::new("/dev/ttyUSB0", MockConfig::default()));
        let service = KwpService::new(mock.clone());

        let outcome = unlock(&service).await.unwrap();
        assert_eq!(
            outcome,
            UnlockOutcome::Unlocked {
                seed: 0x3A5C,
                key: 0x1634
            }
        );
        assert!(mock.is_unlocked());
        assert_eq!(
            mock.requests_for(0x27),
            vec![vec![0x27, 0x01], vec![0x27, 0x02, 0x16, 0x34]]
        );
    }

    #[tokio::test]
    async fn test_zero_seed_skips_key() {
        let mock = Arc::new(MockTransport::new("/dev/ttyUSB0", MockConfig::default()));
        mock.add_response(vec![0x27, 0x01], vec![0x67, 0x01, 0x00, 0x00]);
        let service = KwpService::new(mock.clone());

        assert_eq!(
            unlock(&service).await.unwrap(),
            UnlockOutcome::AlreadyUnlocked
        );
        assert_eq!(mock.requests_for(0x27).len(), 1);
    }

    #[tokio::test]
    async fn test_short_seed_is_invalid() {
        let mock = Arc::new(MockTransport::new("/dev/ttyUSB0", MockConfig::default()));
        mock.add_response(vec![0x27, 0x01], vec![0x67, 0x01, 0x12]);
        let service = KwpService::new(mock);

        assert!(matches!(
            unlock(&service).await,
            Err(KwpError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let mock = Arc::new(MockTransport::new("/dev/ttyUSB0", MockConfig::default()));
        mock.add_response(vec![0x27, 0x02], vec![0x7F, 0x27, 0x35]);
        let service = KwpService::new(mock);

        assert_eq!(
            unlock(&service).await,
            Err(KwpError::NegativeResponse {
                service_id: 0x27,
                nrc: NegativeResponseCode::InvalidKey
            })
        );
    }
}
