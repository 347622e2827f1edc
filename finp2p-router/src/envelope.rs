use ed25519_dalek::VerifyingKey;
use finp2p_common::crypto::RouterSigner;
use finp2p_common::error::FinP2PError;
use finp2p_common::time::current_time_ms;
use finp2p_common::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inter-router message types (spec §6.3). `Unknown` absorbs any value the
/// wire sends that this build doesn't recognize, so deserialization never
/// fails on a forward-incompatible type — the dispatcher logs and ignores
/// it instead (spec §4.7: "unknown message types are logged and ignored").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Heartbeat,
    TransferRequest,
    TransferResponse,
    RouteDiscovery,
    RouteResponse,
    Error,
    #[serde(other)]
    Unknown,
}

/// Signed inter-router message envelope (spec §6.3). The signature covers
/// only the canonical serialization of `payload`; the envelope fields
/// around it (routing, ttl, timestamp) are not themselves authenticated,
/// matching the spec's literal wording ("signature is over the canonical
/// serialization of payload").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub from_router: String,
    pub to_router: String,
    pub payload: serde_json::Value,
    pub signature: Vec<u8>,
    pub timestamp: u64,
    pub ttl: u64,
}

impl RouterMessage {
    /// Builds and signs a new envelope.
    pub fn sign(
        signer: &RouterSigner,
        message_type: MessageType,
        from_router: impl Into<String>,
        to_router: impl Into<String>,
        payload: serde_json::Value,
        ttl_ms: u64,
    ) -> Result<Self> {
        let signature = signer.sign(&payload)?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            from_router: from_router.into(),
            to_router: to_router.into(),
            payload,
            signature,
            timestamp: current_time_ms(),
            ttl: ttl_ms,
        })
    }

    /// Verifies the payload signature against the claimed sender's key.
    /// Callers MUST do this before dispatch (spec §4.7).
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<()> {
        finp2p_common::crypto::verify(verifying_key, &self.payload, &self.signature)
    }

    /// `now - timestamp > ttl` messages MUST be dropped (spec §6.3).
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) > self.ttl
    }
}

/// Parses a hex-encoded Ed25519 public key as stored in the peer roster.
pub fn parse_verifying_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(hex_key).map_err(|e| FinP2PError::Other(format!("invalid public key hex: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| FinP2PError::Other("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&array).map_err(|e| FinP2PError::Other(format!("invalid public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signed_envelope_round_trips_verification() {
        let signer = RouterSigner::generate();
        let msg = RouterMessage::sign(&signer, MessageType::Heartbeat, "router-a", "router-b", json!({"ping": true}), 30_000).unwrap();
        msg.verify(&signer.verifying_key()).unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signer = RouterSigner::generate();
        let mut msg = RouterMessage::sign(&signer, MessageType::Heartbeat, "router-a", "router-b", json!({"ping": true}), 30_000).unwrap();
        msg.payload = json!({"ping": false});
        assert!(msg.verify(&signer.verifying_key()).is_err());
    }

    #[test]
    fn message_past_ttl_is_expired() {
        let signer = RouterSigner::generate();
        let msg = RouterMessage::sign(&signer, MessageType::Heartbeat, "router-a", "router-b", json!({}), 10).unwrap();
        assert!(!msg.is_expired(msg.timestamp + 5));
        assert!(msg.is_expired(msg.timestamp + 50));
    }

    #[test]
    fn unknown_message_type_deserializes_without_error() {
        let raw = json!({
            "id": "1", "type": "SOMETHING_NEW", "fromRouter": "a", "toRouter": "b",
            "payload": {}, "signature": [], "timestamp": 0, "ttl": 0
        });
        let msg: RouterMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.message_type, MessageType::Unknown);
    }
}
