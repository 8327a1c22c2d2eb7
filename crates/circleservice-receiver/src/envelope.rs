//! The delivered-message unit.
//!
//! An [`Envelope`] is constructed from a wire entity immediately before
//! delivery to the caller's callback, and is done with once its
//! acknowledgment has been attempted. Addressing is a tag, not a
//! subtype: downstream code matches on [`Addressing`] instead of
//! testing dynamic types.

use circleservice_transport::EnvelopeEntity;
use circleservice_types::{CircleError, Result, ServiceAddress};

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// How the sender of an envelope is identified.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Addressing {
    /// Modern delivery: sender identity plus device index (> 0).
    Addressed {
        /// Sender identity.
        source: ServiceAddress,
        /// Sender device index.
        source_device: u32,
    },
    /// Legacy or server-anonymous delivery; no usable sender identity
    /// on the envelope itself.
    Legacy,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One delivered message unit, before application-level decryption.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Envelope type tag, as assigned by the sender.
    pub entity_type: u32,
    /// Client-assigned timestamp, epoch milliseconds.
    pub timestamp: u64,
    /// Legacy-format ciphertext body.
    pub legacy_message: Option<Vec<u8>>,
    /// Modern-format ciphertext body.
    pub content: Option<Vec<u8>>,
    /// Server receipt timestamp, epoch milliseconds.
    pub server_timestamp: u64,
    /// Server-assigned unique id; absent on legacy servers.
    pub server_uuid: Option<String>,
    /// Addressing tag.
    pub addressing: Addressing,
}

impl Envelope {
    /// Builds an envelope from a wire entity.
    ///
    /// The addressed variant is chosen exactly when the entity carries
    /// both a source and a device index greater than zero.
    ///
    /// # Errors
    ///
    /// [`CircleError::InvalidMessage`] if the entity carries neither a
    /// legacy nor a modern body, or a malformed source.
    pub fn from_entity(entity: EnvelopeEntity) -> Result<Self> {
        if entity.message.is_none() && entity.content.is_none() {
            return Err(CircleError::InvalidMessage {
                reason: "envelope entity has neither legacy nor modern body".into(),
            });
        }

        let addressing = match (&entity.source, entity.source_device) {
            (Some(source), device) if device > 0 => Addressing::Addressed {
                source: source.parse()?,
                source_device: device,
            },
            _ => Addressing::Legacy,
        };

        Ok(Self {
            entity_type: entity.entity_type,
            timestamp: entity.timestamp,
            legacy_message: entity.message,
            content: entity.content,
            server_timestamp: entity.server_timestamp,
            server_uuid: entity.server_uuid,
            addressing,
        })
    }

    /// Returns `true` if this envelope carries a server-assigned id.
    pub fn has_uuid(&self) -> bool {
        self.server_uuid.is_some()
    }

    /// Returns the sender identity for addressed envelopes.
    pub fn source(&self) -> Option<&ServiceAddress> {
        match &self.addressing {
            Addressing::Addressed { source, .. } => Some(source),
            Addressing::Legacy => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_with_body() -> EnvelopeEntity {
        EnvelopeEntity {
            entity_type: 1,
            content: Some(vec![0xAA]),
            timestamp: 1_700_000_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn source_and_positive_device_is_addressed() -> Result<()> {
        let mut entity = entity_with_body();
        entity.source = Some("+14151112222".into());
        entity.source_device = 2;

        let envelope = Envelope::from_entity(entity)?;
        match envelope.addressing {
            Addressing::Addressed {
                ref source,
                source_device,
            } => {
                assert_eq!(source.as_str(), "+14151112222");
                assert_eq!(source_device, 2);
            }
            Addressing::Legacy => panic!("expected addressed variant"),
        }
        Ok(())
    }

    #[test]
    fn zero_device_is_legacy_even_with_source() -> Result<()> {
        let mut entity = entity_with_body();
        entity.source = Some("+14151112222".into());
        entity.source_device = 0;

        let envelope = Envelope::from_entity(entity)?;
        assert_eq!(envelope.addressing, Addressing::Legacy);
        assert!(envelope.source().is_none());
        Ok(())
    }

    #[test]
    fn missing_source_is_legacy() -> Result<()> {
        let mut entity = entity_with_body();
        entity.source_device = 3;

        let envelope = Envelope::from_entity(entity)?;
        assert_eq!(envelope.addressing, Addressing::Legacy);
        Ok(())
    }

    #[test]
    fn bodyless_entity_rejected() {
        let entity = EnvelopeEntity {
            entity_type: 1,
            ..Default::default()
        };
        assert!(matches!(
            Envelope::from_entity(entity),
            Err(CircleError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn legacy_body_alone_satisfies_invariant() -> Result<()> {
        let entity = EnvelopeEntity {
            entity_type: 1,
            message: Some(vec![0x01]),
            ..Default::default()
        };
        let envelope = Envelope::from_entity(entity)?;
        assert!(envelope.legacy_message.is_some());
        assert!(envelope.content.is_none());
        Ok(())
    }
}
