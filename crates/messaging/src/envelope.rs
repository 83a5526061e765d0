//! JSON envelope exchanged over the broker.
//!
//! ```json
//! {"type":"order.deleted","order":{"orderID":7,"customerID":3},"timestamp":"2025-01-01T00:00:00Z"}
//! {"type":"product.created","product":{"id":42},"timestamp":"2025-01-01T00:00:00Z"}
//! ```

use chrono::{DateTime, Utc};
use common::{CustomerId, EventType, OrderId, ProductId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::CodecError;

/// An event as it travels over the broker. Payload fields sit next to `type`
/// and `timestamp` at the top level of the JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P> {
    #[serde(rename = "type")]
    pub event_type: EventType,

    #[serde(flatten)]
    pub payload: P,

    pub timestamp: DateTime<Utc>,
}

impl<P> EventEnvelope<P> {
    /// Wraps a payload, stamping it with the current time.
    pub fn new(event_type: EventType, payload: P) -> Self {
        Self {
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Order summary published with `order.*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedOrder {
    #[serde(rename = "orderID")]
    pub order_id: OrderId,

    #[serde(rename = "customerID")]
    pub customer_id: CustomerId,

    #[serde(rename = "productIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub product_ids: Vec<ProductId>,
}

/// Reference to an entity owned by another service. Fields other than `id`
/// are accepted and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef<Id> {
    pub id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order: SimplifiedOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub customer: EntityRef<CustomerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPayload {
    pub product: EntityRef<ProductId>,
}

/// Serializes an envelope to its wire bytes.
pub fn encode<P: Serialize>(envelope: &EventEnvelope<P>) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Parses wire bytes into an envelope with the expected payload shape.
pub fn decode<P: DeserializeOwned>(body: &[u8]) -> Result<EventEnvelope<P>, CodecError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_envelope_wire_format() {
        let envelope = EventEnvelope {
            event_type: EventType::OrderDeleted,
            payload: OrderPayload {
                order: SimplifiedOrder {
                    order_id: OrderId::new(7),
                    customer_id: CustomerId::new(3),
                    product_ids: Vec::new(),
                },
            },
            timestamp: "2025-01-01T00:00:00Z".parse().unwrap(),
        };

        let json: serde_json::Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "order.deleted",
                "order": {"orderID": 7, "customerID": 3},
                "timestamp": "2025-01-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn order_envelope_carries_product_ids() {
        let envelope = EventEnvelope::new(
            EventType::OrderCreated,
            OrderPayload {
                order: SimplifiedOrder {
                    order_id: OrderId::new(1),
                    customer_id: CustomerId::new(2),
                    product_ids: vec![ProductId::new(10), ProductId::new(11)],
                },
            },
        );
        let json: serde_json::Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(json["order"]["productIDs"], serde_json::json!([10, 11]));

        let decoded: EventEnvelope<OrderPayload> = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn foreign_payload_ignores_extra_fields() {
        let body = br#"{
            "type": "product.updated",
            "product": {"id": 42, "name": "Arabica", "price": 12.5},
            "timestamp": "2025-03-04T10:00:00+01:00"
        }"#;

        let envelope: EventEnvelope<ProductPayload> = decode(body).unwrap();
        assert_eq!(envelope.event_type, EventType::ProductUpdated);
        assert_eq!(envelope.payload.product.id, ProductId::new(42));
    }

    #[test]
    fn decode_rejects_wrong_payload_shape() {
        let body = br#"{"type":"customer.created","customer":{"id":1},"timestamp":"2025-01-01T00:00:00Z"}"#;
        let result = decode::<ProductPayload>(body);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode::<CustomerPayload>(b"not json").is_err());
        assert!(decode::<CustomerPayload>(br#"{"type":"customer.exploded","customer":{"id":1},"timestamp":"2025-01-01T00:00:00Z"}"#).is_err());
    }
}
