// SOAP addressing and transport envelopes
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::HubEndpoint;
use crate::error::ParseFailure;

// The OTA message families exchanged with the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    InventoryCountNotif,
    RateNotif,
    ReservationNotif,
    ReservationNotifAck,
    InvBlockNotif,
}

impl MessageType {
    pub fn request_root(&self) -> &'static str {
        match self {
            MessageType::InventoryCountNotif => "OTA_HotelInvCountNotifRQ",
            MessageType::RateNotif => "OTA_HotelRateNotifRQ",
            MessageType::ReservationNotif => "OTA_HotelResNotifRQ",
            MessageType::ReservationNotifAck => "OTA_HotelResNotifRS",
            MessageType::InvBlockNotif => "OTA_HotelInvBlockNotifRQ",
        }
    }

    pub fn response_root(&self) -> &'static str {
        match self {
            MessageType::InventoryCountNotif => "OTA_HotelInvCountNotifRS",
            MessageType::RateNotif => "OTA_HotelRateNotifRS",
            MessageType::ReservationNotif | MessageType::ReservationNotifAck => {
                "OTA_HotelResNotifRS"
            }
            MessageType::InvBlockNotif => "OTA_HotelInvBlockNotifRS",
        }
    }

    pub fn action(&self) -> String {
        format!("http://htng.org/2011B/{}", self.request_root())
    }

    pub fn schema_file(&self) -> String {
        format!("{}.xsd", self.request_root())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Addressing and security data for one outbound message. Built fresh per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapHeader {
    pub message_id: String,
    pub to: String,
    pub reply_to: String,
    pub action: String,
    pub hotel_code: String,
    pub credentials: Credentials,
    pub timestamp: DateTime<Utc>,
    pub echo_token: String,
}

impl SoapHeader {
    pub fn new(message_type: MessageType, hotel_code: &str, endpoint: &HubEndpoint) -> Self {
        Self {
            message_id: format!("urn:uuid:{}", Uuid::new_v4()),
            to: endpoint.url.clone(),
            reply_to: endpoint.reply_to.clone(),
            action: message_type.action(),
            hotel_code: hotel_code.to_string(),
            credentials: Credentials {
                username: endpoint.username.clone(),
                password: endpoint.password.clone(),
            },
            timestamp: Utc::now(),
            echo_token: Uuid::new_v4().to_string(),
        }
    }

    // Same addressing, new correlation identifiers. Used for every shard of a split batch.
    pub fn regenerate(&self) -> Self {
        Self {
            message_id: format!("urn:uuid:{}", Uuid::new_v4()),
            echo_token: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_echo_token(mut self, echo_token: impl Into<String>) -> Self {
        self.echo_token = echo_token.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_action(mut self, message_type: MessageType) -> Self {
        self.action = message_type.action();
        self
    }

    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapRequest {
    pub message_id: String,
    pub action: String,
    pub body: String,
    pub hotel_code: String,
    pub headers: BTreeMap<String, String>,
}

impl SoapRequest {
    pub fn new(header: &SoapHeader, body: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "text/xml; charset=utf-8".to_string(),
        );
        headers.insert("SOAPAction".to_string(), header.action.clone());
        Self {
            message_id: header.message_id.clone(),
            action: header.action.clone(),
            body,
            hotel_code: header.hotel_code.clone(),
            headers,
        }
    }
}

// Outcome of parsing one hub reply, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapResponse {
    pub message_id: Option<String>,
    pub success: bool,
    pub raw: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
    pub echo_token: Option<String>,
    pub duration: Option<Duration>,
    pub failure: Option<ParseFailure>,
}

impl SoapResponse {
    pub fn success(raw: &str) -> Self {
        Self {
            message_id: None,
            success: true,
            raw: raw.to_string(),
            error_code: None,
            error_message: None,
            warnings: Vec::new(),
            echo_token: None,
            duration: None,
            failure: None,
        }
    }

    pub fn failure(raw: &str, failure: ParseFailure) -> Self {
        Self {
            message_id: None,
            success: false,
            raw: raw.to_string(),
            error_code: Some(failure.code()),
            error_message: Some(failure.message()),
            warnings: Vec::new(),
            echo_token: None,
            duration: None,
            failure: Some(failure),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    // Turns a successful result into a failure, keeping what was already recovered.
    pub fn into_failure(mut self, failure: ParseFailure) -> Self {
        self.success = false;
        self.error_code = Some(failure.code());
        self.error_message = Some(failure.message());
        self.failure = Some(failure);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> HubEndpoint {
        HubEndpoint {
            url: "https://hub.test/htng".to_string(),
            reply_to: "https://pms.test/reply".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    #[test]
    fn test_header_has_fresh_identifiers() {
        let a = SoapHeader::new(MessageType::RateNotif, "HOTEL1", &endpoint());
        let b = a.regenerate();
        assert!(a.message_id.starts_with("urn:uuid:"));
        assert_ne!(a.message_id, b.message_id);
        assert_ne!(a.echo_token, b.echo_token);
        assert_eq!(a.hotel_code, b.hotel_code);
        assert_eq!(a.action, "http://htng.org/2011B/OTA_HotelRateNotifRQ");
    }

    #[test]
    fn test_request_carries_soap_action() {
        let header = SoapHeader::new(MessageType::InventoryCountNotif, "HOTEL1", &endpoint());
        let request = SoapRequest::new(&header, "<xml/>".to_string());
        assert_eq!(request.message_id, header.message_id);
        assert_eq!(request.headers["SOAPAction"], header.action);
    }

    #[test]
    fn test_failure_response_copies_reason() {
        let response = SoapResponse::failure("", ParseFailure::MissingEnvelope);
        assert!(!response.success);
        assert_eq!(response.error_code.as_deref(), Some("MISSING_ENVELOPE"));
    }
}
