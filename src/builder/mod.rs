// XML builders: shared envelope handling plus one builder per message family
pub mod block;
pub mod inventory;
pub mod rate;
pub mod reservation;
pub mod schema;
pub mod tree;

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::config::{CodeRules, CodecConfig};
use crate::error::CodecError;
use crate::model::common::parse_date;
use crate::model::inventory::InventoryScope;
use crate::model::reservation::{
    Guest, Reservation, ReservationDraft, ReservationType, TransactionMode,
};
use crate::model::soap::{MessageType, SoapHeader, SoapRequest};
use crate::model::DateRange;
use crate::validation::RuleContext;

pub use block::InvBlockNotifBuilder;
pub use inventory::InventoryNotifBuilder;
pub use rate::RateNotifBuilder;
pub use reservation::{ReservationAckBuilder, ReservationNotifBuilder};
pub use schema::{RequiredElementsValidator, SchemaValidator};
pub use tree::Element;

pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
pub const HTNG_HEADER_NS: &str = "http://htng.org/1.3/Header/";
pub const OTA_NS: &str = "http://www.opentravel.org/OTA/2003/05";
const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

// Everything a builder needs besides the data itself.
#[derive(Clone)]
pub struct BuilderContext {
    config: Arc<CodecConfig>,
    codes: Arc<CodeRules>,
    header: SoapHeader,
    schema_validator: Option<Arc<dyn SchemaValidator>>,
    today: Option<NaiveDate>,
}

impl fmt::Debug for BuilderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderContext")
            .field("header", &self.header)
            .field("schema_validator", &self.schema_validator.is_some())
            .field("today", &self.today)
            .finish()
    }
}

impl BuilderContext {
    pub fn new(config: CodecConfig, header: SoapHeader) -> Result<Self, CodecError> {
        let codes = CodeRules::compile(&config)?;
        Ok(Self {
            config: Arc::new(config),
            codes: Arc::new(codes),
            header,
            schema_validator: None,
            today: None,
        })
    }

    pub fn with_schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.schema_validator = Some(validator);
        self
    }

    // Pins "today" for the past-date checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_header(&self, header: SoapHeader) -> Self {
        Self {
            header,
            ..self.clone()
        }
    }

    // Same settings, fresh message id and echo token.
    pub fn next_message(&self) -> Self {
        self.with_header(self.header.regenerate())
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn header(&self) -> &SoapHeader {
        &self.header
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn rules(&self) -> RuleContext<'_> {
        RuleContext {
            config: &self.config,
            codes: &self.codes,
            today: self.today(),
        }
    }

    // Body root with the attributes every OTA request carries.
    pub fn body_root(&self, message_type: MessageType) -> Element {
        Element::new(message_type.request_root())
            .attr("xmlns", OTA_NS)
            .attr("EchoToken", &self.header.echo_token)
            .attr("TimeStamp", self.header.timestamp_iso())
            .attr("Target", self.config.target.as_str())
            .attr("Version", &self.config.version)
    }

    // Validates `value` against the configured date format and returns it as ISO 8601.
    pub fn format_date(&self, value: &str) -> Result<String, CodecError> {
        Ok(iso_date(parse_date(value, &self.config.date_format)?))
    }

    // Reads an inbound start/end pair in the configured date format.
    pub fn date_range(&self, start: &str, end: &str) -> Result<DateRange, CodecError> {
        Ok(DateRange::parse(start, end, &self.config.date_format)?)
    }

    // Starts a reservation for the header's hotel in the configured default currency.
    pub fn reservation_draft(
        &self,
        reservation_type: ReservationType,
        transaction: TransactionMode,
        reservation_id: &str,
        primary_guest: Guest,
    ) -> ReservationDraft {
        Reservation::draft(
            reservation_type,
            transaction,
            reservation_id,
            &self.header.hotel_code,
            primary_guest,
        )
        .currency(&self.config.default_currency)
    }

    // Wraps a body in the SOAP envelope, serializes it and runs the schema check.
    pub fn render(&self, message_type: MessageType, body: Element) -> Result<String, CodecError> {
        let envelope = envelope(&self.header, body);
        let xml = envelope.to_xml(self.config.pretty_print)?;

        if let Some(validator) = &self.schema_validator {
            validator
                .validate(message_type, &xml)
                .map_err(|errors| CodecError::Schema {
                    message_type,
                    errors,
                })?;
        }
        debug!(
            message_type = ?message_type,
            message_id = %self.header.message_id,
            bytes = xml.len(),
            "built message"
        );
        Ok(xml)
    }
}

// `build` validates first, so a message is either complete and valid or not produced at all.
pub trait MessageBuilder {
    type Input: ?Sized;

    fn message_type(&self) -> MessageType;

    fn context(&self) -> &BuilderContext;

    fn validate(&self, data: &Self::Input) -> Result<(), CodecError>;

    fn build_body(&self, data: &Self::Input) -> Result<Element, CodecError>;

    fn build(&self, data: &Self::Input) -> Result<String, CodecError> {
        self.validate(data)?;
        let body = self.build_body(data)?;
        self.context().render(self.message_type(), body)
    }

    fn build_request(&self, data: &Self::Input) -> Result<SoapRequest, CodecError> {
        let xml = self.build(data)?;
        Ok(SoapRequest::new(self.context().header(), xml))
    }
}

pub fn envelope(header: &SoapHeader, body: Element) -> Element {
    Element::new("soap:Envelope")
        .attr("xmlns:soap", SOAP_ENV_NS)
        .attr("xmlns:wsa", WSA_NS)
        .attr("xmlns:wsse", WSSE_NS)
        .attr("xmlns:wsu", WSU_NS)
        .attr("xmlns:htnga", HTNG_HEADER_NS)
        .child(header_element(header))
        .child(Element::new("soap:Body").child(body))
}

fn header_element(header: &SoapHeader) -> Element {
    Element::new("soap:Header")
        .child(Element::new("wsa:MessageID").text(&header.message_id))
        .child(Element::new("wsa:To").text(&header.to))
        .child(
            Element::new("wsa:ReplyTo")
                .child(Element::new("wsa:Address").text(&header.reply_to)),
        )
        .child(Element::new("wsa:Action").text(&header.action))
        .child(Element::new("htnga:HotelCode").text(&header.hotel_code))
        .child(
            Element::new("wsse:Security")
                .attr("soap:mustUnderstand", "1")
                .child(
                    Element::new("wsse:UsernameToken")
                        .child(Element::new("wsse:Username").text(&header.credentials.username))
                        .child(
                            Element::new("wsse:Password")
                                .attr("Type", PASSWORD_TEXT)
                                .text(&header.credentials.password),
                        )
                        .child(Element::new("wsu:Created").text(header.timestamp_iso())),
                ),
        )
}

// `StatusApplicationControl` for a date range and either one room type or the whole property.
pub fn status_application_control(range: DateRange, scope: &InventoryScope) -> Element {
    let element = Element::new("StatusApplicationControl")
        .attr("Start", range.start().format("%Y-%m-%d"))
        .attr("End", range.end().format("%Y-%m-%d"));
    match scope {
        InventoryScope::RoomType(code) => element.attr("InvTypeCode", code),
        InventoryScope::Property => element.attr("AllInvCode", "true"),
    }
}

pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::HubEndpoint;
    use chrono::TimeZone;

    pub fn header(message_type: MessageType, hotel: &str) -> SoapHeader {
        let endpoint = HubEndpoint {
            url: "https://hub.test/htng".to_string(),
            reply_to: "https://pms.test/reply".to_string(),
            username: "pms-user".to_string(),
            password: "s3cret".to_string(),
        };
        SoapHeader::new(message_type, hotel, &endpoint)
            .with_message_id("urn:uuid:test-message")
            .with_echo_token("echo-1")
            .with_timestamp(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
    }

    pub fn context(message_type: MessageType, hotel: &str) -> BuilderContext {
        BuilderContext::new(CodecConfig::default(), header(message_type, hotel))
            .unwrap()
            .with_today(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;
    use crate::model::common::range;
    use test_case::test_case;

    #[test]
    fn test_envelope_header_order() {
        let ctx = context(MessageType::InventoryCountNotif, "HOTEL1");
        let env = envelope(ctx.header(), Element::new("Body"));
        let header = env.first("soap:Header").unwrap();
        assert_eq!(
            header.child_names(),
            vec![
                "wsa:MessageID",
                "wsa:To",
                "wsa:ReplyTo",
                "wsa:Action",
                "htnga:HotelCode",
                "wsse:Security"
            ]
        );
        let username = env.find("wsse:Username").unwrap();
        assert_eq!(username.get_text(), Some("pms-user"));
    }

    #[test]
    fn test_body_root_attributes() {
        let ctx = context(MessageType::RateNotif, "HOTEL1");
        let root = ctx.body_root(MessageType::RateNotif);
        assert_eq!(root.name(), "OTA_HotelRateNotifRQ");
        assert_eq!(root.get_attr("EchoToken"), Some("echo-1"));
        assert_eq!(root.get_attr("TimeStamp"), Some("2025-01-02T03:04:05Z"));
        assert_eq!(root.get_attr("Target"), Some("Test"));
        assert_eq!(root.get_attr("Version"), Some("1.0"));
    }

    #[test_case("2025-06-11", Some("2025-06-11"); "iso")]
    #[test_case(" 2025-06-11 ", Some("2025-06-11"); "padded")]
    #[test_case("2025-6-11", None; "unpadded month")]
    #[test_case("11/06/2025", None; "wrong format")]
    fn test_format_date(value: &str, expected: Option<&str>) {
        let ctx = context(MessageType::RateNotif, "HOTEL1");
        assert_eq!(ctx.format_date(value).ok().as_deref(), expected);
    }

    #[test]
    fn test_date_range_uses_configured_format() {
        let config = CodecConfig {
            date_format: "%d.%m.%Y".to_string(),
            ..CodecConfig::default()
        };
        let ctx = BuilderContext::new(
            config,
            super::test_support::header(MessageType::InventoryCountNotif, "HOTEL1"),
        )
        .unwrap();
        assert_eq!(
            ctx.date_range("01.06.2025", "03.06.2025").unwrap(),
            range("2025-06-01", "2025-06-03")
        );
        assert!(ctx.date_range("1.6.2025", "03.06.2025").is_err());
        assert_eq!(ctx.format_date("11.06.2025").unwrap(), "2025-06-11");
    }

    #[test]
    fn test_status_application_control_scope() {
        let r = range("2025-06-01", "2025-06-30");
        let room = status_application_control(r, &InventoryScope::RoomType("KING".into()));
        assert_eq!(room.get_attr("InvTypeCode"), Some("KING"));
        assert_eq!(room.get_attr("AllInvCode"), None);

        let property = status_application_control(r, &InventoryScope::Property);
        assert_eq!(property.get_attr("AllInvCode"), Some("true"));
        assert_eq!(property.get_attr("InvTypeCode"), None);
        assert_eq!(property.get_attr("Start"), Some("2025-06-01"));
    }

    #[test]
    fn test_next_message_changes_identifiers() {
        let ctx = context(MessageType::RateNotif, "HOTEL1");
        let next = ctx.next_message();
        assert_ne!(ctx.header().message_id, next.header().message_id);
        assert_eq!(ctx.header().hotel_code, next.header().hotel_code);
    }
}
