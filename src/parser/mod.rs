// Response parsers: shared envelope handling plus one parser per message family
pub mod dom;
pub mod inventory;
pub mod rate;
pub mod reservation;

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::ParseFailure;
use crate::model::common::DateRange;
use crate::model::soap::{MessageType, SoapResponse};

pub use dom::XmlNode;
pub use inventory::{InventoryParser, InventoryResponse};
pub use rate::{DerivationKind, LinkedRatePair, RateBreakdown, RateParser, RateResponse};
pub use reservation::{ReservationParser, ReservationResponse};

// Result of the shared envelope step.
#[derive(Debug, Clone)]
pub enum Envelope {
    // The family root was found; `response` may still be a failure if the hub reported errors.
    Located { response: SoapResponse, root: XmlNode },
    Failed(SoapResponse),
}

// A parser turns raw reply text into a typed result. It never panics and never returns `Err`:
// every failure is carried inside the result.
pub trait ResponseParser {
    type Output;

    fn message_type(&self) -> MessageType;

    // Root element names accepted for this family, most specific first.
    fn roots(&self) -> Vec<&'static str> {
        vec![self.message_type().response_root()]
    }

    fn extract(&self, root: &XmlNode, base: SoapResponse) -> Self::Output;

    fn failed(&self, base: SoapResponse) -> Self::Output;

    fn parse(&self, raw: &str, duration: Option<Duration>) -> Self::Output {
        match parse_envelope(raw, &self.roots(), duration) {
            Envelope::Located { response, root } => self.extract(&root, response),
            Envelope::Failed(response) => self.failed(response),
        }
    }
}

// Parses the XML, detects faults, locates the family root and collects errors,
// warnings and correlation identifiers.
pub fn parse_envelope(raw: &str, roots: &[&str], duration: Option<Duration>) -> Envelope {
    let doc = match XmlNode::parse(raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "unparsable response");
            return Envelope::Failed(
                SoapResponse::failure(raw, ParseFailure::Unparsable(e)).with_duration(duration),
            );
        }
    };

    // A bare OTA payload without SOAP wrapping is accepted as is
    if roots.contains(&doc.name()) {
        let response = base_response(raw, &doc, None).with_duration(duration);
        return Envelope::Located { response, root: doc };
    }

    let body = match (doc.name(), doc.child("Body")) {
        ("Envelope", Some(body)) => body,
        _ => {
            return Envelope::Failed(
                SoapResponse::failure(raw, ParseFailure::MissingEnvelope).with_duration(duration),
            )
        }
    };
    let message_id = doc
        .child("Header")
        .and_then(|h| h.child_text("RelatesTo").or_else(|| h.child_text("MessageID")))
        .map(str::to_string);

    if let Some(fault) = body.child("Fault") {
        let failure = soap_fault(fault);
        warn!(code = %failure.code(), "hub returned a SOAP fault");
        let mut response = SoapResponse::failure(raw, failure).with_duration(duration);
        response.message_id = message_id;
        return Envelope::Failed(response);
    }

    let direct = roots.iter().find_map(|name| body.child(name));
    let root = match direct {
        Some(root) => root,
        None => match roots.iter().find_map(|name| body.find(name)) {
            Some(nested) => {
                debug!(root = nested.name(), "family root found by structural search");
                nested
            }
            None => {
                let expected = roots.first().copied().unwrap_or_default().to_string();
                let mut response = SoapResponse::failure(raw, ParseFailure::MissingRoot(expected))
                    .with_duration(duration);
                response.message_id = message_id;
                return Envelope::Failed(response);
            }
        },
    };

    let response = base_response(raw, root, message_id).with_duration(duration);
    Envelope::Located {
        response,
        root: root.clone(),
    }
}

fn base_response(raw: &str, root: &XmlNode, message_id: Option<String>) -> SoapResponse {
    let mut response = SoapResponse::success(raw);
    response.message_id = message_id;
    response.echo_token = root.attr_non_empty("EchoToken").map(str::to_string);

    if let Some(warnings) = root.child("Warnings") {
        for w in warnings.children_named("Warning") {
            response.warnings.push(describe(w));
        }
    }

    if let Some(errors) = root.child("Errors") {
        let all: Vec<&XmlNode> = errors.children_named("Error").collect();
        if !all.is_empty() {
            let code = all[0]
                .attr_non_empty("Code")
                .or_else(|| all[0].attr_non_empty("Type"))
                .unwrap_or("UNKNOWN")
                .to_string();
            let message = all.iter().map(|e| message_of(e)).collect::<Vec<_>>().join("; ");
            warn!(%code, errors = all.len(), "hub reported errors");
            return response.into_failure(ParseFailure::ProtocolErrors { code, message });
        }
    }

    if root.child("Success").is_none() {
        response
            .warnings
            .push(format!("{} carries neither Success nor Errors", root.name()));
    }
    response
}

fn soap_fault(fault: &XmlNode) -> ParseFailure {
    // SOAP 1.1 faultcode/faultstring, SOAP 1.2 Code/Value and Reason/Text
    let code = fault
        .child_text("faultcode")
        .or_else(|| fault.path(&["Code", "Value"]).map(XmlNode::text))
        .unwrap_or("soap:Server")
        .to_string();
    let message = fault
        .child_text("faultstring")
        .or_else(|| fault.path(&["Reason", "Text"]).map(XmlNode::text))
        .unwrap_or("no fault description")
        .to_string();
    ParseFailure::SoapFault { code, message }
}

fn message_of(node: &XmlNode) -> String {
    if !node.text().is_empty() {
        node.text().to_string()
    } else {
        node.attr("ShortText").unwrap_or_default().to_string()
    }
}

fn describe(node: &XmlNode) -> String {
    match node.attr_non_empty("Code") {
        Some(code) => format!("[{}] {}", code, message_of(node)),
        None => message_of(node),
    }
}

pub(crate) fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim()).ok()
}

// `Start`/`End` attributes of a node as a range, if both are valid dates in order.
pub(crate) fn range_of(node: &XmlNode) -> Option<DateRange> {
    let start = node.attr("Start").and_then(parse_iso_date)?;
    let end = node.attr("End").and_then(parse_iso_date)?;
    DateRange::new(start, end).ok()
}
