use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::common::DateRange;
use crate::model::rate::RatePlanOperation;
use crate::model::soap::{MessageType, SoapResponse};
use crate::parser::{parse_decimal, range_of, ResponseParser, XmlNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DerivationKind {
    Amount,
    Percentage,
}

// A derived plan and the master it follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedRatePair {
    pub rate_plan_code: String,
    pub master_rate_plan_code: Option<String>,
    pub kind: Option<DerivationKind>,
    pub value: Option<Decimal>,
}

// Amounts for one room type of one plan over one date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateBreakdown {
    pub rate_plan_code: String,
    pub room_type_code: String,
    pub date_range: Option<DateRange>,
    pub currency: Option<String>,
    pub first_adult: Option<Decimal>,
    pub second_adult: Option<Decimal>,
    pub additional_adult: Option<Decimal>,
    pub additional_child: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct RateResponse {
    pub base: SoapResponse,
    pub hotel_code: Option<String>,
    // `None` when the reply echoes no rate plans.
    pub operation: Option<RatePlanOperation>,
    pub update_type: Option<String>,
    pub linked: Vec<LinkedRatePair>,
    pub breakdowns: Vec<RateBreakdown>,
}

impl RateResponse {
    fn from_base(base: SoapResponse) -> Self {
        Self {
            base,
            hotel_code: None,
            operation: None,
            update_type: None,
            linked: Vec::new(),
            breakdowns: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.base.success
    }

    pub fn breakdowns_for<'a>(&'a self, rate_plan_code: &'a str) -> impl Iterator<Item = &'a RateBreakdown> + 'a {
        self.breakdowns
            .iter()
            .filter(move |b| b.rate_plan_code == rate_plan_code)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RateParser;

impl RateParser {
    // Reads the operation of one plan; `None` if the plan carries no marker.
    pub fn classify(plan: &XmlNode) -> Option<RatePlanOperation> {
        if plan.attr("RatePlanStatusType") == Some("Inactive") {
            return Some(RatePlanOperation::Inactive);
        }
        match plan.attr_non_empty("RatePlanNotifType")? {
            "New" => Some(RatePlanOperation::Creation),
            "Remove" => Some(RatePlanOperation::RemoveRoomTypes),
            "FullSync" => Some(RatePlanOperation::FullSync),
            "Delta" => Some(RatePlanOperation::DeltaUpdate),
            "Overlay" => Some(RatePlanOperation::Update),
            other => {
                debug!(marker = other, "unrecognised RatePlanNotifType");
                None
            }
        }
    }

    fn linked_pair(plan: &XmlNode, code: &str) -> Option<LinkedRatePair> {
        let master = plan
            .attr_non_empty("BaseRatePlanCode")
            .or_else(|| plan.attr_non_empty("MasterRatePlanCode"));
        let derived = matches!(plan.attr("IsDerived"), Some("true") | Some("1"));
        if master.is_none() && !derived {
            return None;
        }
        let kind = match plan.attr("AdjustmentType") {
            Some("Percentage") | Some("Percent") => Some(DerivationKind::Percentage),
            Some("Amount") | Some("Offset") => Some(DerivationKind::Amount),
            _ => None,
        };
        Some(LinkedRatePair {
            rate_plan_code: code.to_string(),
            master_rate_plan_code: master.map(str::to_string),
            kind,
            value: plan.attr("AdjustmentValue").and_then(parse_decimal),
        })
    }

    fn breakdown(plan: &XmlNode, code: &str, rate: &XmlNode) -> Option<RateBreakdown> {
        let room_type_code = rate.attr_non_empty("InvTypeCode")?.to_string();
        let mut breakdown = RateBreakdown {
            rate_plan_code: code.to_string(),
            room_type_code,
            date_range: range_of(rate).or_else(|| range_of(plan)),
            currency: rate.attr_non_empty("CurrencyCode").map(str::to_string),
            first_adult: None,
            second_adult: None,
            additional_adult: None,
            additional_child: None,
        };

        if let Some(amounts) = rate.child("BaseByGuestAmts") {
            for amount in amounts.children_named("BaseByGuestAmt") {
                let value = amount
                    .attr("AmountAfterTax")
                    .or_else(|| amount.attr("AmountBeforeTax"))
                    .and_then(parse_decimal);
                match amount.attr("NumberOfGuests") {
                    Some("1") => breakdown.first_adult = value,
                    Some("2") => breakdown.second_adult = value,
                    _ => {}
                }
                if breakdown.currency.is_none() {
                    breakdown.currency = amount.attr_non_empty("CurrencyCode").map(str::to_string);
                }
            }
        }
        if let Some(additional) = rate.child("AdditionalGuestAmounts") {
            for amount in additional.children_named("AdditionalGuestAmount") {
                let value = amount.attr("Amount").and_then(parse_decimal);
                match amount.attr("AgeQualifyingCode") {
                    Some("10") => breakdown.additional_adult = value,
                    Some("8") => breakdown.additional_child = value,
                    _ => {}
                }
            }
        }
        Some(breakdown)
    }
}

impl ResponseParser for RateParser {
    type Output = RateResponse;

    fn message_type(&self) -> MessageType {
        MessageType::RateNotif
    }

    fn roots(&self) -> Vec<&'static str> {
        vec![
            MessageType::RateNotif.response_root(),
            MessageType::RateNotif.request_root(),
        ]
    }

    fn extract(&self, root: &XmlNode, base: SoapResponse) -> RateResponse {
        let mut result = RateResponse::from_base(base);
        result.update_type = root.attr_non_empty("UpdateType").map(str::to_string);
        result.hotel_code = root
            .child("RatePlans")
            .and_then(|p| p.attr_non_empty("HotelCode"))
            .map(str::to_string);

        let plans = root.find_all("RatePlan");
        for plan in &plans {
            let Some(code) = plan.attr_non_empty("RatePlanCode") else {
                result.base.warnings.push("RatePlan without RatePlanCode".to_string());
                continue;
            };

            if let Some(operation) = Self::classify(plan) {
                match result.operation {
                    Some(seen) if seen != operation => {
                        warn!(?seen, ?operation, plan = code, "rate plans disagree on operation");
                        result.base.warnings.push(format!(
                            "rate plan {} is {:?} but earlier plans are {:?}",
                            code, operation, seen
                        ));
                    }
                    Some(_) => {}
                    None => result.operation = Some(operation),
                }
            }

            if let Some(pair) = Self::linked_pair(plan, code) {
                result.linked.push(pair);
            }

            for rate in plan.find_all("Rate") {
                match Self::breakdown(plan, code, rate) {
                    Some(b) => result.breakdowns.push(b),
                    None => result
                        .base
                        .warnings
                        .push(format!("rate in plan {} has no InvTypeCode", code)),
                }
            }
        }

        // Plans without a marker are a plain overlay
        if result.operation.is_none() && !plans.is_empty() {
            result.operation = Some(match result.update_type.as_deref() {
                Some("Full") => RatePlanOperation::FullSync,
                _ => RatePlanOperation::Update,
            });
        }
        result
    }

    fn failed(&self, base: SoapResponse) -> RateResponse {
        RateResponse::from_base(base)
    }
}
