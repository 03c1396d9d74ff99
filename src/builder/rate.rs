use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::{iso_date, BuilderContext, Element, MessageBuilder};
use crate::error::{CodecError, Violations};
use crate::model::common::{format_amount, DateRange};
use crate::model::rate::{Rate, RateAdjustment, RatePlan, RatePlanOperation};
use crate::model::soap::{MessageType, SoapRequest};
use crate::model::GuestCategory;
use crate::validation::{LinkedRatePolicy, RateStructureValidator};

// Message-level `UpdateType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    Delta,
    Full,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Delta => "Delta",
            UpdateType::Full => "Full",
        }
    }
}

// Builds `OTA_HotelRateNotifRQ` messages for one operation.
#[derive(Debug, Clone)]
pub struct RateNotifBuilder {
    ctx: BuilderContext,
    operation: RatePlanOperation,
    delta: bool,
    policy: LinkedRatePolicy,
}

impl RateNotifBuilder {
    // The linked-rate policy starts from the configured mode.
    pub fn new(ctx: BuilderContext, operation: RatePlanOperation, delta: bool) -> Self {
        let policy = LinkedRatePolicy::new(ctx.config().linked_rate_mode);
        Self {
            ctx,
            operation,
            delta,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: LinkedRatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn operation(&self) -> RatePlanOperation {
        self.operation
    }

    pub fn policy(&self) -> LinkedRatePolicy {
        self.policy
    }

    pub fn update_type(&self) -> UpdateType {
        match self.operation {
            RatePlanOperation::FullSync => UpdateType::Full,
            RatePlanOperation::DeltaUpdate => UpdateType::Delta,
            _ if self.delta => UpdateType::Delta,
            _ => UpdateType::Full,
        }
    }

    // Validates once, then emits one envelope per date window, each with its own message id.
    pub fn build_sharded(&self, plans: &[RatePlan]) -> Result<Vec<SoapRequest>, CodecError> {
        self.validate(plans)?;
        let resolved = self.resolve(plans)?;

        let max_days = self.ctx.config().rate.max_days_per_message;
        let pieces: Vec<Vec<RatePlan>> = resolved
            .iter()
            .map(|p| LinkedRatePolicy::split_by_max_days(p, max_days))
            .collect();
        let shard_count = pieces.iter().map(Vec::len).max().unwrap_or(0);

        let mut requests = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let shard: Vec<RatePlan> = pieces
                .iter()
                .filter_map(|p| p.get(index).cloned())
                .collect();
            let ctx = self.ctx.next_message();
            let xml = ctx.render(self.message_type(), self.rate_notif(&ctx, &shard))?;
            requests.push(SoapRequest::new(ctx.header(), xml));
        }

        info!(
            plans = plans.len(),
            shards = requests.len(),
            max_days,
            "built sharded rate notification"
        );
        Ok(requests)
    }

    fn resolve(&self, plans: &[RatePlan]) -> Result<Vec<RatePlan>, CodecError> {
        self.policy.apply(plans).map_err(|violations| {
            warn!(count = violations.len(), "linked rate derivation failed: {}", violations);
            CodecError::Validation(violations)
        })
    }

    fn rate_notif(&self, ctx: &BuilderContext, plans: &[RatePlan]) -> Element {
        let hotel_code = plans
            .first()
            .map(|p| p.hotel_code())
            .unwrap_or(ctx.header().hotel_code.as_str());

        ctx.body_root(self.message_type())
            .attr("UpdateType", self.update_type().as_str())
            .child(
                Element::new("RatePlans")
                    .attr("HotelCode", hotel_code)
                    .children(plans.iter().flat_map(|p| self.rate_plan_elements(p))),
            )
    }

    // One RatePlan element per distinct date range in the plan.
    fn rate_plan_elements(&self, plan: &RatePlan) -> Vec<Element> {
        if self.operation.omits_rate_detail() {
            let element = self.rate_plan_element(plan, plan.date_range());
            let element = match self.operation {
                RatePlanOperation::RemoveRoomTypes => element.wrapped(
                    "SellableProducts",
                    plan.room_types()
                        .into_iter()
                        .map(|rt| Element::new("SellableProduct").attr("InvTypeCode", rt)),
                ),
                _ => element,
            };
            return vec![element.child_opt(description(plan))];
        }

        let mut groups: BTreeMap<DateRange, Vec<&Rate>> = BTreeMap::new();
        for rate in plan.rates() {
            groups.entry(rate.date_range()).or_default().push(rate);
        }

        groups
            .into_iter()
            .map(|(range, mut rates)| {
                rates.sort_by(|a, b| a.room_type_code().cmp(b.room_type_code()));
                self.rate_plan_element(plan, Some(range))
                    .child(Element::new("Rates").children(rates.into_iter().map(rate_element)))
                    .child_opt(description(plan))
            })
            .collect()
    }

    fn rate_plan_element(&self, plan: &RatePlan, range: Option<DateRange>) -> Element {
        let mut element = Element::new("RatePlan").attr("RatePlanCode", plan.code());
        if let Some(range) = range {
            element = element
                .attr("Start", iso_date(range.start()))
                .attr("End", iso_date(range.end()));
        }

        element = match self.operation {
            RatePlanOperation::Creation => element.attr("RatePlanNotifType", "New"),
            RatePlanOperation::Inactive => element.attr("RatePlanStatusType", "Inactive"),
            RatePlanOperation::RemoveRoomTypes => element.attr("RatePlanNotifType", "Remove"),
            RatePlanOperation::FullSync => element.attr("RatePlanNotifType", "FullSync"),
            RatePlanOperation::Update | RatePlanOperation::DeltaUpdate => element,
        };

        match plan.rates().iter().find_map(|r| r.linked()) {
            Some(link) => {
                let (kind, value) = match &link.adjustment {
                    RateAdjustment::Offset(amount) => ("Amount", format_amount(*amount)),
                    RateAdjustment::Percentage(p) => ("Percentage", p.value().normalize().to_string()),
                };
                element
                    .attr("BaseRatePlanCode", &link.master_rate_plan_code)
                    .attr("AdjustmentType", kind)
                    .attr("AdjustmentValue", value)
            }
            None => element,
        }
    }
}

fn description(plan: &RatePlan) -> Option<Element> {
    plan.description()
        .map(|text| Element::new("Description").child(Element::new("Text").text(text)))
}

fn rate_element(rate: &Rate) -> Element {
    let range = rate.date_range();
    let flags = rate.flags();

    let additional = [
        rate.additional_adult().map(|a| (GuestCategory::Adult, a)),
        rate.additional_child().map(|a| (GuestCategory::Child, a)),
    ]
    .into_iter()
    .flatten()
    .map(|(category, amount)| {
        Element::new("AdditionalGuestAmount")
            .attr("AgeQualifyingCode", category.age_qualifying_code())
            .attr("Amount", format_amount(amount))
    });

    Element::new("Rate")
        .attr("Start", iso_date(range.start()))
        .attr("End", iso_date(range.end()))
        .attr("InvTypeCode", rate.room_type_code())
        .attr("CurrencyCode", rate.currency())
        .attr_opt("Display", flags.display)
        .attr_opt("IsCommissionable", flags.commissionable)
        .attr_opt("MarketCode", flags.market_code.as_deref())
        .child(
            Element::new("BaseByGuestAmts")
                .child(guest_amount(1, rate.first_adult()))
                .child(guest_amount(2, rate.second_adult())),
        )
        .wrapped("AdditionalGuestAmounts", additional)
}

fn guest_amount(guests: u8, amount: rust_decimal::Decimal) -> Element {
    Element::new("BaseByGuestAmt")
        .attr("NumberOfGuests", guests)
        .attr("AmountAfterTax", format_amount(amount))
}

impl MessageBuilder for RateNotifBuilder {
    type Input = [RatePlan];

    fn message_type(&self) -> MessageType {
        MessageType::RateNotif
    }

    fn context(&self) -> &BuilderContext {
        &self.ctx
    }

    fn validate(&self, plans: &[RatePlan]) -> Result<(), CodecError> {
        let validator = RateStructureValidator::new(self.ctx.rules());
        let mut violations = validator.validate_batch(plans, self.operation);

        let mut mismatched = Violations::new();
        for plan in plans.iter().filter(|p| p.operation() != self.operation) {
            mismatched.push(
                "rate.operation_mismatch",
                format!(
                    "rate plan {} is {:?} but the message is {:?}",
                    plan.code(),
                    plan.operation(),
                    self.operation
                ),
            );
        }
        violations.extend(mismatched);

        if !violations.is_empty() {
            warn!(count = violations.len(), "rate batch rejected: {}", violations);
        }
        violations.into_result()
    }

    fn build_body(&self, plans: &[RatePlan]) -> Result<Element, CodecError> {
        let resolved = self.resolve(plans)?;
        info!(
            plans = plans.len(),
            sent = resolved.len(),
            operation = ?self.operation,
            message_id = %self.ctx.header().message_id,
            "building rate notification"
        );
        Ok(self.rate_notif(&self.ctx, &resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::test_support::context;
    use crate::builder::RequiredElementsValidator;
    use crate::model::common::range;
    use crate::model::rate::LinkedRate;
    use crate::parser::dom::XmlNode;
    use crate::validation::LinkedRateMode;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use test_case::test_case;

    fn builder(operation: RatePlanOperation, mode: LinkedRateMode) -> RateNotifBuilder {
        let ctx = context(MessageType::RateNotif, "HOTEL1")
            .with_schema_validator(Arc::new(RequiredElementsValidator));
        RateNotifBuilder::new(ctx, operation, true).with_policy(LinkedRatePolicy::new(mode))
    }

    fn rate(plan: &str, room: &str, start: &str, end: &str, first: i64, second: i64) -> Rate {
        Rate::new(
            room,
            plan,
            range(start, end),
            "USD",
            Decimal::new(first, 0),
            Decimal::new(second, 0),
        )
        .unwrap()
    }

    fn master() -> RatePlan {
        RatePlan::new(
            "RACK",
            "HOTEL1",
            RatePlanOperation::Update,
            vec![
                rate("RACK", "QUEEN", "2025-03-01", "2025-03-31", 90, 110),
                rate("RACK", "KING", "2025-03-01", "2025-03-31", 100, 120)
                    .with_additional(Some(Decimal::new(25, 0)), Some(Decimal::new(10, 0)))
                    .unwrap(),
                rate("RACK", "KING", "2025-04-01", "2025-04-30", 130, 150),
            ],
        )
        .unwrap()
    }

    fn linked(master_code: &str) -> RatePlan {
        let r = rate("BAR", "KING", "2025-03-01", "2025-03-31", 0, 0)
            .with_linked(LinkedRate::percentage(master_code, Decimal::new(-10, 0)).unwrap());
        RatePlan::new("BAR", "HOTEL1", RatePlanOperation::Update, vec![r]).unwrap()
    }

    fn rate_plans(xml: &str) -> XmlNode {
        let doc = XmlNode::parse(xml).unwrap();
        doc.find("RatePlans").unwrap().clone()
    }

    #[test]
    fn test_groups_by_date_range_with_both_adult_amounts() {
        let xml = builder(RatePlanOperation::Update, LinkedRateMode::SelfManaged)
            .build(&[master()])
            .unwrap();
        let plans = rate_plans(&xml);
        let elements: Vec<&XmlNode> = plans.children_named("RatePlan").collect();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].attr("Start"), Some("2025-03-01"));

        let march: Vec<&XmlNode> = elements[0].find_all("Rate");
        assert_eq!(march.len(), 2);
        assert_eq!(march[0].attr("InvTypeCode"), Some("KING"));
        let amounts: Vec<(&str, &str)> = march[0]
            .find_all("BaseByGuestAmt")
            .into_iter()
            .map(|a| (a.attr("NumberOfGuests").unwrap(), a.attr("AmountAfterTax").unwrap()))
            .collect();
        assert_eq!(amounts, vec![("1", "100.00"), ("2", "120.00")]);

        let additional: Vec<(&str, &str)> = march[0]
            .find_all("AdditionalGuestAmount")
            .into_iter()
            .map(|a| (a.attr("AgeQualifyingCode").unwrap(), a.attr("Amount").unwrap()))
            .collect();
        assert_eq!(additional, vec![("10", "25.00"), ("8", "10.00")]);
        assert!(march[1].find("AdditionalGuestAmounts").is_none());
    }

    #[test]
    fn test_linked_plan_without_master_is_rejected() {
        let err = builder(RatePlanOperation::Update, LinkedRateMode::SelfManaged)
            .build(&[master(), linked("CORP")])
            .unwrap_err();
        assert!(err.violations().unwrap().has_rule("rate.linked_master_missing"));
    }

    #[test]
    fn test_self_managed_sends_derived_price() {
        let xml = builder(RatePlanOperation::Update, LinkedRateMode::SelfManaged)
            .build(&[master(), linked("RACK")])
            .unwrap();
        let plans = rate_plans(&xml);
        let bar = plans
            .children_named("RatePlan")
            .find(|p| p.attr("RatePlanCode") == Some("BAR"))
            .unwrap();
        assert_eq!(bar.attr("BaseRatePlanCode"), Some("RACK"));
        assert_eq!(bar.attr("AdjustmentType"), Some("Percentage"));
        let first = bar.find("BaseByGuestAmt").unwrap();
        assert_eq!(first.attr("AmountAfterTax"), Some("90.00"));
    }

    #[test]
    fn test_external_managed_leaves_linked_plans_out() {
        let xml = builder(RatePlanOperation::Update, LinkedRateMode::ExternalManaged)
            .build(&[master(), linked("RACK")])
            .unwrap();
        let plans = rate_plans(&xml);
        assert!(plans
            .children_named("RatePlan")
            .all(|p| p.attr("RatePlanCode") == Some("RACK")));
    }

    #[test]
    fn test_inactive_omits_rate_detail() {
        let plan = RatePlan::new("RACK", "HOTEL1", RatePlanOperation::Inactive, vec![]).unwrap();
        let xml = builder(RatePlanOperation::Inactive, LinkedRateMode::SelfManaged)
            .build(&[plan])
            .unwrap();
        let plans = rate_plans(&xml);
        let element = plans.child("RatePlan").unwrap();
        assert_eq!(element.attr("RatePlanStatusType"), Some("Inactive"));
        assert!(element.find("Rates").is_none());
    }

    #[test]
    fn test_remove_room_types_lists_targets() {
        let plan = RatePlan::new("RACK", "HOTEL1", RatePlanOperation::RemoveRoomTypes, vec![])
            .unwrap()
            .with_target_room_types(vec!["KING".into(), "SUITE".into()]);
        let xml = builder(RatePlanOperation::RemoveRoomTypes, LinkedRateMode::SelfManaged)
            .build(&[plan])
            .unwrap();
        let element = rate_plans(&xml).child("RatePlan").unwrap().clone();
        assert_eq!(element.attr("RatePlanNotifType"), Some("Remove"));
        let targets: Vec<&str> = element
            .find_all("SellableProduct")
            .into_iter()
            .filter_map(|p| p.attr("InvTypeCode"))
            .collect();
        assert_eq!(targets, vec!["KING", "SUITE"]);
        assert!(element.find("BaseByGuestAmts").is_none());
    }

    #[test_case(RatePlanOperation::Update, true, "Delta")]
    #[test_case(RatePlanOperation::Update, false, "Full")]
    #[test_case(RatePlanOperation::FullSync, true, "Full")]
    #[test_case(RatePlanOperation::DeltaUpdate, false, "Delta")]
    #[test_case(RatePlanOperation::Creation, false, "Full")]
    fn test_update_type(operation: RatePlanOperation, delta: bool, expected: &str) {
        let ctx = context(MessageType::RateNotif, "HOTEL1");
        let builder = RateNotifBuilder::new(ctx, operation, delta);
        assert_eq!(builder.update_type().as_str(), expected);
    }

    #[test]
    fn test_plan_operation_must_match_builder() {
        let err = builder(RatePlanOperation::Creation, LinkedRateMode::SelfManaged)
            .build(&[master()])
            .unwrap_err();
        assert!(err.violations().unwrap().has_rule("rate.operation_mismatch"));
    }

    #[test]
    fn test_build_sharded_gives_each_shard_its_own_id() {
        let long = RatePlan::new(
            "RACK",
            "HOTEL1",
            RatePlanOperation::Update,
            vec![rate("RACK", "KING", "2025-01-01", "2025-12-31", 100, 120)],
        )
        .unwrap();
        let requests = builder(RatePlanOperation::Update, LinkedRateMode::SelfManaged)
            .build_sharded(&[long])
            .unwrap();
        // 365 days in 90-day windows
        assert_eq!(requests.len(), 5);
        let mut ids: Vec<&str> = requests.iter().map(|r| r.message_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        assert!(requests[4].body.contains(r#"Start="2025-12-27""#));
    }
}
