use std::collections::{BTreeMap, BTreeSet};

use crate::config::CodeKind;
use crate::error::Violations;
use crate::model::rate::{RatePlan, RatePlanOperation};
use crate::validation::RuleContext;

// Structural and certification rules for rate plans, per plan and across a batch.
pub struct RateStructureValidator<'a> {
    ctx: RuleContext<'a>,
}

impl<'a> RateStructureValidator<'a> {
    pub fn new(ctx: RuleContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn validate_batch(&self, plans: &[RatePlan], operation: RatePlanOperation) -> Violations {
        let mut violations = Violations::new();

        if plans.is_empty() {
            violations.push("rate.empty_batch", "rate batch is empty");
            return violations;
        }
        let cap = self.ctx.config.rate.batch_caps.cap_for(operation);
        if plans.len() > cap {
            violations.push(
                "rate.batch_size",
                format!(
                    "{} rate plans exceed the recommended cap of {} for {:?}",
                    plans.len(),
                    cap,
                    operation
                ),
            );
            return violations;
        }

        for plan in plans {
            violations.extend(self.validate_plan(plan));
        }
        violations.extend(self.validate_consistency(plans));
        violations.extend(self.validate_linked_integrity(plans));
        violations
    }

    pub fn validate_plan(&self, plan: &RatePlan) -> Violations {
        let mut violations = Violations::new();
        let ctx = &self.ctx;

        ctx.check_code(&mut violations, "rate.plan_code", CodeKind::RatePlan, plan.code());
        ctx.check_code(&mut violations, "rate.hotel_code", CodeKind::Hotel, plan.hotel_code());

        if plan.operation().requires_rates() && plan.rates().is_empty() {
            violations.push(
                "rate.rates_required",
                format!(
                    "rate plan {} needs at least one rate for {:?}",
                    plan.code(),
                    plan.operation()
                ),
            );
        }
        if plan.operation() == RatePlanOperation::RemoveRoomTypes && plan.room_types().is_empty() {
            violations.push(
                "rate.room_types_required",
                format!("rate plan {} removes no room types", plan.code()),
            );
        }

        for room_type in plan.room_types() {
            ctx.check_code(
                &mut violations,
                "rate.room_type_code",
                CodeKind::RoomType,
                &room_type,
            );
        }

        if plan.operation().omits_rate_detail() {
            return violations;
        }

        for rate in plan.rates() {
            // Derived rates are priced off their master, so their own amounts may be zero.
            if rate.linked().is_some() {
                continue;
            }
            if rate.first_adult().is_zero() || rate.second_adult().is_zero() {
                violations.push(
                    "rate.certification_amounts",
                    format!(
                        "rate plan {} room {} {}..{} must price both first and second adult",
                        plan.code(),
                        rate.room_type_code(),
                        rate.date_range().start(),
                        rate.date_range().end()
                    ),
                );
            }
        }
        violations
    }

    fn validate_consistency(&self, plans: &[RatePlan]) -> Violations {
        let mut violations = Violations::new();

        let currencies: BTreeSet<String> = plans.iter().flat_map(|p| p.currencies()).collect();
        if currencies.len() > 1 {
            violations.push(
                "rate.mixed_currency",
                format!("batch mixes currencies {:?}", currencies),
            );
        }

        let hotels: BTreeSet<&str> = plans.iter().map(|p| p.hotel_code()).collect();
        if hotels.len() > 1 {
            violations.push(
                "rate.mixed_hotels",
                format!("batch addresses several hotels {:?}", hotels),
            );
        }

        let mut seen = BTreeSet::new();
        for plan in plans {
            if !seen.insert(plan.code()) {
                violations.push(
                    "rate.duplicate_plan",
                    format!("rate plan {} appears more than once", plan.code()),
                );
            }
        }
        violations
    }

    // Every linked plan must name exactly one master, and that master must be a
    // non-linked plan in the same batch.
    pub fn validate_linked_integrity(&self, plans: &[RatePlan]) -> Violations {
        let mut violations = Violations::new();
        let by_code: BTreeMap<&str, &RatePlan> = plans.iter().map(|p| (p.code(), p)).collect();

        for plan in plans.iter().filter(|p| p.is_linked()) {
            let masters: BTreeSet<&str> = plan
                .rates()
                .iter()
                .filter_map(|r| r.linked())
                .map(|l| l.master_rate_plan_code.as_str())
                .collect();
            if masters.len() > 1 {
                violations.push(
                    "rate.linked_master_ambiguous",
                    format!("rate plan {} links to several masters {:?}", plan.code(), masters),
                );
            }
            if plan.rates().iter().any(|r| r.linked().is_none()) {
                violations.push(
                    "rate.linked_partial",
                    format!("rate plan {} mixes linked and standalone rates", plan.code()),
                );
            }

            for master in masters {
                match by_code.get(master) {
                    None => violations.push(
                        "rate.linked_master_missing",
                        format!(
                            "rate plan {} links to {} which is not in this batch",
                            plan.code(),
                            master
                        ),
                    ),
                    Some(m) if m.is_linked() => violations.push(
                        "rate.linked_master_is_derived",
                        format!(
                            "rate plan {} links to {} which is itself linked",
                            plan.code(),
                            master
                        ),
                    ),
                    Some(_) => {}
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodeRules, CodecConfig};
    use crate::model::common::{date, range};
    use crate::model::rate::{LinkedRate, Rate};
    use rust_decimal::Decimal;

    fn with_validator<F: FnOnce(RateStructureValidator<'_>)>(config: CodecConfig, f: F) {
        let codes = CodeRules::compile(&config).unwrap();
        let ctx = RuleContext {
            config: &config,
            codes: &codes,
            today: date("2025-01-01"),
        };
        f(RateStructureValidator::new(ctx));
    }

    fn rate(plan: &str, room: &str, currency: &str, first: i64, second: i64) -> Rate {
        Rate::new(
            room,
            plan,
            range("2025-03-01", "2025-03-31"),
            currency,
            Decimal::new(first, 0),
            Decimal::new(second, 0),
        )
        .unwrap()
    }

    fn plan(code: &str, rates: Vec<Rate>) -> RatePlan {
        RatePlan::new(code, "HOTEL1", RatePlanOperation::Update, rates).unwrap()
    }

    fn linked_plan(code: &str, master: &str) -> RatePlan {
        let r = rate(code, "KING", "USD", 0, 0)
            .with_linked(LinkedRate::percentage(master, Decimal::new(-10, 0)).unwrap());
        plan(code, vec![r])
    }

    #[test]
    fn test_valid_batch() {
        with_validator(CodecConfig::default(), |v| {
            let plans = vec![
                plan("RACK", vec![rate("RACK", "KING", "USD", 100, 120)]),
                linked_plan("BAR", "RACK"),
            ];
            let violations = v.validate_batch(&plans, RatePlanOperation::Update);
            assert!(violations.is_empty(), "{}", violations);
        });
    }

    #[test]
    fn test_missing_second_adult_fails_certification() {
        with_validator(CodecConfig::default(), |v| {
            let plans = vec![plan("RACK", vec![rate("RACK", "KING", "USD", 100, 0)])];
            let violations = v.validate_batch(&plans, RatePlanOperation::Update);
            assert!(violations.has_rule("rate.certification_amounts"));
        });
    }

    #[test]
    fn test_linked_master_must_exist() {
        with_validator(CodecConfig::default(), |v| {
            let plans = vec![
                plan("RACK", vec![rate("RACK", "KING", "USD", 100, 120)]),
                linked_plan("BAR", "CORP"),
            ];
            let violations = v.validate_batch(&plans, RatePlanOperation::Update);
            assert!(violations.has_rule("rate.linked_master_missing"));
        });
    }

    #[test]
    fn test_linked_master_must_not_be_linked() {
        with_validator(CodecConfig::default(), |v| {
            let plans = vec![
                plan("RACK", vec![rate("RACK", "KING", "USD", 100, 120)]),
                linked_plan("BAR", "RACK"),
                linked_plan("AAA", "BAR"),
            ];
            let violations = v.validate_linked_integrity(&plans);
            assert!(violations.has_rule("rate.linked_master_is_derived"));
        });
    }

    #[test]
    fn test_cross_plan_consistency() {
        with_validator(CodecConfig::default(), |v| {
            let plans = vec![
                plan("RACK", vec![rate("RACK", "KING", "USD", 100, 120)]),
                plan("RACK", vec![rate("RACK", "QUEEN", "EUR", 90, 100)]),
            ];
            let violations = v.validate_batch(&plans, RatePlanOperation::Update);
            assert!(violations.has_rule("rate.mixed_currency"));
            assert!(violations.has_rule("rate.duplicate_plan"));
        });
    }

    #[test]
    fn test_inactive_plan_needs_no_rates() {
        with_validator(CodecConfig::default(), |v| {
            let inactive = RatePlan::new("RACK", "HOTEL1", RatePlanOperation::Inactive, vec![]).unwrap();
            let violations = v.validate_batch(&[inactive], RatePlanOperation::Inactive);
            assert!(violations.is_empty(), "{}", violations);

            let update = RatePlan::new("RACK", "HOTEL1", RatePlanOperation::Update, vec![]).unwrap();
            let violations = v.validate_batch(&[update], RatePlanOperation::Update);
            assert!(violations.has_rule("rate.rates_required"));
        });
    }

    #[test]
    fn test_batch_cap_per_operation() {
        let mut config = CodecConfig::default();
        config.rate.batch_caps.creation = 1;
        with_validator(config, |v| {
            let plans = vec![
                plan("RACK", vec![rate("RACK", "KING", "USD", 100, 120)]),
                plan("CORP", vec![rate("CORP", "KING", "USD", 90, 110)]),
            ];
            assert!(v
                .validate_batch(&plans, RatePlanOperation::Creation)
                .has_rule("rate.batch_size"));
            assert!(v
                .validate_batch(&plans, RatePlanOperation::Update)
                .is_empty());
        });
    }
}
