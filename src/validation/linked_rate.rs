use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Violations;
use crate::model::common::round_amount;
use crate::model::rate::{Rate, RateAdjustment, RatePlan};

// Who is responsible for pricing derived rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkedRateMode {
    // The hub derives linked rates itself; only masters are sent.
    ExternalManaged,
    // Derived prices are computed here and sent like any other rate.
    SelfManaged,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkedRatePolicy {
    mode: LinkedRateMode,
}

impl LinkedRatePolicy {
    pub fn new(mode: LinkedRateMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LinkedRateMode {
        self.mode
    }

    // `master + offset` or `master * (1 + percent / 100)`, rounded to cents.
    pub fn derive_price(master: Decimal, adjustment: &RateAdjustment) -> Decimal {
        let raw = match adjustment {
            RateAdjustment::Offset(amount) => master + amount,
            RateAdjustment::Percentage(percent) => {
                master * (Decimal::ONE + percent.value() / Decimal::ONE_HUNDRED)
            }
        };
        round_amount(raw)
    }

    // Produces the plans that actually go on the wire. Linked integrity must already
    // have been checked; a derived rate with no master rate to price from is reported.
    pub fn apply(&self, plans: &[RatePlan]) -> Result<Vec<RatePlan>, Violations> {
        match self.mode {
            LinkedRateMode::ExternalManaged => {
                let kept: Vec<RatePlan> = plans.iter().filter(|p| !p.is_linked()).cloned().collect();
                debug!(
                    dropped = plans.len() - kept.len(),
                    "linked rate plans left to the hub"
                );
                Ok(kept)
            }
            LinkedRateMode::SelfManaged => {
                let masters: BTreeMap<&str, &RatePlan> = plans
                    .iter()
                    .filter(|p| !p.is_linked())
                    .map(|p| (p.code(), p))
                    .collect();
                let mut violations = Violations::new();
                let mut out = Vec::with_capacity(plans.len());

                for plan in plans {
                    if !plan.is_linked() {
                        out.push(plan.clone());
                        continue;
                    }
                    let mut derived = Vec::new();
                    for rate in plan.rates() {
                        match derive_rate(rate, &masters) {
                            Ok(mut rates) => derived.append(&mut rates),
                            Err((rule, message)) => violations.push(rule, message),
                        }
                    }
                    match plan.with_rates(derived) {
                        Ok(p) => out.push(p),
                        Err(e) => violations.push("rate.linked_derivation", e.to_string()),
                    }
                }

                if violations.is_empty() {
                    Ok(out)
                } else {
                    Err(violations)
                }
            }
        }
    }

    // Cuts a plan into sub-plans no longer than `max_days`. Rates are trimmed to each
    // window, never duplicated past it; windows without rates are skipped.
    pub fn split_by_max_days(plan: &RatePlan, max_days: i64) -> Vec<RatePlan> {
        let Some(span) = plan.date_range() else {
            return vec![plan.clone()];
        };
        if span.days() <= max_days {
            return vec![plan.clone()];
        }

        span.windows(max_days)
            .into_iter()
            .filter_map(|window| {
                let rates: Vec<Rate> = plan
                    .rates()
                    .iter()
                    .filter_map(|r| {
                        r.date_range()
                            .intersect(&window)
                            .map(|trimmed| r.clone().with_date_range(trimmed))
                    })
                    .collect();
                if rates.is_empty() {
                    None
                } else {
                    plan.with_rates(rates).ok()
                }
            })
            .collect()
    }
}

const MASTER_RATE_MISSING: &str = "rate.linked_master_rate_missing";

fn amounts(rate: &Rate) -> impl Iterator<Item = Decimal> {
    [rate.first_adult(), rate.second_adult()]
        .into_iter()
        .chain(rate.additional_adult())
        .chain(rate.additional_child())
}

// One derived rate per master rate it overlaps, priced off that master.
fn derive_rate(
    rate: &Rate,
    masters: &BTreeMap<&str, &RatePlan>,
) -> Result<Vec<Rate>, (&'static str, String)> {
    let Some(link) = rate.linked() else {
        return Ok(vec![rate.clone()]);
    };
    let master_plan = masters
        .get(link.master_rate_plan_code.as_str())
        .ok_or_else(|| {
            (
                MASTER_RATE_MISSING,
                format!("master plan {} is not available", link.master_rate_plan_code),
            )
        })?;

    let derived: Vec<Rate> = master_plan
        .rates()
        .iter()
        .filter(|m| m.room_type_code() == rate.room_type_code())
        .filter_map(|m| {
            m.date_range().intersect(&rate.date_range()).map(|overlap| {
                let adj = &link.adjustment;
                rate.clone().with_date_range(overlap).with_amounts(
                    LinkedRatePolicy::derive_price(m.first_adult(), adj),
                    LinkedRatePolicy::derive_price(m.second_adult(), adj),
                    m.additional_adult()
                        .map(|a| LinkedRatePolicy::derive_price(a, adj)),
                    m.additional_child()
                        .map(|a| LinkedRatePolicy::derive_price(a, adj)),
                )
            })
        })
        .collect();

    if derived.is_empty() {
        return Err((
            MASTER_RATE_MISSING,
            format!(
                "no {} rate in master plan {} covers {}..{}",
                rate.room_type_code(),
                link.master_rate_plan_code,
                rate.date_range().start(),
                rate.date_range().end()
            ),
        ));
    }
    for derived_rate in &derived {
        if let Some(amount) = amounts(derived_rate).find(|a| a.is_sign_negative()) {
            return Err((
                "rate.linked_negative_price",
                format!(
                    "derived {} rate falls below zero ({})",
                    derived_rate.room_type_code(),
                    amount
                ),
            ));
        }
    }
    debug!(
        room_type = rate.room_type_code(),
        master = %link.master_rate_plan_code,
        pieces = derived.len(),
        "derived linked rate"
    );
    Ok(derived)
}
