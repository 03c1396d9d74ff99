// Business rules checked before anything is serialized
pub mod inventory_rules;
pub mod linked_rate;
pub mod rate_rules;
pub mod reservation_rules;

use chrono::NaiveDate;

use crate::config::{CodeKind, CodeRules, CodecConfig};
use crate::error::Violations;

// What the rule checks need from the outside world.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub config: &'a CodecConfig,
    pub codes: &'a CodeRules,
    pub today: NaiveDate,
}

impl<'a> RuleContext<'a> {
    pub fn check_code(
        &self,
        violations: &mut Violations,
        rule: &'static str,
        kind: CodeKind,
        code: &str,
    ) {
        if let Err(reason) = self.codes.check(kind, code) {
            violations.push(rule, reason);
        }
    }
}

pub use inventory_rules::validate_inventory_batch;
pub use linked_rate::{LinkedRateMode, LinkedRatePolicy};
pub use rate_rules::RateStructureValidator;
pub use reservation_rules::validate_reservation;
