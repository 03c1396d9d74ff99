use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::common::{require_currency, require_non_empty, require_non_negative, DateRange};

// The kind of change a rate notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatePlanOperation {
    Update,
    Creation,
    Inactive,
    RemoveRoomTypes,
    FullSync,
    DeltaUpdate,
}

impl RatePlanOperation {
    // Plans of these operations must carry at least one rate.
    pub fn requires_rates(&self) -> bool {
        !matches!(
            self,
            RatePlanOperation::Inactive | RatePlanOperation::RemoveRoomTypes
        )
    }

    // Whether amounts are left out of the message entirely.
    pub fn omits_rate_detail(&self) -> bool {
        matches!(
            self,
            RatePlanOperation::Inactive | RatePlanOperation::RemoveRoomTypes
        )
    }

    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            RatePlanOperation::Update | RatePlanOperation::DeltaUpdate
        )
    }
}

// A percentage strictly inside (-100, 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> Result<Self, ModelError> {
        let bound = Decimal::ONE_HUNDRED;
        if value <= -bound || value >= bound {
            return Err(ModelError::OutOfRange {
                field: "linked rate percentage".to_string(),
                value: value.to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Percent {
    type Error = ModelError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percent::new(value)
    }
}

impl From<Percent> for Decimal {
    fn from(p: Percent) -> Self {
        p.0
    }
}

// How a derived rate relates to its master: a fixed amount or a percentage, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateAdjustment {
    Offset(Decimal),
    Percentage(Percent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRate {
    pub master_rate_plan_code: String,
    pub adjustment: RateAdjustment,
}

impl LinkedRate {
    pub fn offset(master_rate_plan_code: &str, amount: Decimal) -> Result<Self, ModelError> {
        require_non_empty("master_rate_plan_code", master_rate_plan_code)?;
        Ok(Self {
            master_rate_plan_code: master_rate_plan_code.to_string(),
            adjustment: RateAdjustment::Offset(amount),
        })
    }

    pub fn percentage(master_rate_plan_code: &str, percent: Decimal) -> Result<Self, ModelError> {
        require_non_empty("master_rate_plan_code", master_rate_plan_code)?;
        Ok(Self {
            master_rate_plan_code: master_rate_plan_code.to_string(),
            adjustment: RateAdjustment::Percentage(Percent::new(percent)?),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateFlags {
    pub display: Option<bool>,
    pub commissionable: Option<bool>,
    pub market_code: Option<String>,
}

// Prices for one room type under one rate plan over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    room_type_code: String,
    rate_plan_code: String,
    date_range: DateRange,
    currency: String,
    first_adult: Decimal,
    second_adult: Decimal,
    additional_adult: Option<Decimal>,
    additional_child: Option<Decimal>,
    linked: Option<LinkedRate>,
    flags: RateFlags,
}

impl Rate {
    pub fn new(
        room_type_code: &str,
        rate_plan_code: &str,
        date_range: DateRange,
        currency: &str,
        first_adult: Decimal,
        second_adult: Decimal,
    ) -> Result<Self, ModelError> {
        require_non_empty("room_type_code", room_type_code)?;
        require_non_empty("rate_plan_code", rate_plan_code)?;
        require_currency(currency)?;
        require_non_negative("first_adult", first_adult)?;
        require_non_negative("second_adult", second_adult)?;

        Ok(Self {
            room_type_code: room_type_code.to_string(),
            rate_plan_code: rate_plan_code.to_string(),
            date_range,
            currency: currency.to_string(),
            first_adult,
            second_adult,
            additional_adult: None,
            additional_child: None,
            linked: None,
            flags: RateFlags::default(),
        })
    }

    pub fn with_additional(
        mut self,
        adult: Option<Decimal>,
        child: Option<Decimal>,
    ) -> Result<Self, ModelError> {
        if let Some(amount) = adult {
            require_non_negative("additional_adult", amount)?;
        }
        if let Some(amount) = child {
            require_non_negative("additional_child", amount)?;
        }
        self.additional_adult = adult;
        self.additional_child = child;
        Ok(self)
    }

    pub fn with_linked(mut self, linked: LinkedRate) -> Self {
        self.linked = Some(linked);
        self
    }

    pub fn with_flags(mut self, flags: RateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    // Replaces every amount; used when a derived rate is priced off its master.
    pub fn with_amounts(
        mut self,
        first_adult: Decimal,
        second_adult: Decimal,
        additional_adult: Option<Decimal>,
        additional_child: Option<Decimal>,
    ) -> Self {
        self.first_adult = first_adult;
        self.second_adult = second_adult;
        self.additional_adult = additional_adult;
        self.additional_child = additional_child;
        self
    }

    pub fn room_type_code(&self) -> &str {
        &self.room_type_code
    }

    pub fn rate_plan_code(&self) -> &str {
        &self.rate_plan_code
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn first_adult(&self) -> Decimal {
        self.first_adult
    }

    pub fn second_adult(&self) -> Decimal {
        self.second_adult
    }

    pub fn additional_adult(&self) -> Option<Decimal> {
        self.additional_adult
    }

    pub fn additional_child(&self) -> Option<Decimal> {
        self.additional_child
    }

    pub fn linked(&self) -> Option<&LinkedRate> {
        self.linked.as_ref()
    }

    pub fn flags(&self) -> &RateFlags {
        &self.flags
    }

    pub fn has_additional_amounts(&self) -> bool {
        self.additional_adult.is_some() || self.additional_child.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePlan {
    code: String,
    hotel_code: String,
    operation: RatePlanOperation,
    rates: Vec<Rate>,
    target_room_types: Vec<String>,
    description: Option<String>,
}

impl RatePlan {
    pub fn new(
        code: &str,
        hotel_code: &str,
        operation: RatePlanOperation,
        rates: Vec<Rate>,
    ) -> Result<Self, ModelError> {
        require_non_empty("rate_plan_code", code)?;
        require_non_empty("hotel_code", hotel_code)?;
        Self::check_rates(code, &rates)?;

        Ok(Self {
            code: code.to_string(),
            hotel_code: hotel_code.to_string(),
            operation,
            rates,
            target_room_types: Vec::new(),
            description: None,
        })
    }

    fn check_rates(code: &str, rates: &[Rate]) -> Result<(), ModelError> {
        if let Some(stray) = rates.iter().find(|r| r.rate_plan_code != code) {
            return Err(ModelError::Inconsistent(format!(
                "rate for {} belongs to plan {}, not {}",
                stray.room_type_code, stray.rate_plan_code, code
            )));
        }
        let currencies: BTreeSet<&str> = rates.iter().map(|r| r.currency.as_str()).collect();
        if currencies.len() > 1 {
            return Err(ModelError::Inconsistent(format!(
                "rate plan {} mixes currencies {:?}",
                code, currencies
            )));
        }
        Ok(())
    }

    pub fn with_rates(&self, rates: Vec<Rate>) -> Result<Self, ModelError> {
        Self::check_rates(&self.code, &rates)?;
        Ok(Self {
            rates,
            ..self.clone()
        })
    }

    pub fn with_operation(mut self, operation: RatePlanOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    // Room types addressed without rate detail, e.g. by a `RemoveRoomTypes` plan.
    pub fn with_target_room_types(mut self, room_types: Vec<String>) -> Self {
        self.target_room_types = room_types;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn hotel_code(&self) -> &str {
        &self.hotel_code
    }

    pub fn operation(&self) -> RatePlanOperation {
        self.operation
    }

    pub fn rates(&self) -> &[Rate] {
        &self.rates
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    // Overall span covered by the member rates.
    pub fn date_range(&self) -> Option<DateRange> {
        self.rates
            .iter()
            .map(|r| r.date_range)
            .reduce(|acc, r| acc.union(&r))
    }

    pub fn room_types(&self) -> BTreeSet<String> {
        self.rates
            .iter()
            .map(|r| r.room_type_code.clone())
            .chain(self.target_room_types.iter().cloned())
            .collect()
    }

    pub fn currencies(&self) -> BTreeSet<String> {
        self.rates.iter().map(|r| r.currency.clone()).collect()
    }

    pub fn currency(&self) -> Option<&str> {
        self.rates.first().map(|r| r.currency.as_str())
    }

    pub fn is_linked(&self) -> bool {
        self.rates.iter().any(|r| r.linked.is_some())
    }

    pub fn master_rate_plan_code(&self) -> Option<&str> {
        self.rates
            .iter()
            .find_map(|r| r.linked.as_ref())
            .map(|l| l.master_rate_plan_code.as_str())
    }
}
