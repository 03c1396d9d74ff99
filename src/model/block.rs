use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::common::{require_currency, require_non_empty, require_non_negative, DateRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    New,
    Modify,
    Cancel,
}

impl BlockStatus {
    pub fn transaction_action(&self) -> &'static str {
        match self {
            BlockStatus::New => "Book",
            BlockStatus::Modify => "Modify",
            BlockStatus::Cancel => "Cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAllocation {
    pub room_type_code: String,
    pub units: u32,
    pub rate: Option<Decimal>,
}

// A group allotment held against the hotel's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryBlock {
    block_code: String,
    block_name: String,
    hotel_code: String,
    date_range: DateRange,
    status: BlockStatus,
    currency: String,
    cutoff_date: Option<NaiveDate>,
    allocations: Vec<RoomAllocation>,
}

impl InventoryBlock {
    pub fn new(
        block_code: &str,
        block_name: &str,
        hotel_code: &str,
        date_range: DateRange,
        status: BlockStatus,
        currency: &str,
    ) -> Result<Self, ModelError> {
        require_non_empty("block_code", block_code)?;
        require_non_empty("hotel_code", hotel_code)?;
        require_currency(currency)?;
        Ok(Self {
            block_code: block_code.to_string(),
            block_name: block_name.to_string(),
            hotel_code: hotel_code.to_string(),
            date_range,
            status,
            currency: currency.to_string(),
            cutoff_date: None,
            allocations: Vec::new(),
        })
    }

    pub fn with_allocation(mut self, allocation: RoomAllocation) -> Result<Self, ModelError> {
        require_non_empty("room_type_code", &allocation.room_type_code)?;
        if let Some(rate) = allocation.rate {
            require_non_negative("allocation.rate", rate)?;
        }
        self.allocations.push(allocation);
        Ok(self)
    }

    pub fn with_cutoff_date(mut self, cutoff: NaiveDate) -> Result<Self, ModelError> {
        if cutoff > self.date_range.start() {
            return Err(ModelError::OutOfRange {
                field: "cutoff_date".to_string(),
                value: cutoff.to_string(),
            });
        }
        self.cutoff_date = Some(cutoff);
        Ok(self)
    }

    pub fn block_code(&self) -> &str {
        &self.block_code
    }

    pub fn block_name(&self) -> &str {
        &self.block_name
    }

    pub fn hotel_code(&self) -> &str {
        &self.hotel_code
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn cutoff_date(&self) -> Option<NaiveDate> {
        self.cutoff_date
    }

    pub fn allocations(&self) -> &[RoomAllocation] {
        &self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::common::{date, range};

    #[test]
    fn test_cutoff_after_arrival_rejected() {
        let block = InventoryBlock::new(
            "WEDDING25",
            "Smith Wedding",
            "HOTEL1",
            range("2025-09-10", "2025-09-12"),
            BlockStatus::New,
            "USD",
        )
        .unwrap();
        assert!(block.clone().with_cutoff_date(date("2025-09-11")).is_err());
        assert!(block.with_cutoff_date(date("2025-08-10")).is_ok());
    }
}
