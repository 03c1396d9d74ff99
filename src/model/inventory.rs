use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::common::{require_non_empty, DateRange};

// What an inventory number represents, with its OTA `CountType` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CountType {
    Physical,
    Available,
    DefiniteSold,
    TentativeSold,
    OutOfOrder,
    Oversell,
}

impl CountType {
    pub const ALL: [CountType; 6] = [
        CountType::Physical,
        CountType::Available,
        CountType::DefiniteSold,
        CountType::TentativeSold,
        CountType::OutOfOrder,
        CountType::Oversell,
    ];

    pub fn code(&self) -> u8 {
        match self {
            CountType::Physical => 1,
            CountType::Available => 2,
            CountType::DefiniteSold => 4,
            CountType::TentativeSold => 5,
            CountType::OutOfOrder => 6,
            CountType::Oversell => 99,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|ct| ct.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCount {
    pub count_type: CountType,
    pub count: u32,
}

impl InventoryCount {
    pub fn new(count_type: CountType, count: i64) -> Result<Self, ModelError> {
        let count = u32::try_from(count).map_err(|_| ModelError::OutOfRange {
            field: format!("count for {:?}", count_type),
            value: count.to_string(),
        })?;
        Ok(Self { count_type, count })
    }
}

// Either one room type or the whole property (`AllInvCode`), never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryScope {
    RoomType(String),
    Property,
}

impl InventoryScope {
    pub fn room_type(&self) -> Option<&str> {
        match self {
            InventoryScope::RoomType(code) => Some(code),
            InventoryScope::Property => None,
        }
    }

    pub fn key(&self) -> &str {
        self.room_type().unwrap_or("property")
    }
}

// How the counts in a record were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMethod {
    // A single `Available` number computed by the PMS.
    Direct,
    // Physical/sold/out-of-order numbers from which the hub derives availability.
    Calculated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    hotel_code: String,
    date_range: DateRange,
    scope: InventoryScope,
    counts: Vec<InventoryCount>,
}

impl InventoryRecord {
    pub fn new(
        hotel_code: &str,
        date_range: DateRange,
        scope: InventoryScope,
        counts: Vec<InventoryCount>,
    ) -> Result<Self, ModelError> {
        require_non_empty("hotel_code", hotel_code)?;
        if let InventoryScope::RoomType(code) = &scope {
            require_non_empty("room_type_code", code)?;
        }
        if counts.is_empty() {
            return Err(ModelError::MissingField("counts".to_string()));
        }
        for (i, count) in counts.iter().enumerate() {
            if counts[..i].iter().any(|c| c.count_type == count.count_type) {
                return Err(ModelError::Inconsistent(format!(
                    "count type {:?} listed twice",
                    count.count_type
                )));
            }
        }

        Ok(Self {
            hotel_code: hotel_code.to_string(),
            date_range,
            scope,
            counts,
        })
    }

    pub fn direct(
        hotel_code: &str,
        date_range: DateRange,
        scope: InventoryScope,
        available: u32,
    ) -> Result<Self, ModelError> {
        Self::new(
            hotel_code,
            date_range,
            scope,
            vec![InventoryCount {
                count_type: CountType::Available,
                count: available,
            }],
        )
    }

    pub fn hotel_code(&self) -> &str {
        &self.hotel_code
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn scope(&self) -> &InventoryScope {
        &self.scope
    }

    pub fn counts(&self) -> &[InventoryCount] {
        &self.counts
    }

    pub fn count(&self, count_type: CountType) -> Option<u32> {
        self.counts
            .iter()
            .find(|c| c.count_type == count_type)
            .map(|c| c.count)
    }

    pub fn has(&self, count_type: CountType) -> bool {
        self.count(count_type).is_some()
    }

    pub fn method(&self) -> CountMethod {
        if self.has(CountType::Available) {
            CountMethod::Direct
        } else {
            CountMethod::Calculated
        }
    }

    // Identity used to detect the same slot being sent twice in one batch.
    pub fn slot_key(&self) -> (String, String, DateRange) {
        (
            self.hotel_code.clone(),
            self.scope.key().to_string(),
            self.date_range,
        )
    }

    pub fn with_counts(&self, counts: Vec<InventoryCount>) -> Result<Self, ModelError> {
        Self::new(&self.hotel_code, self.date_range, self.scope.clone(), counts)
    }
}
