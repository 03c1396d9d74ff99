// Protocol value objects. Immutable once built; `with_*` methods return new values.
pub mod block;
pub mod common;
pub mod inventory;
pub mod rate;
pub mod reservation;
pub mod soap;

pub use block::{BlockStatus, InventoryBlock, RoomAllocation};
pub use common::DateRange;
pub use inventory::{CountMethod, CountType, InventoryCount, InventoryRecord, InventoryScope};
pub use rate::{LinkedRate, Percent, Rate, RateAdjustment, RateFlags, RatePlan, RatePlanOperation};
pub use reservation::{
    Address, AlternatePayment, ContactInfo, DailyRate, Deposit, Guarantee, Guest, GuestCategory,
    GuestCounts, Profile, Reservation, ReservationDraft, ReservationType, RoomStay,
    ServiceRequest, SpecialRequest, TransactionMode,
};
pub use soap::{Credentials, MessageType, SoapHeader, SoapRequest, SoapResponse};
