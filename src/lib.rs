// HTNG 2011B / OTA codec for exchanging inventory, rates and reservations with a distribution hub

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod parser;
pub mod validation;

// Re-export key types for convenience
pub use builder::{
    BuilderContext, InvBlockNotifBuilder, InventoryNotifBuilder, MessageBuilder,
    RateNotifBuilder, RequiredElementsValidator, ReservationAckBuilder,
    ReservationNotifBuilder, SchemaValidator,
};
pub use config::{CodecConfig, CodeRules, RetryConfig};
pub use dispatch::{Delivery, DispatchStats, Dispatcher, HttpSoapTransport, SoapTransport};
pub use error::{CodecError, DispatchError, ModelError, ParseFailure, Violation, Violations};
pub use model::{MessageType, SoapHeader, SoapRequest, SoapResponse};
pub use parser::{
    InventoryParser, InventoryResponse, RateParser, RateResponse, ReservationParser,
    ReservationResponse, ResponseParser,
};
pub use validation::{LinkedRateMode, LinkedRatePolicy};
