pub mod error;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{GatewayError, GatewayResult};
pub use provider::TransferGateway;
pub use providers::{PaystackConfig, PaystackProvider};
pub use types::{
    MobileMoneyNetwork, PayoutDetails, PayoutDetailsError, PayoutMethod, ResendReason,
    TransferEvent, TransferEventKind, TransferInitiation, TransferOutcome, TransferRequest,
    TransferSnapshot, TransferStatus,
};
