mod order;
mod order_status;
mod position;
mod rejection;
mod risk_profile;
mod side;
mod signal;
mod trade;

pub use order::{Order, OrderId};
pub use order_status::OrderStatus;
pub use position::Position;
pub use rejection::{RejectionReason, RiskRejectReason};
pub use risk_profile::RiskProfile;
pub use side::Side;
pub use signal::{IntentKey, Signal};
pub use trade::{Fill, Trade, TradeId};
