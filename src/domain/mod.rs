//! Framework-agnostic domain types.

pub mod order;
pub mod payment;
pub mod ticket_type;

pub use order::{order_code, BuyerInfo, CancelReason, LineItem, Order, OrderStatus, UnknownVariant};
pub use payment::{PaymentMethod, PaymentOutcome, PaymentSession, WebhookEvent};
pub use ticket_type::{NewTicketType, Reservation, TicketType};
