//! # Identity Layer
//!
//! Who you are on a payment-code network: the [`PaymentCode`] you hand
//! out instead of an address, the [`Account`] that derives it from your
//! seed, and the legacy [`Address`] type payments actually land on.
//!
//! A payment code reveals nothing about the addresses derived from it.
//! Only the two endpoints of a channel, holding opposite key halves,
//! can connect the two.

pub mod account;
pub mod address;
pub mod payment_code;

pub use account::{Account, AccountError};
pub use address::{Address, AddressError};
pub use payment_code::{CodeError, PaymentCode};
