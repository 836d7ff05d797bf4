//! Production implementations of the collaborator traits.
//!
//! These talk to the LI.FI HTTP API, JSON-RPC nodes through alloy, and the
//! system clock. Tests use the fakes in [`crate::testing`] instead.

mod alloy;
mod lifi;
mod tokio_clock;

pub use self::alloy::{AlloyBalanceProvider, AlloyWallet};
pub use self::lifi::LiFiClient;
pub use self::tokio_clock::TokioClock;
