pub mod pending_sweeper;

pub use pending_sweeper::{PendingPaymentSweeper, SweepReport, SweeperConfig};
