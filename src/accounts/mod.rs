//! Managed account lifecycle
//!
//! The registry joins the host's account database with the panel's
//! membership ledger; the sweeper removes accounts past their expiration.

pub mod command;
pub mod connection;
pub mod ledger;
pub mod memory;
pub mod registry;
pub mod sweeper;
pub mod system;

pub use command::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use connection::{ConnectionInfo, ConnectionSource, Payloads, Ports};
pub use ledger::MembershipLedger;
pub use memory::{MemoryAccount, MemoryAccounts, Operation};
pub use registry::{AccountRegistry, ManagedAccount};
pub use sweeper::{SweepFailure, SweepReport, Sweeper};
pub use system::{AccountDatabase, SystemAccounts};
