//! State that survives between invocations: the job ledger and the
//! per-run key/value store.

mod env;
mod ledger;

pub use env::EnvStore;
pub use ledger::{JobLedger, LedgerRecord, RunId};
