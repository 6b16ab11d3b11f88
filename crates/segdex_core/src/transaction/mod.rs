//! Mutation batches and modification reports.
//!
//! An [`IndexTransaction`] travels down the manager stack. Each layer claims
//! the part it handled and describes it in a [`ModificationReport`]; the
//! remainder, obtained with the pure reducer [`IndexTransaction::apply`], is
//! passed to the next layer.

mod report;
mod state;

pub use report::ModificationReport;
pub use state::IndexTransaction;
