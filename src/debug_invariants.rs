//! Opt-in structural validation for the distributed graph.

use crate::comm::{agree, Communicator};
use crate::config::GraphConfig;
use crate::graph_error::GraphError;

/// Types that can check their own structural invariants.
pub trait DebugInvariants {
    /// Validate invariants and return the first violation found.
    fn validate_invariants(&self) -> Result<(), GraphError>;

    /// Panic on a violation in debug builds or with `strict-invariants`.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "graph");
    }
}

/// Run a fallible check and panic on error when invariant checking is compiled in.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

/// Check `value` after a pipeline step.
///
/// With `cfg.verify` a violation becomes a collective error; otherwise the
/// check only runs where `debug_invariants!` is compiled in, and panics.
pub(crate) fn check_step<C, T>(
    comm: &C,
    cfg: &GraphConfig,
    value: &T,
    op: &'static str,
) -> Result<(), GraphError>
where
    C: Communicator + ?Sized,
    T: DebugInvariants,
{
    if !cfg.verify {
        value.debug_assert_invariants();
        return Ok(());
    }
    let checked = value.validate_invariants().inspect_err(|e| {
        log::error!("verification after {op}() failed: {e}");
    });
    agree(comm, op, checked)
}
