/*!
# Runtime

Dynamic value model and plan interpreter. Compilation produces typed
instruction units; this module applies them to concrete documents, with the
shared offset counter and Traversal Index pair scoped to one invocation.
*/

pub mod executor;
pub mod traversal;
pub mod value;

pub use executor::{
    DelegateRegistry, ExecContext, Executor, NoDelegates, RunOutcome, UnitOutcome,
};
pub use traversal::{trail_of, TraversalIndex};
pub use value::{ObjectValue, PathStep, Value};
