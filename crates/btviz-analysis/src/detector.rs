//! Structural backtracking heuristic.

use crate::syntax::{calls_named, loops_in, Routine, SyntaxTree};

/// Whether `routine` calls itself by name and contains a loop.
///
/// Both checks are presence tests over the whole body: a call or loop in
/// dead code still counts. Only direct self-recursion is recognized.
pub fn is_backtracking(routine: &Routine<'_>) -> bool {
    let name = routine.name();
    !calls_named(routine.block, &name).is_empty() && !loops_in(routine.block).is_empty()
}

/// The first backtracking routine of `tree` in textual order.
pub fn find_backtracking(tree: &SyntaxTree) -> Option<Routine<'_>> {
    tree.routines().into_iter().find(is_backtracking)
}
