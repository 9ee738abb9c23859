//! Progress markers for suspended nodes
//!
//! A composite node that suspends records where it stopped with one of these
//! markers. On the next pass the node jumps straight back to that point.

/// Where a suspended node stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Operand at this index had not finished; earlier operands are saved
    Operand(usize),
    /// Condition already decided; the chosen branch suspended
    Branch(bool),
    /// Loop body suspended during this iteration
    Iteration(i64),
    /// Operands done; the invoked body suspended in its own scope
    Invoking,
    /// A `yield` handed control back and has not been resumed yet
    Yielded,
}
