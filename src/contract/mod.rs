//! Stage hand-off contracts.
//!
//! Pure shape and referential-integrity checks applied on both sides of
//! every stage execution: inputs before the worker runs, outputs before
//! they are merged into pipeline state.

pub mod validator;

pub use validator::ContractValidator;
