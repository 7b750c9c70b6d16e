//! Data models for the library server

pub mod book;
pub mod transaction;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookShort};
pub use transaction::{LendingState, LoanStatus, Transaction, TransactionDetails};
pub use user::{Role, User};
