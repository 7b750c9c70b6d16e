//! Access policy: which subject may perform which action on which resource.
//!
//! Everything here is pure. Handlers resolve a [`Subject`] per request and
//! services call [`Subject::require`] with the action they are about to take,
//! passing the owner of the resource when ownership matters.

use crate::{error::AppError, models::user::Role};

/// The authenticated identity attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: i32,
    pub role: Role,
}

/// Actions guarded by the policy; owner ids are user ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListUsers,
    ReadUser { owner: i32 },
    UpdateUser { owner: i32 },
    DeleteUser { owner: i32 },
    CreateBook,
    UpdateBook,
    DeleteBook,
    CreateTransaction { borrower: i32 },
    ListAllTransactions,
    ReadTransaction { owner: i32 },
    UpdateTransaction { owner: i32 },
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::ListUsers => "list users",
            Action::ReadUser { .. } => "read this user",
            Action::UpdateUser { .. } => "update this user",
            Action::DeleteUser { .. } => "delete this user",
            Action::CreateBook => "create books",
            Action::UpdateBook => "update books",
            Action::DeleteBook => "delete books",
            Action::CreateTransaction { .. } => "create this transaction",
            Action::ListAllTransactions => "list all transactions",
            Action::ReadTransaction { .. } => "read this transaction",
            Action::UpdateTransaction { .. } => "update this transaction",
        }
    }
}

impl Subject {
    pub fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }

    fn owns(&self, owner: i32) -> bool {
        self.id == owner
    }

    /// Decide whether this subject may perform `action`
    pub fn can(&self, action: Action) -> bool {
        match (self.role, action) {
            (Role::Admin, Action::ListUsers | Action::ReadUser { .. }) => true,
            (Role::User, Action::ListUsers) => false,
            (Role::User, Action::ReadUser { owner }) => self.owns(owner),

            // Nobody edits or removes someone else's account, admins included
            (_, Action::UpdateUser { owner } | Action::DeleteUser { owner }) => self.owns(owner),

            (role, Action::CreateBook | Action::UpdateBook | Action::DeleteBook) => {
                role == Role::Admin
            }

            // Admins manage loans but never borrow
            (Role::Admin, Action::CreateTransaction { .. }) => false,
            (Role::User, Action::CreateTransaction { borrower }) => self.owns(borrower),

            (role, Action::ListAllTransactions) => role == Role::Admin,
            (Role::Admin, Action::ReadTransaction { .. } | Action::UpdateTransaction { .. }) => {
                true
            }
            (
                Role::User,
                Action::ReadTransaction { owner } | Action::UpdateTransaction { owner },
            ) => self.owns(owner),
        }
    }

    /// Like [`Subject::can`] but fails with `Forbidden`
    pub fn require(&self, action: Action) -> Result<(), AppError> {
        if self.can(action) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Not allowed to {}",
                action.describe()
            )))
        }
    }
}
