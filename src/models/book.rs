//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub author: String,
    pub year: Option<i32>,
    pub synopsis: Option<String>,
    /// Copies currently on the shelf
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book fields embedded in a transaction
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub author: String,
}

impl From<&Book> for BookShort {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    pub year: Option<i32>,
    pub synopsis: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

/// Update book request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub year: Option<i32>,
    pub synopsis: Option<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

impl UpdateBook {
    /// Apply the provided fields onto an existing book
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(ref title) = self.title {
            book.title = title.clone();
        }
        if let Some(ref description) = self.description {
            book.description = Some(description.clone());
        }
        if let Some(ref author) = self.author {
            book.author = author.clone();
        }
        if let Some(year) = self.year {
            book.year = Some(year);
        }
        if let Some(ref synopsis) = self.synopsis {
            book.synopsis = Some(synopsis.clone());
        }
        if let Some(stock) = self.stock {
            book.stock = stock;
        }
    }
}
