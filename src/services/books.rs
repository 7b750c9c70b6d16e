//! Book catalog service

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
    policy::{Action, Subject},
    repository::Repository,
};

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
}

impl BooksService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self) -> AppResult<Vec<Book>> {
        self.repository.books.list().await
    }

    pub async fn get(&self, id: i32) -> AppResult<Book> {
        self.repository
            .books
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn create(&self, subject: &Subject, book: CreateBook) -> AppResult<Book> {
        subject.require(Action::CreateBook)?;
        let created = self.repository.books.create(book).await?;
        tracing::info!("Created book id={} '{}'", created.id, created.title);
        Ok(created)
    }

    pub async fn update(&self, subject: &Subject, id: i32, changes: UpdateBook) -> AppResult<Book> {
        subject.require(Action::UpdateBook)?;
        self.repository.books.update(id, changes).await
    }

    pub async fn delete(&self, subject: &Subject, id: i32) -> AppResult<()> {
        subject.require(Action::DeleteBook)?;
        self.repository.books.delete(id).await?;
        tracing::info!("Deleted book id={}", id);
        Ok(())
    }
}
