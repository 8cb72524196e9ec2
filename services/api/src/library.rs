//! Typed client for the library-loan endpoints
//!
//! Catalog reads are public; everything under `/user` and `/admin`, and the
//! account endpoints, are sent as auth-required requests so they get the
//! session's access token and recover from its expiry.

use auth::error::ClientResult;
use auth::http::ApiRequest;
use auth::middleware::ApiClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::models::{
    Account, AccountDraft, AccountInfo, Activation, ActivityLog, Book, BookDraft, BookRef,
    BorrowedBook, BorrowingReport, ChangePasswordRequest, ContactChange, ContactKind,
    EmailRequest, Listing, Message, Page, Registration, ReportRange, SystemConfig,
};

#[derive(Clone)]
pub struct LibraryApi {
    client: ApiClient,
}

impl LibraryApi {
    pub fn new(client: ApiClient) -> Self {
        LibraryApi { client }
    }

    async fn message(&self, request: ApiRequest) -> ClientResult<Message> {
        let response = self.client.execute(request).await?;
        // Acknowledgements come as `{message}`, plain text, or nothing.
        match &response.body {
            Value::Object(_) => response.json(),
            Value::String(text) => Ok(Message {
                message: Some(text.clone()),
            }),
            _ => Ok(Message::default()),
        }
    }

    /// Admin listing at `path`, or its `/search` twin filtered on `field`
    async fn admin_listing<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        term: &str,
    ) -> ClientResult<Vec<T>> {
        let term = term.trim();
        let request = if term.is_empty() {
            ApiRequest::get(path)
        } else {
            ApiRequest::get(format!("{}/search", path)).query(format!("{}.contains", field), term)
        };
        let listing: Listing<T> = self.client.execute_json(request.authorized()).await?;
        Ok(listing.into_items())
    }

    // Catalog

    pub async fn books(&self) -> ClientResult<Vec<Book>> {
        let listing: Listing<Book> = self
            .client
            .execute_json(ApiRequest::get("/common/books"))
            .await?;
        Ok(listing.into_items())
    }

    /// Books whose title contains `title`; an empty term lists everything
    pub async fn search_books(&self, title: &str) -> ClientResult<Vec<Book>> {
        let mut request = ApiRequest::get("/common/books/search");
        let title = title.trim();
        if !title.is_empty() {
            request = request.query("title.contains", title);
        }
        let page: Page<Book> = self.client.execute_json(request).await?;
        Ok(page.content)
    }

    pub async fn book(&self, id: i64) -> ClientResult<Book> {
        self.client
            .execute_json(ApiRequest::get(format!("/common/books/{}", id)))
            .await
    }

    // Account lifecycle, all public

    pub async fn register(&self, registration: &Registration) -> ClientResult<Message> {
        let request = ApiRequest::post("/common/accounts").json(registration)?;
        let ack = self.message(request).await?;
        info!("Registered {}, awaiting activation", registration.email);
        Ok(ack)
    }

    /// Follow the activation link sent after registration
    pub async fn activate(&self, token: &str) -> ClientResult<Activation> {
        self.client
            .execute_json(ApiRequest::get("/common/auth/active").query("token", token))
            .await
    }

    pub async fn resend_activation(&self, email: &str) -> ClientResult<Message> {
        let request = ApiRequest::post("/common/accounts/resend-link-active-account")
            .json(&EmailRequest { email })?;
        self.message(request).await
    }

    /// Email a password reset link
    pub async fn reset_password(&self, email: &str) -> ClientResult<Message> {
        let request = ApiRequest::post("/common/accounts/reset-pass").json(&EmailRequest { email })?;
        self.message(request).await
    }

    // Borrowing

    pub async fn borrow(&self, book_id: i64) -> ClientResult<Message> {
        let request = ApiRequest::post("/user/borrowing/borrow")
            .authorized()
            .json(&BookRef { book_id })?;
        let ack = self.message(request).await?;
        info!("Borrowed book {}", book_id);
        Ok(ack)
    }

    pub async fn borrowed_books(&self) -> ClientResult<Vec<BorrowedBook>> {
        let listing: Listing<BorrowedBook> = self
            .client
            .execute_json(ApiRequest::get("/user/borrowing/borrowed-books").authorized())
            .await?;
        Ok(listing.into_items())
    }

    pub async fn return_book(&self, book_id: i64) -> ClientResult<Message> {
        let request = ApiRequest::post("/user/borrowing/return")
            .authorized()
            .json(&BookRef { book_id })?;
        let ack = self.message(request).await?;
        info!("Returned book {}", book_id);
        Ok(ack)
    }

    // Account

    pub async fn my_info(&self) -> ClientResult<AccountInfo> {
        self.client
            .execute_json(ApiRequest::get("/common/accounts/my-info").authorized())
            .await
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> ClientResult<Message> {
        let request = ApiRequest::put("/user/accounts/change-password")
            .authorized()
            .json(&ChangePasswordRequest {
                old_password,
                new_password,
            })?;
        self.message(request).await
    }

    /// Send a one-time password confirming the new email or phone
    pub async fn request_contact_change(&self, kind: ContactKind, value: &str) -> ClientResult<Message> {
        let request = ApiRequest::post(kind.request_path())
            .authorized()
            .json(&ContactChange::new(kind, value))?;
        self.message(request).await
    }

    pub async fn verify_contact_change(
        &self,
        kind: ContactKind,
        value: &str,
        otp: &str,
    ) -> ClientResult<Message> {
        let request = ApiRequest::post(kind.verify_path())
            .authorized()
            .json(&ContactChange {
                otp: Some(otp),
                ..ContactChange::new(kind, value)
            })?;
        let ack = self.message(request).await?;
        info!("Contact {:?} changed", kind);
        Ok(ack)
    }

    // Administration

    pub async fn admin_books(&self) -> ClientResult<Vec<Book>> {
        let listing: Listing<Book> = self
            .client
            .execute_json(ApiRequest::get("/admin/books").authorized())
            .await?;
        Ok(listing.into_items())
    }

    pub async fn search_admin_books(&self, title: &str) -> ClientResult<Vec<Book>> {
        self.admin_listing("/admin/books", "title", title).await
    }

    pub async fn create_book(&self, draft: &BookDraft) -> ClientResult<Book> {
        let request = ApiRequest::post("/admin/books").authorized().json(draft)?;
        let book: Book = self.client.execute_json(request).await?;
        info!("Created book {} ({})", book.id, book.title);
        Ok(book)
    }

    pub async fn update_book(&self, id: i64, draft: &BookDraft) -> ClientResult<Book> {
        let request = ApiRequest::put(format!("/admin/books/{}", id))
            .authorized()
            .json(draft)?;
        self.client.execute_json(request).await
    }

    pub async fn delete_book(&self, id: i64) -> ClientResult<Message> {
        let ack = self
            .message(ApiRequest::delete(format!("/admin/books/{}", id)).authorized())
            .await?;
        info!("Deleted book {}", id);
        Ok(ack)
    }

    pub async fn accounts(&self) -> ClientResult<Vec<Account>> {
        let listing: Listing<Account> = self
            .client
            .execute_json(ApiRequest::get("/admin/accounts").authorized())
            .await?;
        Ok(listing.into_items())
    }

    pub async fn search_accounts(&self, email: &str) -> ClientResult<Vec<Account>> {
        self.admin_listing("/admin/accounts", "email", email).await
    }

    pub async fn account(&self, id: i64) -> ClientResult<Account> {
        self.client
            .execute_json(ApiRequest::get(format!("/admin/accounts/{}", id)).authorized())
            .await
    }

    pub async fn create_account(&self, draft: &AccountDraft) -> ClientResult<Account> {
        let request = ApiRequest::post("/admin/accounts").authorized().json(draft)?;
        self.client.execute_json(request).await
    }

    pub async fn update_account(&self, id: i64, draft: &AccountDraft) -> ClientResult<Account> {
        let request = ApiRequest::put(format!("/admin/accounts/{}", id))
            .authorized()
            .json(draft)?;
        self.client.execute_json(request).await
    }

    pub async fn delete_account(&self, id: i64) -> ClientResult<Message> {
        let ack = self
            .message(ApiRequest::delete(format!("/admin/accounts/{}", id)).authorized())
            .await?;
        info!("Deleted account {}", id);
        Ok(ack)
    }

    pub async fn activity_logs(&self) -> ClientResult<Vec<ActivityLog>> {
        let listing: Listing<ActivityLog> = self
            .client
            .execute_json(ApiRequest::get("/admin/activity-log").authorized())
            .await?;
        Ok(listing.into_items())
    }

    pub async fn search_activity_logs(&self, performed_by: &str) -> ClientResult<Vec<ActivityLog>> {
        self.admin_listing("/admin/activity-log", "performedBy", performed_by)
            .await
    }

    pub async fn activity_log(&self, id: i64) -> ClientResult<ActivityLog> {
        self.client
            .execute_json(ApiRequest::get(format!("/admin/activity-log/{}", id)).authorized())
            .await
    }

    pub async fn system_config(&self) -> ClientResult<SystemConfig> {
        self.client
            .execute_json(ApiRequest::get("/admin/system-config").authorized())
            .await
    }

    pub async fn set_maintenance_mode(&self, enabled: bool) -> ClientResult<Message> {
        let request = ApiRequest::post("/admin/system-config/maintenance")
            .authorized()
            .json(&SystemConfig {
                maintenance_mode: enabled,
            })?;
        let ack = self.message(request).await?;
        info!("Maintenance mode set to {}", enabled);
        Ok(ack)
    }

    /// Loans per title between two `YYYY-MM-DD` dates, inclusive
    pub async fn borrowing_report(&self, from_date: &str, to_date: &str) -> ClientResult<BorrowingReport> {
        let request = ApiRequest::post("/admin/borrowing/report")
            .authorized()
            .json(&ReportRange { from_date, to_date })?;
        self.client.execute_json(request).await
    }
}
