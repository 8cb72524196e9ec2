//! Payloads of the library-loan REST API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A book of the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub total_copies: u32,
    #[serde(default)]
    pub available_copies: u32,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Fields of a book created or edited by an administrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub category: Option<String>,
    pub total_copies: u32,
    pub available_copies: u32,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: Option<u64>,
}

/// A loan of the logged-in member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowedBook {
    pub book_id: i64,
    pub title: String,
    #[serde(default)]
    pub borrow_date: Option<String>,
    #[serde(default)]
    pub return_date: Option<String>,
    #[serde(default)]
    pub returned: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRef {
    pub book_id: i64,
}

/// Profile of the logged-in account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
}

/// Self-service sign-up; the account is activated from an emailed link
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<String>,
    pub phone: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct EmailRequest<'a> {
    pub email: &'a str,
}

/// Answer of the account activation link
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Activation {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Contact detail whose change is confirmed with a one-time password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Email,
    Phone,
}

impl ContactKind {
    pub(crate) fn request_path(self) -> &'static str {
        match self {
            ContactKind::Email => "/user/accounts/request-change-mail",
            ContactKind::Phone => "/user/accounts/request-change-phone",
        }
    }

    pub(crate) fn verify_path(self) -> &'static str {
        match self {
            ContactKind::Email => "/user/accounts/verify-change-mail",
            ContactKind::Phone => "/user/accounts/verify-change-phone",
        }
    }
}

/// `{email}` or `{phone}`, plus the OTP when verifying
#[derive(Debug, Default, Serialize)]
pub(crate) struct ContactChange<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<&'a str>,
}

impl<'a> ContactChange<'a> {
    pub(crate) fn new(kind: ContactKind, value: &'a str) -> Self {
        match kind {
            ContactKind::Email => ContactChange {
                email: Some(value),
                ..Default::default()
            },
            ContactKind::Phone => ContactChange {
                phone: Some(value),
                ..Default::default()
            },
        }
    }
}

/// An account as listed by administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Fields of an account created or edited by an administrator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDraft {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dob: Option<String>,
    pub phone: Option<String>,
    /// Only sent on creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub active: bool,
}

/// An audited administrative action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: i64,
    pub action: String,
    #[serde(default)]
    pub performed_by: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub old_data: Option<serde_json::Value>,
    #[serde(default)]
    pub new_data: Option<serde_json::Value>,
}

/// Inclusive date range of a borrowing report, as `YYYY-MM-DD`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRange<'a> {
    pub from_date: &'a str,
    pub to_date: &'a str,
}

/// Borrowing statistics over a date range
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingReport {
    /// Number of loans per book title
    #[serde(default)]
    pub borrowed_books: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_books: u64,
    #[serde(default)]
    pub total_users: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    pub maintenance_mode: bool,
}

/// Acknowledgement carrying a human readable message
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message: Option<String>,
}

/// Accept both a bare array and a page object, as listing endpoints vary
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Items(Vec<T>),
    Paged(Page<T>),
}

impl<T> Listing<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        match self {
            Listing::Items(items) => items,
            Listing::Paged(page) => page.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_book_uses_backend_field_names() {
        let book: Book = serde_json::from_value(json!({
            "id": 3,
            "title": "Dune",
            "author": "Frank Herbert",
            "category": "Science fiction",
            "totalCopies": 4,
            "availableCopies": 1,
            "imageUrl": null
        }))
        .unwrap();
        assert_eq!(book.total_copies, 4);
        assert_eq!(book.available_copies, 1);
        assert_eq!(book.image_url, None);
    }

    #[test]
    fn test_listing_accepts_array_or_page() {
        let items: Listing<Book> = serde_json::from_value(json!([])).unwrap();
        assert!(items.into_items().is_empty());

        let page: Listing<SystemConfig> =
            serde_json::from_value(json!({"content": [{"maintenanceMode": true}]})).unwrap();
        assert_eq!(
            page.into_items(),
            vec![SystemConfig {
                maintenance_mode: true
            }]
        );
    }

    #[test]
    fn test_account_draft_omits_missing_password() {
        let draft = AccountDraft {
            email: "reader@library.test".into(),
            first_name: Some("Ada".into()),
            last_name: None,
            dob: None,
            phone: None,
            password: None,
            active: true,
        };
        let body = serde_json::to_value(&draft).unwrap();
        assert!(body.get("password").is_none());
        assert_eq!(body["firstName"], json!("Ada"));
    }

    #[test]
    fn test_contact_change_names_only_its_field() {
        let body = serde_json::to_value(ContactChange::new(ContactKind::Phone, "0900")).unwrap();
        assert_eq!(body, json!({"phone": "0900"}));

        let body = serde_json::to_value(ContactChange {
            otp: Some("123456"),
            ..ContactChange::new(ContactKind::Email, "new@library.test")
        })
        .unwrap();
        assert_eq!(body, json!({"email": "new@library.test", "otp": "123456"}));
    }

    #[test]
    fn test_report_defaults_when_empty() {
        let report: BorrowingReport = serde_json::from_value(json!({"totalUsers": 2})).unwrap();
        assert!(report.borrowed_books.is_empty());
        assert_eq!((report.total_books, report.total_users), (0, 2));
    }
}
