use std::{str::FromStr, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::{
    db::bill::{AccountType, Bill, BillStatus, BillWithOwner, PaymentStatus},
    web::files::{MAX_IMAGE_SIZE_BYTES, detect_image},
};

pub const MIN_ACCOUNT_NUMBER_LEN: usize = 5;

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d{2})?$").expect("valid amount regex"));

/// Per-field validation messages, rendered inline next to the form inputs.
#[derive(Clone, Debug, Default)]
pub struct FieldErrors {
    pub account_type: Option<String>,
    pub account_number: Option<String>,
    pub amount: Option<String>,
    pub bill_image: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.account_type.is_none()
            && self.account_number.is_none()
            && self.amount.is_none()
            && self.bill_image.is_none()
    }

    pub fn first(&self) -> Option<&str> {
        self.account_type
            .as_deref()
            .or(self.account_number.as_deref())
            .or(self.amount.as_deref())
            .or(self.bill_image.as_deref())
    }
}

/// Raw bill form fields as they come out of the multipart body.
#[derive(Clone, Debug, Default)]
pub struct BillSubmission {
    pub account_type: String,
    pub account_number: String,
    pub amount: String,
    pub image: Option<Vec<u8>>,
}

impl BillSubmission {
    /// Checked before anything touches the store; an invalid submission
    /// never leaves this module.
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();

        if AccountType::from_str(&self.account_type).is_err() {
            errors.account_type = Some("Select residential or business".to_string());
        }
        if self.account_number.chars().count() < MIN_ACCOUNT_NUMBER_LEN {
            errors.account_number = Some(format!(
                "Account number must be at least {MIN_ACCOUNT_NUMBER_LEN} characters"
            ));
        }
        if !AMOUNT_RE.is_match(&self.amount) {
            errors.amount =
                Some("Amount must be a whole number or carry two decimal places, like 120.50".to_string());
        }
        if let Some(image) = &self.image {
            if image.len() > MAX_IMAGE_SIZE_BYTES {
                errors.bill_image = Some("Image must be at most 1 MB".to_string());
            } else if detect_image(image).is_none() {
                errors.bill_image = Some("File is not a recognized image".to_string());
            }
        }

        errors
    }
}

/// Bill form state for re-rendering a page with inline errors.
#[derive(Clone, Debug)]
pub struct BillFormState {
    pub account_type: String,
    pub account_number: String,
    pub amount: String,
    pub errors: FieldErrors,
}

impl Default for BillFormState {
    fn default() -> Self {
        Self {
            account_type: "residential".to_string(),
            account_number: String::new(),
            amount: String::new(),
            errors: FieldErrors::default(),
        }
    }
}

impl BillFormState {
    pub fn with_errors(submission: &BillSubmission, errors: FieldErrors) -> Self {
        Self {
            account_type: submission.account_type.clone(),
            account_number: submission.account_number.clone(),
            amount: submission.amount.clone(),
            errors,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageRef {
    pub href: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct BillRow {
    pub id: i64,
    pub account_type: String,
    pub account_number: String,
    pub amount: String,
    pub status: String,
    pub status_badge: &'static str,
    pub payment_status: String,
    pub payment_badge: &'static str,
    pub due: String,
    pub image: Option<ImageRef>,
    pub paid: bool,
}

impl BillRow {
    pub fn from_bill(bill: &Bill, now: DateTime<Utc>) -> Self {
        Self {
            id: bill.id,
            account_type: bill.account_type.to_string(),
            account_number: bill.account_number.clone(),
            amount: bill.amount.clone(),
            status: bill.status.to_string(),
            status_badge: status_badge(bill.status),
            payment_status: bill.payment_status.to_string(),
            payment_badge: payment_badge(bill.payment_status),
            due: format_distance(&bill.created_at, now),
            image: bill.bill_image.as_deref().map(image_ref),
            paid: bill.payment_status == PaymentStatus::Paid,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdminBillRow {
    pub id: i64,
    pub username: String,
    pub account_type: String,
    pub account_number: String,
    pub amount: String,
    pub status: String,
    pub payment_status: String,
}

impl AdminBillRow {
    pub fn from_bill(entry: &BillWithOwner) -> Self {
        Self {
            id: entry.bill.id,
            username: entry.username.clone().unwrap_or_default(),
            account_type: entry.bill.account_type.to_string(),
            account_number: entry.bill.account_number.clone(),
            amount: entry.bill.amount.clone(),
            status: entry.bill.status.to_string(),
            payment_status: entry.bill.payment_status.to_string(),
        }
    }
}

fn status_badge(status: BillStatus) -> &'static str {
    match status {
        BillStatus::Pending => "secondary",
        BillStatus::Approved => "default",
        BillStatus::Rejected => "destructive",
    }
}

fn payment_badge(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Unpaid => "destructive",
        PaymentStatus::Paid => "default",
    }
}

fn image_ref(href: &str) -> ImageRef {
    ImageRef {
        href: href.to_string(),
        name: href.rsplit('/').next().unwrap_or(href).to_string(),
    }
}

/// Relative distance between a timestamp and now, e.g. "3 days ago" or
/// "in 2 hours".
pub fn format_distance(from: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - *from;
    let future = delta < chrono::Duration::zero();
    let delta = delta.abs();

    let text = if delta.num_seconds() < 60 {
        "less than a minute".to_string()
    } else if delta.num_minutes() < 60 {
        plural(delta.num_minutes(), "minute")
    } else if delta.num_hours() < 24 {
        plural(delta.num_hours(), "hour")
    } else if delta.num_days() < 30 {
        plural(delta.num_days(), "day")
    } else if delta.num_days() < 365 {
        plural(delta.num_days() / 30, "month")
    } else {
        plural(delta.num_days() / 365, "year")
    };

    if future {
        format!("in {text}")
    } else {
        format!("{text} ago")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Form body of the pay confirmation step.
#[derive(Clone, Debug, Deserialize)]
pub struct PayData {
    pub csrf_token: String,
}

/// Form body of the admin approve/reject action.
#[derive(Clone, Debug, Deserialize)]
pub struct StatusData {
    pub csrf_token: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn submission(account_number: &str, amount: &str) -> BillSubmission {
        BillSubmission {
            account_type: "business".to_string(),
            account_number: account_number.to_string(),
            amount: amount.to_string(),
            image: None,
        }
    }

    #[test]
    fn short_account_number_is_rejected() {
        let errors = submission("AC1", "100.00").validate();
        assert!(errors.account_number.is_some());
        assert!(errors.amount.is_none());
    }

    #[test]
    fn five_char_account_number_passes() {
        let errors = submission("12345", "100.00").validate();
        assert!(errors.is_empty());
    }

    #[test]
    fn amount_requires_two_decimals_or_none() {
        assert!(submission("ACC12345", "12.5").validate().amount.is_some());
        assert!(submission("ACC12345", "12.50").validate().is_empty());
        assert!(submission("ACC12345", "12").validate().is_empty());
        assert!(submission("ACC12345", "12.").validate().amount.is_some());
        assert!(submission("ACC12345", "12.500").validate().amount.is_some());
        assert!(submission("ACC12345", "abc").validate().amount.is_some());
        assert!(submission("ACC12345", "").validate().amount.is_some());
    }

    #[test]
    fn unknown_account_type_is_rejected() {
        let mut sub = submission("ACC12345", "100.00");
        sub.account_type = "commercial".to_string();
        assert!(sub.validate().account_type.is_some());
    }

    #[test]
    fn non_image_upload_is_rejected() {
        let mut sub = submission("ACC12345", "100.00");
        sub.image = Some(b"not an image".to_vec());
        assert!(sub.validate().bill_image.is_some());
    }

    #[test]
    fn badge_variants_follow_the_enums() {
        assert_eq!(status_badge(BillStatus::Pending), "secondary");
        assert_eq!(status_badge(BillStatus::Approved), "default");
        assert_eq!(status_badge(BillStatus::Rejected), "destructive");
        assert_eq!(payment_badge(PaymentStatus::Unpaid), "destructive");
        assert_eq!(payment_badge(PaymentStatus::Paid), "default");
    }

    #[test]
    fn distance_formatting() {
        let now = Utc::now();
        assert_eq!(format_distance(&(now - Duration::seconds(30)), now), "less than a minute ago");
        assert_eq!(format_distance(&(now - Duration::minutes(5)), now), "5 minutes ago");
        assert_eq!(format_distance(&(now - Duration::hours(1)), now), "1 hour ago");
        assert_eq!(format_distance(&(now - Duration::days(3)), now), "3 days ago");
        assert_eq!(format_distance(&(now - Duration::days(70)), now), "2 months ago");
        assert_eq!(format_distance(&(now + Duration::hours(2)), now), "in 2 hours");
    }

    #[test]
    fn image_name_is_the_last_path_segment() {
        let row = image_ref("/uploads/abc123.png");
        assert_eq!(row.name, "abc123.png");
    }
}
