use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;

use crate::db_types::InvoiceCode;

const SUFFIX_LEN: usize = 6;

fn invoice_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^INV/(\d{8})/(\d+)/([A-Z0-9]{6})$").expect("invoice pattern is valid"))
}

fn receipt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{3,39}$").expect("receipt pattern is valid"))
}

/// Generates an invoice code of the form `INV/<yyyymmdd>/<merchant id>/<6 random characters>`.
pub fn new_invoice_code(merchant_id: i64, now: DateTime<Utc>) -> InvoiceCode {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|c| (c as char).to_ascii_uppercase())
        .take(SUFFIX_LEN)
        .collect();
    InvoiceCode(format!("INV/{}/{merchant_id}/{suffix}", now.format("%Y%m%d")))
}

/// Splits an invoice code into its date and merchant id.
pub fn parse_invoice_code(code: &str) -> Option<(NaiveDate, i64)> {
    let captures = invoice_pattern().captures(code)?;
    let date = NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y%m%d").ok()?;
    let merchant_id = captures.get(2)?.as_str().parse().ok()?;
    Some((date, merchant_id))
}

/// Trims and upper-cases a carrier receipt number, rejecting anything that does not look like one.
pub fn normalize_receipt_number(receipt: &str) -> Option<String> {
    let receipt = receipt.trim().to_ascii_uppercase();
    receipt_pattern().is_match(&receipt).then_some(receipt)
}

/// Generates the id of a payment made from the buyer's wallet.
pub fn new_wallet_payment_id(buyer_id: i64, now: DateTime<Utc>) -> String {
    let nonce: u32 = rand::thread_rng().gen();
    format!("WLT-{buyer_id}-{}-{nonce:08x}", now.timestamp_millis())
}
