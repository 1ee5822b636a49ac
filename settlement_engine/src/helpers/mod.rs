mod invoice;

pub use invoice::{new_invoice_code, new_wallet_payment_id, normalize_receipt_number, parse_invoice_code};
