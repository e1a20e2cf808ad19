//! OCR invoice prediction -> flat invoice records.
//!
//! Input shape: `{ document: { inference: { prediction: { ... } } } }`, where
//! header fields are `{ value: T }` wrappers and list entries are flat objects.
//! Any level may be missing; the mapping is total and never fails.

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::json_path::{array_at, at, f64_at, is_truthy, str_at};
use crate::schema::{InvoiceHeaderRecord, InvoiceLineItem, InvoiceMapping};

const PREDICTION_PATH: [&str; 3] = ["document", "inference", "prediction"];

/// Registration tag for VAT numbers in `*_company_registrations`.
pub const VAT_NUMBER: &str = "VAT NUMBER";
pub const TAX_ID: &str = "TAX ID";

const MISSING_DESCRIPTION: &str = "-";

fn prediction(doc: &Value) -> Option<&Value> {
    at(doc, &PREDICTION_PATH)
}

/// `value` of a `{ value: T }` wrapped prediction field, as a string.
fn wrapped_str(prediction: Option<&Value>, field: &str) -> Option<String> {
    str_at(prediction?, &[field, "value"])
}

fn wrapped_f64(prediction: Option<&Value>, field: &str) -> Option<f64> {
    f64_at(prediction?, &[field, "value"])
}

/// First `value` whose `type` equals `tag` in a `[{ type, value }]` list.
pub fn extract_registration_number(list: Option<&Value>, tag: &str) -> Option<String> {
    list?
        .as_array()?
        .iter()
        .find(|entry| entry.get("type").and_then(Value::as_str) == Some(tag))
        .and_then(|entry| str_at(entry, &["value"]))
}

/// `key` from the first payment-detail record where it is set.
pub fn extract_payment_detail(list: Option<&Value>, key: &str) -> Option<String> {
    list?
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get(key))
        .filter(|value| is_truthy(value))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Flat header record. Absent data is `None`.
pub fn map_header(doc: &Value) -> InvoiceHeaderRecord {
    let p = prediction(doc);
    let list = |field: &str| p.and_then(|p| p.get(field));

    let reference_number = p
        .and_then(|p| array_at(p, &["reference_numbers"]))
        .and_then(|refs| refs.first())
        .and_then(|first| str_at(first, &["value"]));

    InvoiceHeaderRecord {
        invoice_number: wrapped_str(p, "invoice_number"),
        invoice_date: wrapped_str(p, "date"),
        delivery_date: wrapped_str(p, "delivery_date"),
        due_date: wrapped_str(p, "due_date"),
        payment_date: wrapped_str(p, "payment_date"),
        total_amount: wrapped_f64(p, "total_amount"),
        total_tax: wrapped_f64(p, "total_tax"),
        total_net: wrapped_f64(p, "total_net"),
        currency: p.and_then(|p| str_at(p, &["locale", "currency"])),

        supplier_name: wrapped_str(p, "supplier_name"),
        supplier_vat_number: extract_registration_number(
            list("supplier_company_registrations"),
            VAT_NUMBER,
        ),
        supplier_tax_id: extract_registration_number(
            list("supplier_company_registrations"),
            TAX_ID,
        ),
        supplier_email: wrapped_str(p, "supplier_email"),
        supplier_phone: wrapped_str(p, "supplier_phone_number"),
        supplier_website: wrapped_str(p, "supplier_website"),
        supplier_address: wrapped_str(p, "supplier_address"),

        customer_name: wrapped_str(p, "customer_name"),
        customer_id: wrapped_str(p, "customer_id"),
        customer_address: wrapped_str(p, "customer_address"),
        customer_vat_number: extract_registration_number(
            list("customer_company_registrations"),
            VAT_NUMBER,
        ),

        po_number: wrapped_str(p, "po_number"),
        reference_number,

        iban: extract_payment_detail(list("supplier_payment_details"), "iban"),
        swift: extract_payment_detail(list("supplier_payment_details"), "swift"),
    }
}

/// Line items in source order with 1-based indexes. Empty when absent.
pub fn map_line_items(doc: &Value) -> Vec<InvoiceLineItem> {
    let Some(items) = prediction(doc).and_then(|p| array_at(p, &["line_items"])) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| InvoiceLineItem {
            id: Uuid::new_v4().to_string(),
            item_index: (i + 1) as u32,
            description: str_at(item, &["description"])
                .unwrap_or_else(|| MISSING_DESCRIPTION.to_string()),
            quantity: f64_at(item, &["quantity"]),
            unit_price: f64_at(item, &["unit_price"]),
            total_price: f64_at(item, &["total_amount"]),
            tax_rate: f64_at(item, &["tax_rate"]),
            product_code: str_at(item, &["product_code"]),
            unit_measure: str_at(item, &["unit_measure"]),
        })
        .collect()
}

/// Header and line items together.
pub fn map_document(doc: &Value) -> InvoiceMapping {
    let mapping = InvoiceMapping {
        header: map_header(doc),
        line_items: map_line_items(doc),
    };
    debug!(
        "Mapped invoice {:?} with {} line items",
        mapping.header.invoice_number,
        mapping.line_items.len()
    );
    mapping
}
