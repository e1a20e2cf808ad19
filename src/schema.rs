//! Output record types.
//!
//! Every field is independently optional; `None` means "not present in the
//! source", never an error. Records serialize absent fields as `null`.

use serde::{Deserialize, Serialize};

use crate::patterns::FieldKind;

/// Structured address/contact record extracted from freeform text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    #[serde(default)]
    pub full_name: Option<String>,
    /// Digits only with a leading `'`, e.g. `'79123456789`.
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house: Option<String>,
    /// Building / block / corpus.
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub apartment: Option<String>,
    /// `dd.mm.yyyy`
    #[serde(default)]
    pub birthday: Option<String>,
    /// The original input, verbatim.
    #[serde(default)]
    pub raw: String,
}

impl AddressRecord {
    /// Empty record carrying only the original input.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Default::default()
        }
    }

    pub fn field_mut(&mut self, field: FieldKind) -> &mut Option<String> {
        match field {
            FieldKind::Name => &mut self.full_name,
            FieldKind::Phone => &mut self.phone,
            FieldKind::Email => &mut self.email,
            FieldKind::PostalCode => &mut self.postal_code,
            FieldKind::Region => &mut self.region,
            FieldKind::City => &mut self.city,
            FieldKind::Street => &mut self.street,
            FieldKind::House => &mut self.house,
            FieldKind::Block => &mut self.block,
            FieldKind::Apartment => &mut self.apartment,
            FieldKind::Birthday => &mut self.birthday,
        }
    }

    pub fn field(&self, field: FieldKind) -> Option<&str> {
        match field {
            FieldKind::Name => self.full_name.as_deref(),
            FieldKind::Phone => self.phone.as_deref(),
            FieldKind::Email => self.email.as_deref(),
            FieldKind::PostalCode => self.postal_code.as_deref(),
            FieldKind::Region => self.region.as_deref(),
            FieldKind::City => self.city.as_deref(),
            FieldKind::Street => self.street.as_deref(),
            FieldKind::House => self.house.as_deref(),
            FieldKind::Block => self.block.as_deref(),
            FieldKind::Apartment => self.apartment.as_deref(),
            FieldKind::Birthday => self.birthday.as_deref(),
        }
    }

    /// Number of populated fields (excluding `raw`).
    pub fn filled_count(&self) -> usize {
        FieldKind::ALL
            .iter()
            .filter(|f| self.field(**f).is_some())
            .count()
    }
}

/// Flat invoice header mapped from an OCR prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceHeaderRecord {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub delivery_date: Option<String>,
    pub due_date: Option<String>,
    pub payment_date: Option<String>,
    pub total_amount: Option<f64>,
    pub total_tax: Option<f64>,
    pub total_net: Option<f64>,
    pub currency: Option<String>,

    pub supplier_name: Option<String>,
    pub supplier_vat_number: Option<String>,
    pub supplier_tax_id: Option<String>,
    pub supplier_email: Option<String>,
    pub supplier_phone: Option<String>,
    pub supplier_website: Option<String>,
    pub supplier_address: Option<String>,

    pub customer_name: Option<String>,
    pub customer_id: Option<String>,
    pub customer_address: Option<String>,
    pub customer_vat_number: Option<String>,

    pub po_number: Option<String>,
    pub reference_number: Option<String>,

    pub iban: Option<String>,
    pub swift: Option<String>,
}

/// One invoice row, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    /// Fresh per mapping call, not stable across calls.
    pub id: String,
    /// 1-based position in the source list.
    pub item_index: u32,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub tax_rate: Option<f64>,
    pub product_code: Option<String>,
    pub unit_measure: Option<String>,
}

/// Header plus line items for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceMapping {
    pub header: InvoiceHeaderRecord,
    pub line_items: Vec<InvoiceLineItem>,
}
