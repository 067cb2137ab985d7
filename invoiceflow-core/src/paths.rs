//! Target-field paths and the write dispatch table.
//!
//! Completion rules address the document through string paths. The writable
//! surface is a closed set — header scalars, party fields, the extensions
//! bag and broadcast item fields — parsed up front into [`TargetPath`] and
//! dispatched through explicit match tables. An invalid path or an
//! uncoercible value is a [`PathError`], which the engine records as a
//! FAILED outcome; nothing here panics or silently ignores a write.

use crate::error::PathError;
use crate::expr::eval::{format_number, type_name};
use crate::types::{Address, ExtValue, Invoice, LineItem, Party};
use chrono::NaiveDate;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyKind {
    Supplier,
    Customer,
}

impl PartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyKind::Supplier => "supplier",
            PartyKind::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    InvoiceNumber,
    IssueDate,
    DueDate,
    InvoiceType,
    Country,
    Currency,
    Status,
    ReferenceNumber,
    PaymentTerms,
    Notes,
    TotalAmount,
    TaxAmount,
    NetAmount,
    TaxRate,
}

impl HeaderField {
    fn parse(name: &str) -> Option<HeaderField> {
        Some(match name {
            "invoice_number" => HeaderField::InvoiceNumber,
            "issue_date" => HeaderField::IssueDate,
            "due_date" => HeaderField::DueDate,
            "invoice_type" => HeaderField::InvoiceType,
            "country" => HeaderField::Country,
            "currency" => HeaderField::Currency,
            "status" => HeaderField::Status,
            "reference_number" => HeaderField::ReferenceNumber,
            "payment_terms" => HeaderField::PaymentTerms,
            "notes" => HeaderField::Notes,
            "total_amount" => HeaderField::TotalAmount,
            "tax_amount" => HeaderField::TaxAmount,
            "net_amount" => HeaderField::NetAmount,
            "tax_rate" => HeaderField::TaxRate,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeaderField::InvoiceNumber => "invoice_number",
            HeaderField::IssueDate => "issue_date",
            HeaderField::DueDate => "due_date",
            HeaderField::InvoiceType => "invoice_type",
            HeaderField::Country => "country",
            HeaderField::Currency => "currency",
            HeaderField::Status => "status",
            HeaderField::ReferenceNumber => "reference_number",
            HeaderField::PaymentTerms => "payment_terms",
            HeaderField::Notes => "notes",
            HeaderField::TotalAmount => "total_amount",
            HeaderField::TaxAmount => "tax_amount",
            HeaderField::NetAmount => "net_amount",
            HeaderField::TaxRate => "tax_rate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyField {
    Name,
    TaxNo,
    Email,
    Phone,
    BankAccount,
    BankName,
    Address,
}

impl PartyField {
    fn parse(name: &str) -> Option<PartyField> {
        Some(match name {
            "name" => PartyField::Name,
            // Both spellings appear in historical rule sets.
            "tax_no" | "tax_id" => PartyField::TaxNo,
            "email" => PartyField::Email,
            "phone" => PartyField::Phone,
            "bank_account" => PartyField::BankAccount,
            "bank_name" => PartyField::BankName,
            "address" => PartyField::Address,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PartyField::Name => "name",
            PartyField::TaxNo => "tax_no",
            PartyField::Email => "email",
            PartyField::Phone => "phone",
            PartyField::BankAccount => "bank_account",
            PartyField::BankName => "bank_name",
            PartyField::Address => "address",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemField {
    Name,
    Description,
    Quantity,
    Unit,
    UnitPrice,
    LineTotal,
    TaxRate,
    TaxAmount,
    TaxCategory,
    Category,
    ProductCode,
    Note,
    Attribute(String),
}

impl ItemField {
    fn parse(name: &str) -> Option<ItemField> {
        if let Some(key) = name.strip_prefix("attributes.") {
            if key.is_empty() {
                return None;
            }
            return Some(ItemField::Attribute(key.to_string()));
        }
        Some(match name {
            "name" => ItemField::Name,
            "description" => ItemField::Description,
            "quantity" => ItemField::Quantity,
            "unit" => ItemField::Unit,
            "unit_price" => ItemField::UnitPrice,
            "line_total" => ItemField::LineTotal,
            "tax_rate" => ItemField::TaxRate,
            "tax_amount" => ItemField::TaxAmount,
            "tax_category" => ItemField::TaxCategory,
            "category" => ItemField::Category,
            "product_code" => ItemField::ProductCode,
            "note" => ItemField::Note,
            _ => return None,
        })
    }

    pub fn name(&self) -> String {
        match self {
            ItemField::Name => "name".to_string(),
            ItemField::Description => "description".to_string(),
            ItemField::Quantity => "quantity".to_string(),
            ItemField::Unit => "unit".to_string(),
            ItemField::UnitPrice => "unit_price".to_string(),
            ItemField::LineTotal => "line_total".to_string(),
            ItemField::TaxRate => "tax_rate".to_string(),
            ItemField::TaxAmount => "tax_amount".to_string(),
            ItemField::TaxCategory => "tax_category".to_string(),
            ItemField::Category => "category".to_string(),
            ItemField::ProductCode => "product_code".to_string(),
            ItemField::Note => "note".to_string(),
            ItemField::Attribute(key) => format!("attributes.{key}"),
        }
    }
}

/// A parsed, validated completion target.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetPath {
    Header(HeaderField),
    Party(PartyKind, PartyField),
    Extension(String),
    ItemBroadcast(ItemField),
}

impl TargetPath {
    pub fn parse(raw: &str) -> Result<TargetPath, PathError> {
        let trimmed = raw.trim();
        // Rules written against the context vocabulary often carry the
        // `invoice.` prefix; the target is the same field either way.
        let path = trimmed.strip_prefix("invoice.").unwrap_or(trimmed);

        if let Some(rest) = path.strip_prefix("items[].") {
            return ItemField::parse(rest)
                .map(TargetPath::ItemBroadcast)
                .ok_or_else(|| PathError::UnknownPath(raw.to_string()));
        }
        if let Some(rest) = path.strip_prefix("supplier.") {
            return PartyField::parse(rest)
                .map(|f| TargetPath::Party(PartyKind::Supplier, f))
                .ok_or_else(|| PathError::UnknownPath(raw.to_string()));
        }
        if let Some(rest) = path.strip_prefix("customer.") {
            return PartyField::parse(rest)
                .map(|f| TargetPath::Party(PartyKind::Customer, f))
                .ok_or_else(|| PathError::UnknownPath(raw.to_string()));
        }
        if let Some(key) = path.strip_prefix("extensions.") {
            if key.is_empty() {
                return Err(PathError::UnknownPath(raw.to_string()));
            }
            return Ok(TargetPath::Extension(key.to_string()));
        }
        if !path.contains('.') {
            if let Some(field) = HeaderField::parse(path) {
                return Ok(TargetPath::Header(field));
            }
        }
        Err(PathError::UnknownPath(raw.to_string()))
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, TargetPath::ItemBroadcast(_))
    }

    /// Canonical display form for log entries.
    pub fn describe(&self) -> String {
        match self {
            TargetPath::Header(f) => f.name().to_string(),
            TargetPath::Party(kind, f) => format!("{}.{}", kind.as_str(), f.name()),
            TargetPath::Extension(key) => format!("extensions.{key}"),
            TargetPath::ItemBroadcast(f) => format!("items[].{}", f.name()),
        }
    }
}

/// Resolved path for one item of a broadcast write.
pub fn item_path(index: usize, field: &ItemField) -> String {
    format!("items[{index}].{}", field.name())
}

// ===== WRITES =====

/// Write a computed value to a non-broadcast target.
pub fn write(invoice: &mut Invoice, path: &TargetPath, value: &Value) -> Result<(), PathError> {
    match path {
        TargetPath::Header(field) => write_header(invoice, *field, value),
        TargetPath::Party(kind, field) => {
            let party = match kind {
                PartyKind::Supplier => invoice.supplier_mut(),
                PartyKind::Customer => invoice.customer_mut(),
            };
            write_party(party, *kind, *field, value)
        }
        TargetPath::Extension(key) => {
            invoice.extensions.insert(key.clone(), to_ext_value(value));
            Ok(())
        }
        TargetPath::ItemBroadcast(_) => Err(PathError::incompatible(
            path.describe(),
            "broadcast target in scalar write",
        )),
    }
}

fn write_header(invoice: &mut Invoice, field: HeaderField, value: &Value) -> Result<(), PathError> {
    let path = field.name();
    match field {
        HeaderField::InvoiceNumber => invoice.invoice_number = coerce_string(value, path)?,
        HeaderField::IssueDate => invoice.issue_date = Some(coerce_date(value, path)?),
        HeaderField::DueDate => invoice.due_date = Some(coerce_date(value, path)?),
        HeaderField::InvoiceType => invoice.invoice_type = Some(coerce_string(value, path)?),
        HeaderField::Country => invoice.country = Some(coerce_string(value, path)?),
        HeaderField::Currency => invoice.currency = Some(coerce_string(value, path)?),
        HeaderField::Status => invoice.status = Some(coerce_string(value, path)?),
        HeaderField::ReferenceNumber => {
            invoice.reference_number = Some(coerce_string(value, path)?)
        }
        HeaderField::PaymentTerms => invoice.payment_terms = Some(coerce_string(value, path)?),
        HeaderField::Notes => invoice.notes = Some(coerce_string(value, path)?),
        HeaderField::TotalAmount => invoice.total_amount = Some(coerce_number(value, path)?),
        HeaderField::TaxAmount => invoice.tax_amount = Some(coerce_number(value, path)?),
        HeaderField::NetAmount => invoice.net_amount = Some(coerce_number(value, path)?),
        HeaderField::TaxRate => invoice.tax_rate = Some(coerce_number(value, path)?),
    }
    Ok(())
}

fn write_party(
    party: &mut Party,
    kind: PartyKind,
    field: PartyField,
    value: &Value,
) -> Result<(), PathError> {
    let path = format!("{}.{}", kind.as_str(), field.name());
    match field {
        PartyField::Name => party.name = Some(coerce_string(value, &path)?),
        PartyField::TaxNo => party.tax_no = Some(coerce_string(value, &path)?),
        PartyField::Email => party.email = Some(coerce_string(value, &path)?),
        PartyField::Phone => party.phone = Some(coerce_string(value, &path)?),
        PartyField::BankAccount => party.bank_account = Some(coerce_string(value, &path)?),
        PartyField::BankName => party.bank_name = Some(coerce_string(value, &path)?),
        PartyField::Address => {
            // A computed address arrives as one line; it becomes the street
            // of the structured address, preserving any other fields.
            let street = coerce_string(value, &path)?;
            party
                .address
                .get_or_insert_with(Address::default)
                .street = Some(street);
        }
    }
    Ok(())
}

/// Write a computed value to one line item of a broadcast target.
pub fn write_item(item: &mut LineItem, field: &ItemField, value: &Value) -> Result<(), PathError> {
    let path = format!("items[].{}", field.name());
    match field {
        ItemField::Name => item.name = Some(coerce_string(value, &path)?),
        ItemField::Description => item.description = coerce_string(value, &path)?,
        ItemField::Quantity => item.quantity = coerce_number(value, &path)?,
        ItemField::Unit => item.unit = coerce_string(value, &path)?,
        ItemField::UnitPrice => item.unit_price = coerce_number(value, &path)?,
        ItemField::LineTotal => item.line_total = Some(coerce_number(value, &path)?),
        ItemField::TaxRate => item.tax_rate = Some(coerce_number(value, &path)?),
        ItemField::TaxAmount => item.tax_amount = Some(coerce_number(value, &path)?),
        ItemField::TaxCategory => item.tax_category = Some(coerce_string(value, &path)?),
        ItemField::Category => item.category = Some(coerce_string(value, &path)?),
        ItemField::ProductCode => item.product_code = Some(coerce_string(value, &path)?),
        ItemField::Note => item.note = Some(coerce_string(value, &path)?),
        ItemField::Attribute(key) => {
            item.attributes.insert(key.clone(), to_ext_value(value));
        }
    }
    Ok(())
}

// ===== EMPTINESS (for write_mode: if_empty) =====

pub fn is_empty(invoice: &Invoice, path: &TargetPath) -> bool {
    match path {
        TargetPath::Header(field) => header_is_empty(invoice, *field),
        TargetPath::Party(kind, field) => {
            let party = match kind {
                PartyKind::Supplier => invoice.supplier.as_ref(),
                PartyKind::Customer => invoice.customer.as_ref(),
            };
            party.map_or(true, |p| party_field_is_empty(p, *field))
        }
        TargetPath::Extension(key) => invoice.extensions.get(key).map_or(true, ExtValue::is_empty),
        TargetPath::ItemBroadcast(_) => false,
    }
}

fn header_is_empty(invoice: &Invoice, field: HeaderField) -> bool {
    match field {
        HeaderField::InvoiceNumber => invoice.invoice_number.is_empty(),
        HeaderField::IssueDate => invoice.issue_date.is_none(),
        HeaderField::DueDate => invoice.due_date.is_none(),
        HeaderField::InvoiceType => str_empty(&invoice.invoice_type),
        HeaderField::Country => str_empty(&invoice.country),
        HeaderField::Currency => str_empty(&invoice.currency),
        HeaderField::Status => str_empty(&invoice.status),
        HeaderField::ReferenceNumber => str_empty(&invoice.reference_number),
        HeaderField::PaymentTerms => str_empty(&invoice.payment_terms),
        HeaderField::Notes => str_empty(&invoice.notes),
        HeaderField::TotalAmount => invoice.total_amount.is_none(),
        HeaderField::TaxAmount => invoice.tax_amount.is_none(),
        HeaderField::NetAmount => invoice.net_amount.is_none(),
        HeaderField::TaxRate => invoice.tax_rate.is_none(),
    }
}

fn party_field_is_empty(party: &Party, field: PartyField) -> bool {
    match field {
        PartyField::Name => str_empty(&party.name),
        PartyField::TaxNo => str_empty(&party.tax_no),
        PartyField::Email => str_empty(&party.email),
        PartyField::Phone => str_empty(&party.phone),
        PartyField::BankAccount => str_empty(&party.bank_account),
        PartyField::BankName => str_empty(&party.bank_name),
        PartyField::Address => party.address.is_none(),
    }
}

pub fn item_field_is_empty(item: &LineItem, field: &ItemField) -> bool {
    match field {
        ItemField::Name => str_empty(&item.name),
        ItemField::Description => item.description.is_empty(),
        ItemField::Quantity => item.quantity == 0.0,
        ItemField::Unit => item.unit.is_empty(),
        ItemField::UnitPrice => item.unit_price == 0.0,
        ItemField::LineTotal => item.line_total.is_none(),
        ItemField::TaxRate => item.tax_rate.is_none(),
        ItemField::TaxAmount => item.tax_amount.is_none(),
        ItemField::TaxCategory => str_empty(&item.tax_category),
        ItemField::Category => str_empty(&item.category),
        ItemField::ProductCode => str_empty(&item.product_code),
        ItemField::Note => str_empty(&item.note),
        ItemField::Attribute(key) => item.attributes.get(key).map_or(true, ExtValue::is_empty),
    }
}

fn str_empty(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

// ===== COERCION =====

/// Numeric fields accept numbers and numeric strings.
fn coerce_number(value: &Value, path: &str) -> Result<f64, PathError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| PathError::incompatible(path, "non-finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| PathError::incompatible(path, format!("non-numeric string `{s}`"))),
        other => Err(PathError::incompatible(path, type_name(other))),
    }
}

/// String fields accept any scalar; composites are stored as their JSON
/// text rather than rejected — the extensions bag promises to be writable
/// with whatever a rule computes.
fn coerce_string(value: &Value, path: &str) -> Result<String, PathError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string())),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(PathError::incompatible(path, "null")),
        other => Ok(other.to_string()),
    }
}

fn coerce_date(value: &Value, path: &str) -> Result<NaiveDate, PathError> {
    let text = match value {
        Value::String(s) => s.trim(),
        other => return Err(PathError::incompatible(path, type_name(other))),
    };
    text.parse::<NaiveDate>()
        .map_err(|_| PathError::incompatible(path, format!("non-date string `{text}`")))
}

/// Scalars keep their type in the tagged bag; composites become JSON text.
fn to_ext_value(value: &Value) -> ExtValue {
    ExtValue::from_scalar(value).unwrap_or_else(|| ExtValue::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_path_shape() {
        assert_eq!(
            TargetPath::parse("total_amount").unwrap(),
            TargetPath::Header(HeaderField::TotalAmount)
        );
        assert_eq!(
            TargetPath::parse("supplier.tax_no").unwrap(),
            TargetPath::Party(PartyKind::Supplier, PartyField::TaxNo)
        );
        assert_eq!(
            TargetPath::parse("customer.email").unwrap(),
            TargetPath::Party(PartyKind::Customer, PartyField::Email)
        );
        assert_eq!(
            TargetPath::parse("extensions.supplier_category").unwrap(),
            TargetPath::Extension("supplier_category".to_string())
        );
        assert_eq!(
            TargetPath::parse("items[].tax_rate").unwrap(),
            TargetPath::ItemBroadcast(ItemField::TaxRate)
        );
        assert_eq!(
            TargetPath::parse("items[].attributes.color").unwrap(),
            TargetPath::ItemBroadcast(ItemField::Attribute("color".to_string()))
        );
    }

    #[test]
    fn invoice_prefix_is_stripped() {
        assert_eq!(
            TargetPath::parse("invoice.supplier.tax_no").unwrap(),
            TargetPath::Party(PartyKind::Supplier, PartyField::TaxNo)
        );
        assert_eq!(
            TargetPath::parse("invoice.total_amount").unwrap(),
            TargetPath::Header(HeaderField::TotalAmount)
        );
    }

    #[test]
    fn tax_id_alias() {
        assert_eq!(
            TargetPath::parse("supplier.tax_id").unwrap(),
            TargetPath::Party(PartyKind::Supplier, PartyField::TaxNo)
        );
    }

    #[test]
    fn unknown_paths_are_rejected() {
        assert!(TargetPath::parse("bogus_field").is_err());
        assert!(TargetPath::parse("supplier.shoe_size").is_err());
        assert!(TargetPath::parse("items[].bogus").is_err());
        assert!(TargetPath::parse("extensions.").is_err());
        assert!(TargetPath::parse("deeply.nested.unknown").is_err());
    }

    #[test]
    fn writes_numeric_string_into_numeric_field() {
        let mut invoice = Invoice::default();
        let path = TargetPath::parse("total_amount").unwrap();
        write(&mut invoice, &path, &json!("1234.5")).unwrap();
        assert_eq!(invoice.total_amount, Some(1234.5));
        write(&mut invoice, &path, &json!(12)).unwrap();
        assert_eq!(invoice.total_amount, Some(12.0));
    }

    #[test]
    fn rejects_non_numeric_value_for_numeric_field() {
        let mut invoice = Invoice::default();
        let path = TargetPath::parse("total_amount").unwrap();
        let err = write(&mut invoice, &path, &json!("not a number")).unwrap_err();
        assert!(matches!(err, PathError::Incompatible { .. }));
        assert_eq!(invoice.total_amount, None, "failed write must not mutate");
    }

    #[test]
    fn number_written_to_string_field_is_stringified() {
        let mut invoice = Invoice::default();
        let path = TargetPath::parse("status").unwrap();
        write(&mut invoice, &path, &json!(42)).unwrap();
        assert_eq!(invoice.status.as_deref(), Some("42"));
    }

    #[test]
    fn party_is_created_on_first_write() {
        let mut invoice = Invoice::default();
        assert!(invoice.supplier.is_none());
        let path = TargetPath::parse("supplier.tax_no").unwrap();
        write(&mut invoice, &path, &json!("91000000000000000X")).unwrap();
        assert_eq!(
            invoice.supplier.as_ref().unwrap().tax_no.as_deref(),
            Some("91000000000000000X")
        );
    }

    #[test]
    fn address_write_fills_street() {
        let mut invoice = Invoice::default();
        let path = TargetPath::parse("supplier.address").unwrap();
        write(&mut invoice, &path, &json!("1 Main St")).unwrap();
        let address = invoice.supplier.unwrap().address.unwrap();
        assert_eq!(address.street.as_deref(), Some("1 Main St"));
    }

    #[test]
    fn extension_writes_keep_scalar_types() {
        let mut invoice = Invoice::default();
        write(
            &mut invoice,
            &TargetPath::parse("extensions.count").unwrap(),
            &json!(3.0),
        )
        .unwrap();
        write(
            &mut invoice,
            &TargetPath::parse("extensions.flag").unwrap(),
            &json!(true),
        )
        .unwrap();
        write(
            &mut invoice,
            &TargetPath::parse("extensions.info").unwrap(),
            &json!({"a": 1}),
        )
        .unwrap();
        assert_eq!(invoice.extensions["count"], ExtValue::Number(3.0));
        assert_eq!(invoice.extensions["flag"], ExtValue::Bool(true));
        assert_eq!(
            invoice.extensions["info"],
            ExtValue::String("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn date_write_parses_iso_strings() {
        let mut invoice = Invoice::default();
        let path = TargetPath::parse("due_date").unwrap();
        write(&mut invoice, &path, &json!("2024-04-30")).unwrap();
        assert_eq!(invoice.due_date, NaiveDate::from_ymd_opt(2024, 4, 30));
        assert!(write(&mut invoice, &path, &json!("soon")).is_err());
    }

    #[test]
    fn item_writes_and_resolved_paths() {
        let mut item = LineItem {
            description: "hotel".to_string(),
            quantity: 1.0,
            unit_price: 100.0,
            ..LineItem::default()
        };
        write_item(&mut item, &ItemField::TaxRate, &json!(0.13)).unwrap();
        assert_eq!(item.tax_rate, Some(0.13));
        assert_eq!(item_path(2, &ItemField::TaxRate), "items[2].tax_rate");
    }

    #[test]
    fn emptiness_checks() {
        let mut invoice = Invoice::default();
        let total = TargetPath::parse("total_amount").unwrap();
        let tax_no = TargetPath::parse("supplier.tax_no").unwrap();
        assert!(is_empty(&invoice, &total));
        assert!(is_empty(&invoice, &tax_no));
        invoice.total_amount = Some(10.0);
        invoice.supplier_mut().tax_no = Some(String::new());
        assert!(!is_empty(&invoice, &total));
        assert!(is_empty(&invoice, &tax_no), "empty string counts as empty");
    }
}
