//! Engine behavior tests — the contracts rule authors rely on.
//!
//! Each module pins one observable property of the completion/validation
//! pipeline: ordering, broadcast fan-out, purity, failure isolation, and
//! the lookup/coercion guarantees. Unit-level concerns (lexing, parsing,
//! path dispatch) live in #[cfg(test)] modules next to their code; this
//! suite drives whole rule sets through the public API.

use invoiceflow_core::{
    CompletionRule, Invoice, InvoiceProcessor, LineItem, Party, RuleStatus, RuleStore,
    ValidationRule, WriteMode,
};

// ============================================================================
// Helpers
// ============================================================================

fn completion_rule(
    id: &str,
    apply_to: &str,
    target_field: &str,
    rule_expression: &str,
    priority: i32,
) -> CompletionRule {
    CompletionRule {
        id: id.to_string(),
        rule_name: format!("rule {id}"),
        apply_to: apply_to.to_string(),
        target_field: target_field.to_string(),
        rule_expression: rule_expression.to_string(),
        priority,
        active: true,
        write_mode: WriteMode::Override,
    }
}

fn validation_rule(
    id: &str,
    apply_to: &str,
    rule_expression: &str,
    error_message: &str,
    priority: i32,
) -> ValidationRule {
    ValidationRule {
        id: id.to_string(),
        rule_name: format!("rule {id}"),
        apply_to: apply_to.to_string(),
        field_path: String::new(),
        rule_expression: rule_expression.to_string(),
        error_message: error_message.to_string(),
        priority,
        active: true,
    }
}

fn processor(completion: Vec<CompletionRule>, validation: Vec<ValidationRule>) -> InvoiceProcessor {
    InvoiceProcessor::new(RuleStore::from_rules(completion, validation))
}

fn cn_invoice() -> Invoice {
    Invoice {
        invoice_number: "INV-2024-001".to_string(),
        country: Some("CN".to_string()),
        total_amount: Some(860.0),
        supplier: Some(Party {
            name: Some("Acme Travel".to_string()),
            ..Party::default()
        }),
        items: vec![
            LineItem {
                description: "hotel room".to_string(),
                quantity: 2.0,
                unit_price: 400.0,
                category: Some("food".to_string()),
                ..LineItem::default()
            },
            LineItem {
                description: "conference pass".to_string(),
                quantity: 1.0,
                unit_price: 30.0,
                category: Some("services".to_string()),
                ..LineItem::default()
            },
            LineItem {
                description: "team dinner".to_string(),
                quantity: 1.0,
                unit_price: 30.0,
                category: Some("food".to_string()),
                ..LineItem::default()
            },
        ],
        ..Invoice::default()
    }
}

fn entries_for<'a>(
    report: &'a invoiceflow_core::CompletionReport,
    rule_id: &str,
) -> Vec<&'a invoiceflow_core::ExecutionLogEntry> {
    report.log.iter().filter(|e| e.rule_id == rule_id).collect()
}

// ============================================================================
// Priority ordering
// ============================================================================

mod priority_ordering {
    use super::*;

    #[test]
    fn higher_priority_runs_first_and_later_rules_see_its_writes() {
        // A (100) marks the invoice; C (75) reads that mark in its
        // condition; B (50) overwrites the mark afterwards.
        let processor = processor(
            vec![
                completion_rule("b", "", "status", "'FINAL'", 50),
                completion_rule("a", "", "status", "'REVIEWED'", 100),
                completion_rule(
                    "c",
                    "invoice.status == 'REVIEWED'",
                    "notes",
                    "'seen by reviewer'",
                    75,
                ),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());

        let order: Vec<_> = report.log.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"], "descending priority order");

        // C ran between A and B, so it observed A's value.
        assert_eq!(entries_for(&report, "c")[0].status, RuleStatus::Success);
        assert_eq!(report.invoice.notes.as_deref(), Some("seen by reviewer"));
        // B still ran last and overwrote the mark.
        assert_eq!(report.invoice.status.as_deref(), Some("FINAL"));
    }

    #[test]
    fn ties_preserve_configuration_order() {
        let processor = processor(
            vec![
                completion_rule("first", "", "status", "'ONE'", 50),
                completion_rule("second", "", "status", "'TWO'", 50),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        let order: Vec<_> = report.log.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
        assert_eq!(report.invoice.status.as_deref(), Some("TWO"));
    }

    #[test]
    fn context_is_rebuilt_after_each_write() {
        // The second rule's expression (not just its condition) depends on
        // the first rule's output.
        let processor = processor(
            vec![
                completion_rule("seed", "", "extensions.region", "'south'", 100),
                completion_rule(
                    "derive",
                    "",
                    "reference_number",
                    "'REF-' + invoice.extensions.region",
                    90,
                ),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        assert_eq!(report.invoice.reference_number.as_deref(), Some("REF-south"));
    }
}

// ============================================================================
// Broadcast rules
// ============================================================================

mod broadcast {
    use super::*;

    #[test]
    fn writes_only_matching_items_and_logs_skips_with_indices() {
        let processor = processor(
            vec![completion_rule(
                "food-tax",
                "item.category == 'food'",
                "items[].tax_rate",
                "0.09",
                50,
            )],
            vec![],
        );
        let report = processor.complete(&cn_invoice());

        assert_eq!(report.invoice.items[0].tax_rate, Some(0.09));
        assert_eq!(report.invoice.items[1].tax_rate, None);
        assert_eq!(report.invoice.items[2].tax_rate, Some(0.09));

        let entries = entries_for(&report, "food-tax");
        assert_eq!(entries.len(), 3, "one entry per item");
        assert_eq!(entries[0].status, RuleStatus::Success);
        assert_eq!(entries[0].item_index, Some(0));
        assert_eq!(entries[0].field_path.as_deref(), Some("items[0].tax_rate"));
        assert_eq!(entries[1].status, RuleStatus::Skipped);
        assert_eq!(entries[1].item_index, Some(1));
        assert_eq!(entries[2].status, RuleStatus::Success);
        assert_eq!(entries[2].item_index, Some(2));
    }

    #[test]
    fn item_expressions_can_use_item_fields_and_classifier() {
        let processor = processor(
            vec![
                completion_rule(
                    "line-totals",
                    "",
                    "items[].line_total",
                    "item.quantity * item.unit_price",
                    90,
                ),
                completion_rule(
                    "names",
                    "",
                    "items[].name",
                    "get_standard_name(item.description)",
                    80,
                ),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        assert_eq!(report.invoice.items[0].line_total, Some(800.0));
        assert_eq!(report.invoice.items[1].line_total, Some(30.0));
        assert_eq!(report.invoice.items[0].name.as_deref(), Some("Accommodation"));
    }

    #[test]
    fn no_items_means_no_entries() {
        let processor = processor(
            vec![completion_rule("r", "", "items[].tax_rate", "0.09", 50)],
            vec![],
        );
        let mut invoice = cn_invoice();
        invoice.items.clear();
        let report = processor.complete(&invoice);
        assert!(report.log.is_empty());
    }
}

// ============================================================================
// Purity & isolation
// ============================================================================

mod purity {
    use super::*;

    #[test]
    fn completion_never_mutates_the_input() {
        let processor = processor(
            vec![completion_rule("r", "", "supplier.tax_no", "'91X'", 50)],
            vec![],
        );
        let original = cn_invoice();
        let before = original.clone();
        let report = processor.complete(&original);
        assert_eq!(original, before, "input invoice must stay untouched");
        assert_eq!(
            report.invoice.supplier.as_ref().unwrap().tax_no.as_deref(),
            Some("91X")
        );
    }

    #[test]
    fn validation_never_mutates_the_document() {
        let processor = processor(
            vec![],
            vec![
                validation_rule("v1", "", "invoice.total_amount > 0", "total must be positive", 50),
                validation_rule("v2", "", "has(invoice.supplier.tax_no)", "supplier tax no missing", 40),
            ],
        );
        let invoice = cn_invoice();
        let before = invoice.clone();
        let report = processor.validate(&invoice);
        assert_eq!(invoice, before, "validation must be pure");
        assert!(!report.valid, "missing tax number should fail");
    }

    #[test]
    fn failing_rule_does_not_stop_the_run() {
        let processor = processor(
            vec![
                // Runtime error: string minus number.
                completion_rule("boom", "", "notes", "invoice.country - 5", 100),
                completion_rule("after", "", "status", "'OK'", 50),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());

        let boom = entries_for(&report, "boom");
        assert_eq!(boom.len(), 1);
        assert_eq!(boom[0].status, RuleStatus::Error);
        assert!(boom[0].error.is_some());

        let after = entries_for(&report, "after");
        assert_eq!(after[0].status, RuleStatus::Success);
        assert_eq!(report.invoice.status.as_deref(), Some("OK"));
    }

    #[test]
    fn unresolvable_target_is_failed_not_fatal() {
        let processor = processor(
            vec![
                completion_rule("bad-path", "", "supplier.shoe_size", "'44'", 100),
                completion_rule("after", "", "status", "'OK'", 50),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        assert_eq!(entries_for(&report, "bad-path")[0].status, RuleStatus::Failed);
        assert_eq!(report.invoice.status.as_deref(), Some("OK"));
    }

    #[test]
    fn compile_error_is_isolated_too() {
        let processor = processor(
            vec![
                completion_rule("syntax", "", "notes", "1 +* 2", 100),
                completion_rule("after", "", "status", "'OK'", 50),
            ],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        assert_eq!(entries_for(&report, "syntax")[0].status, RuleStatus::Error);
        assert_eq!(report.invoice.status.as_deref(), Some("OK"));
    }
}

// ============================================================================
// Lookup macro
// ============================================================================

mod lookup_macro {
    use super::*;

    fn store_with_companies(
        completion: Vec<CompletionRule>,
        validation: Vec<ValidationRule>,
    ) -> RuleStore {
        let yaml = r#"
lookup_tables:
  - table: companies
    rows:
      - name: Acme Travel
        tax_number: 91440101234567890A
        category: TRAVEL_SERVICE
    defaults:
      tax_number: ""
      category: GENERAL
"#;
        let tables = RuleStore::from_yaml_str(yaml).unwrap().lookup_tables().to_vec();
        RuleStore::from_rules(completion, validation).with_lookup_tables(tables)
    }

    #[test]
    fn known_supplier_resolves_through_the_macro() {
        let store = store_with_companies(
            vec![completion_rule(
                "tax-no",
                "!has(invoice.supplier.tax_no)",
                "supplier.tax_no",
                "db.companies.tax_number[name=invoice.supplier.name]",
                50,
            )],
            vec![],
        );
        let report = InvoiceProcessor::new(store).complete(&cn_invoice());
        assert_eq!(
            report.invoice.supplier.as_ref().unwrap().tax_no.as_deref(),
            Some("91440101234567890A")
        );
    }

    #[test]
    fn unknown_supplier_falls_back_to_declared_default_without_error() {
        let store = store_with_companies(
            vec![],
            vec![validation_rule(
                "check",
                "",
                "db.companies.tax_number[name=invoice.supplier.name] != ''",
                "supplier is not registered",
                50,
            )],
        );
        let mut invoice = cn_invoice();
        invoice.supplier = Some(Party {
            name: Some("Unknown Corp".to_string()),
            ..Party::default()
        });
        let report = InvoiceProcessor::new(store).validate(&invoice);
        // The lookup missed, the expression still evaluated: a clean error,
        // not a warning.
        assert!(!report.valid);
        assert!(report.warnings.is_empty(), "no evaluation failure expected");
        assert_eq!(report.errors[0].message, "supplier is not registered");
    }

    #[test]
    fn two_macros_in_one_expression() {
        let store = store_with_companies(
            vec![completion_rule(
                "combo",
                "",
                "extensions.company_tag",
                "db.companies.category[name=invoice.supplier.name] + '/' + db.companies.tax_number[name=invoice.supplier.name]",
                50,
            )],
            vec![],
        );
        let report = InvoiceProcessor::new(store).complete(&cn_invoice());
        assert_eq!(
            report.invoice.extensions["company_tag"],
            invoiceflow_core::ExtValue::String("TRAVEL_SERVICE/91440101234567890A".to_string())
        );
    }
}

// ============================================================================
// Coercion & write modes
// ============================================================================

mod coercion {
    use super::*;

    #[test]
    fn integer_literal_and_threshold_comparison_agree() {
        // A rule assigns integer-looking 12; a later validation compares
        // against 5000. No type mismatch either way.
        let processor = processor(
            vec![completion_rule("set", "", "total_amount", "12", 50)],
            vec![validation_rule(
                "big",
                "",
                "invoice.total_amount > 5000",
                "amount too small",
                50,
            )],
        );
        let outcome = processor.process(&cn_invoice());
        assert_eq!(outcome.invoice.total_amount, Some(12.0));
        assert!(!outcome.validation.valid);
        assert!(outcome.validation.warnings.is_empty(), "comparison must not error");
    }

    #[test]
    fn numeric_string_results_become_numbers() {
        let processor = processor(
            vec![completion_rule("set", "", "tax_amount", "'123.45'", 50)],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        assert_eq!(report.invoice.tax_amount, Some(123.45));
    }

    #[test]
    fn if_empty_mode_preserves_existing_values() {
        let mut fill = completion_rule("fill", "", "currency", "'CNY'", 50);
        fill.write_mode = WriteMode::IfEmpty;

        let mut invoice = cn_invoice();
        invoice.currency = Some("USD".to_string());
        let report = processor(vec![fill.clone()], vec![]).complete(&invoice);
        assert_eq!(report.invoice.currency.as_deref(), Some("USD"));
        assert_eq!(report.log[0].status, RuleStatus::Skipped);

        invoice.currency = None;
        let report = processor(vec![fill], vec![]).complete(&invoice);
        assert_eq!(report.invoice.currency.as_deref(), Some("CNY"));
        assert_eq!(report.log[0].status, RuleStatus::Success);
    }

    #[test]
    fn null_result_is_a_failed_outcome() {
        let processor = processor(
            vec![completion_rule("null-result", "", "notes", "invoice.payment_terms", 50)],
            vec![],
        );
        let report = processor.complete(&cn_invoice());
        assert_eq!(report.log[0].status, RuleStatus::Failed);
        assert!(report.invoice.notes.is_none());
    }
}

// ============================================================================
// End-to-end
// ============================================================================

mod end_to_end {
    use super::*;

    #[test]
    fn cn_supplier_tax_number_completion() {
        // Spec example: country CN, supplier tax number missing, one rule
        // fills it. Exactly one SUCCESS entry for that rule id.
        let processor = processor(
            vec![completion_rule(
                "cn-tax-no",
                "country == 'CN'",
                "supplier.tax_no",
                "'91000000000000000X'",
                50,
            )],
            vec![],
        );
        let report = processor.complete(&cn_invoice());

        assert_eq!(
            report.invoice.supplier.as_ref().unwrap().tax_no.as_deref(),
            Some("91000000000000000X")
        );
        let entries = entries_for(&report, "cn-tax-no");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, RuleStatus::Success);
        assert_eq!(entries[0].field_path.as_deref(), Some("supplier.tax_no"));
    }

    #[test]
    fn condition_not_met_is_skipped() {
        let processor = processor(
            vec![completion_rule(
                "cn-tax-no",
                "country == 'CN'",
                "supplier.tax_no",
                "'91000000000000000X'",
                50,
            )],
            vec![],
        );
        let mut invoice = cn_invoice();
        invoice.country = Some("DE".to_string());
        let report = processor.complete(&invoice);
        assert_eq!(report.log[0].status, RuleStatus::Skipped);
        assert!(report.invoice.supplier.as_ref().unwrap().tax_no.is_none());
    }

    #[test]
    fn party_is_created_when_rule_targets_it() {
        let processor = processor(
            vec![completion_rule("cust", "", "customer.name", "'Walk-in Client'", 50)],
            vec![],
        );
        let mut invoice = cn_invoice();
        invoice.customer = None;
        let report = processor.complete(&invoice);
        assert_eq!(
            report.invoice.customer.as_ref().unwrap().name.as_deref(),
            Some("Walk-in Client")
        );
    }

    #[test]
    fn full_process_runs_completion_then_validation() {
        let processor = processor(
            vec![completion_rule(
                "net",
                "has(invoice.total_amount) && has(invoice.tax_amount)",
                "net_amount",
                "invoice.total_amount - invoice.tax_amount",
                50,
            )],
            vec![validation_rule(
                "net-set",
                "",
                "has(invoice.net_amount)",
                "net amount missing",
                50,
            )],
        );
        let mut invoice = cn_invoice();
        invoice.tax_amount = Some(60.0);
        let outcome = processor.process(&invoice);
        assert_eq!(outcome.invoice.net_amount, Some(800.0));
        assert!(outcome.validation.valid, "validation sees the completed copy");
    }

    #[test]
    fn validation_uses_fallback_message_when_none_configured() {
        let processor = processor(
            vec![],
            vec![validation_rule("v", "", "has(invoice.currency)", "", 50)],
        );
        let report = processor.validate(&cn_invoice());
        assert!(!report.valid);
        assert!(report.errors[0].message.contains("rule v"), "generated fallback message");
    }

    #[test]
    fn validation_skips_rules_whose_condition_does_not_apply() {
        let processor = processor(
            vec![],
            vec![validation_rule(
                "eu-vat",
                "invoice.country == 'DE'",
                "has(invoice.extensions.vat_id)",
                "VAT id required in Germany",
                50,
            )],
        );
        let report = processor.validate(&cn_invoice());
        assert!(report.valid, "rule gated on country must not fire for CN");
    }

    #[test]
    fn evaluation_failure_is_a_warning_not_an_error() {
        let processor = processor(
            vec![],
            vec![
                // Ordering against a missing field is a runtime error.
                validation_rule("weird", "", "invoice.net_amount > 0", "net must be positive", 60),
                validation_rule("fine", "", "invoice.total_amount > 0", "total must be positive", 50),
            ],
        );
        let report = processor.validate(&cn_invoice());
        assert!(report.valid, "warnings do not invalidate");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].rule_id, "weird");
        assert!(report.summary.contains("passed"));
    }

    #[test]
    fn non_boolean_validation_result_is_a_warning() {
        let processor = processor(
            vec![],
            vec![validation_rule("oops", "", "invoice.country", "not a check", 50)],
        );
        let report = processor.validate(&cn_invoice());
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("boolean"));
    }
}
