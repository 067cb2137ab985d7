use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use invoiceflow_core::{Invoice, InvoiceProcessor, ProcessOutcome, RuleStore, ValidationReport};

#[derive(Parser)]
#[command(name = "invoiceflow")]
#[command(about = "Apply declarative completion and validation rules to invoices")]
struct Args {
    /// Path to the invoice JSON file to process
    #[arg(short, long)]
    invoice: String,

    /// Path to the rule configuration (YAML)
    #[arg(short, long, default_value = "config/rules.yaml")]
    rules: String,

    /// Output file path (if not specified, auto-generated next to the input)
    #[arg(short, long)]
    output: Option<String>,

    /// Optional company context JSON, exposed to rules as `company`
    #[arg(long)]
    company: Option<String>,

    /// Skip field completion (validate the document as-is)
    #[arg(long)]
    skip_completion: bool,

    /// Skip business validation
    #[arg(long)]
    skip_validation: bool,

    /// Print every execution log entry after processing
    #[arg(long)]
    show_log: bool,

    /// List the loaded rules and exit
    #[arg(long)]
    show_rules: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("🧾 Invoiceflow Rule Engine");

    let store = RuleStore::load_from_file(&args.rules)?;
    println!(
        "📋 Loaded rules from {}: {} completion, {} validation",
        args.rules,
        store.completion_rules().len(),
        store.validation_rules().len()
    );

    if args.show_rules {
        show_rules(&store);
        return Ok(());
    }

    if !Path::new(&args.invoice).exists() {
        println!("⚠️  Invoice file not found at: {}", args.invoice);
        println!("   Please check the file path.");
        return Ok(());
    }

    let invoice = load_invoice(&args.invoice)?;
    println!(
        "📄 Processing invoice {} ({} items)",
        invoice.invoice_number,
        invoice.items.len()
    );

    let mut processor = InvoiceProcessor::new(store);
    if let Some(company_path) = &args.company {
        let company = load_json(company_path)
            .with_context(|| format!("failed to read company context {company_path}"))?;
        processor = processor.with_company_context(company);
        println!("🏢 Company context loaded from {company_path}");
    }

    let outcome = run(&processor, &invoice, &args);

    if args.show_log {
        println!("\n📜 Execution log:");
        for entry in &outcome.completion_log {
            println!("   [{:?}] {}", entry.status, entry.message);
        }
    }

    print_validation(&outcome.validation);

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.invoice));
    let json = serde_json::to_string_pretty(&outcome)?;
    std::fs::write(&output_path, json)
        .with_context(|| format!("failed to write {output_path}"))?;
    println!("💾 Result written to {output_path}");

    Ok(())
}

fn run(processor: &InvoiceProcessor, invoice: &Invoice, args: &Args) -> ProcessOutcome {
    if args.skip_completion && args.skip_validation {
        println!("⚡ Both stages skipped - passing the document through");
        return ProcessOutcome {
            invoice: invoice.clone(),
            completion_log: Vec::new(),
            validation: empty_validation(),
        };
    }
    if args.skip_completion {
        let validation = processor.validate(invoice);
        return ProcessOutcome {
            invoice: invoice.clone(),
            completion_log: Vec::new(),
            validation,
        };
    }
    if args.skip_validation {
        let completion = processor.complete(invoice);
        return ProcessOutcome {
            invoice: completion.invoice,
            completion_log: completion.log,
            validation: empty_validation(),
        };
    }
    processor.process(invoice)
}

fn empty_validation() -> ValidationReport {
    ValidationReport {
        valid: true,
        errors: Vec::new(),
        warnings: Vec::new(),
        summary: "validation skipped".to_string(),
    }
}

fn load_invoice(path: &str) -> Result<Invoice> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read invoice {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("invalid invoice JSON in {path}"))
}

fn load_json(path: &str) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn show_rules(store: &RuleStore) {
    println!("\n🔧 Completion rules (execution order):");
    for rule in store.completion_rules() {
        println!(
            "   [{:>4}] {} → {}  ({})",
            rule.priority, rule.id, rule.target_field, rule.rule_name
        );
    }
    println!("\n🔍 Validation rules (execution order):");
    for rule in store.validation_rules() {
        println!(
            "   [{:>4}] {}  ({})",
            rule.priority, rule.id, rule.rule_name
        );
    }
    if !store.lookup_tables().is_empty() {
        println!("\n🗄️  Lookup tables:");
        for table in store.lookup_tables() {
            println!("   {} ({} rows)", table.table, table.rows.len());
        }
    }
}

fn print_validation(report: &ValidationReport) {
    if report.valid {
        println!("✅ {}", report.summary);
    } else {
        println!("❌ {}", report.summary);
        for error in &report.errors {
            println!("   - {} ({})", error.message, error.rule_id);
        }
    }
    for warning in &report.warnings {
        println!("   ⚠️  {} ({})", warning.message, warning.rule_id);
    }
}

fn default_output_path(input: &str) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");
    match path.parent().and_then(|p| p.to_str()) {
        Some(dir) if !dir.is_empty() => format!("{dir}/{stem}_processed.json"),
        _ => format!("{stem}_processed.json"),
    }
}
