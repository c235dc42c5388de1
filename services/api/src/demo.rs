use crate::infra::{
    build_service, replay_history, seed_library, LibraryService, OutboxNotifier,
};
use chrono::{Duration, Local, NaiveDate};
use circulation::circulation::{
    dispatch_reminders, CatalogImporter, CirculationPolicy, Identifier, LedgerOutcome,
    LoanRecord, NotificationBuckets, RequestContext, StudentNo,
};
use circulation::config::AppConfig;
use circulation::error::AppError;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// First borrow date of the walkthrough (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Print the final notification buckets as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct SweepArgs {
    /// Classification date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Book catalog CSV export (defaults to the bundled sample catalog)
    #[arg(long)]
    pub(crate) books_csv: Option<PathBuf>,
    /// Student directory CSV export (defaults to the bundled sample students)
    #[arg(long)]
    pub(crate) students_csv: Option<PathBuf>,
    /// Circulation history CSV replayed before classifying
    #[arg(long)]
    pub(crate) loans_csv: Option<PathBuf>,
    /// Queue due-soon and overdue reminders after classifying
    #[arg(long)]
    pub(crate) send: bool,
}

pub(crate) fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
    let SweepArgs {
        as_of,
        books_csv,
        students_csv,
        loans_csv,
        send,
    } = args;

    let config = AppConfig::load()?;
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let store = seed_library(books_csv.as_deref(), students_csv.as_deref())?;
    let notifier = OutboxNotifier::default();
    let service = build_service(store, notifier.clone(), config.circulation);

    if let Some(path) = loans_csv {
        let history = CatalogImporter::loans_from_path(&path)?;
        let summary = replay_history(&service, history);
        println!(
            "Replayed {} loans from {} ({} rejected)",
            summary.replayed,
            path.display(),
            summary.rejected
        );
    }

    let buckets = service.classify_notifications(as_of)?;
    println!("Circulation sweep as of {as_of}");
    render_buckets(&buckets);

    if send {
        let before = notifier.queued().len();
        let summary = dispatch_reminders(&buckets, &notifier);
        println!(
            "\nReminders: {} queued | {} without address | {} failed",
            summary.sent, summary.skipped, summary.failed
        );
        for (destination, notice) in notifier.queued().iter().skip(before) {
            println!(
                "  - {} -> {} ({})",
                notice.kind.template(),
                destination,
                notice.loan_id
            );
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { start, json } = args;
    let start = start.unwrap_or_else(|| Local::now().date_naive());
    let policy = CirculationPolicy::default();

    let store = seed_library(None, None)?;
    let notifier = OutboxNotifier::default();
    let service = Arc::new(build_service(store, notifier.clone(), policy));
    let desk = RequestContext::new("demo-desk");

    let maria = StudentNo("2021-00123".to_string());
    let jose = StudentNo("2022-00456".to_string());
    let algorithms = Identifier::isbn("9780262033848");
    let k_and_r = Identifier::isbn("9780131103627");
    let patterns = Identifier::isbn("9780201633610");
    let florante = Identifier::accession("ACC-1999-014");

    println!("Library circulation demo starting {start}");
    println!(
        "Policy: {} per day late | {} active loans per student | due-soon window {} days",
        policy.penalty_rate, policy.max_active_loans, policy.due_soon_days
    );

    println!("\nCheckout");
    let first = service.checkout_book(&desk, algorithms, maria.clone(), start, None)?;
    print_loan("Maria borrows Introduction to Algorithms", &first);
    print_stock(&service, "Introduction to Algorithms", "9780262033848");

    let second = service.checkout_book(&desk, k_and_r, maria.clone(), start, None)?;
    print_loan("Maria borrows The C Programming Language", &second);
    let third = service.checkout_book(&desk, patterns, maria.clone(), start, None)?;
    print_loan("Maria borrows Design Patterns", &third);

    println!("\nBorrowing limit");
    match service.checkout_book(&desk, florante, maria, start, None) {
        Ok(outcome) => print_loan("Unexpected fourth loan", &outcome),
        Err(err) => println!("- Fourth checkout refused: {err}"),
    }
    print_stock(&service, "Florante at Laura", "ACC-1999-014");

    println!("\nLate return");
    let late_return = service.default_due_date(start)? + Duration::days(5);
    let returned = service.return_book(&desk, &first.value.loan_id, late_return)?;
    println!(
        "- {} returned on {} (due {}), penalty frozen at {}",
        returned.value.loan_id,
        late_return,
        returned.value.due_date,
        returned.value.penalty
    );
    print_stock(&service, "Introduction to Algorithms", "9780262033848");
    let later = late_return + Duration::days(30);
    println!(
        "- Penalty re-read on {}: {}",
        later,
        service.compute_live_penalty(&first.value.loan_id, later)?
    );
    match service.return_book(&desk, &first.value.loan_id, later) {
        Ok(_) => println!("- Unexpected second return accepted"),
        Err(err) => println!("- Second return refused: {err}"),
    }

    println!("\nAccession lookup");
    let jose_loan = service.checkout_book(
        &desk,
        service.find_book("ACC-1999-014")?.identifier,
        jose,
        start + Duration::days(3),
        Some(start + Duration::days(6)),
    )?;
    print_loan("Jose borrows Florante at Laura by accession number", &jose_loan);

    println!("\nAdministrative deletion");
    let deleted = service.delete_loan(&desk, &third.value.loan_id, true)?;
    println!(
        "- Deleted active loan {} (stock restored: {})",
        deleted.value.record.loan_id, deleted.value.stock_restored
    );
    print_stock(&service, "Design Patterns", "9780201633610");

    let as_of = start + Duration::days(8);
    println!("\nNotification sweep as of {as_of}");
    let buckets = service.classify_notifications(as_of)?;
    render_buckets(&buckets);
    if json {
        match serde_json::to_string_pretty(&buckets) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("  Bucket payload unavailable: {err}"),
        }
    }

    let summary = dispatch_reminders(&buckets, &notifier);
    println!(
        "\nNotices queued: {} total ({} reminders this sweep, {} skipped)",
        notifier.queued().len(),
        summary.sent,
        summary.skipped
    );
    for (destination, notice) in notifier.queued() {
        println!("  - template={} -> {}", notice.kind.template(), destination);
    }

    Ok(())
}

fn print_loan(label: &str, outcome: &LedgerOutcome<LoanRecord>) {
    let loan = &outcome.value;
    println!(
        "- {}: loan {} due {} ({})",
        label,
        loan.loan_id,
        loan.due_date,
        loan.state().label()
    );
    for warning in &outcome.warnings {
        println!("  warning: {}", warning.message());
    }
}

fn print_stock(service: &LibraryService, title: &str, raw: &str) {
    match service.find_book(raw) {
        Ok(book) => println!(
            "  {} on shelf: {} ({})",
            title,
            book.quantity,
            book.effective_status().label()
        ),
        Err(err) => println!("  {} lookup failed: {}", title, err),
    }
}

fn render_buckets(buckets: &NotificationBuckets) {
    if buckets.is_empty() {
        println!("- Nothing due, overdue or recently returned");
        return;
    }

    println!("Due soon ({})", buckets.due_soon.len());
    for entry in &buckets.due_soon {
        println!(
            "  - {} | {} | {} | {} day(s) left",
            entry.loan.loan_id,
            entry.loan.book_title.as_deref().unwrap_or("<missing book>"),
            entry.loan.student_name.as_deref().unwrap_or("<missing student>"),
            entry.days_left
        );
    }
    println!("Overdue ({})", buckets.overdue.len());
    for entry in &buckets.overdue {
        println!(
            "  - {} | {} | {} | {} day(s) overdue | penalty {}",
            entry.loan.loan_id,
            entry.loan.book_title.as_deref().unwrap_or("<missing book>"),
            entry.loan.student_name.as_deref().unwrap_or("<missing student>"),
            entry.days_overdue,
            entry.penalty
        );
    }
    println!("Recently returned ({})", buckets.recently_returned.len());
    for entry in &buckets.recently_returned {
        let lateness = match (entry.days_late, entry.penalty) {
            (Some(days), Some(penalty)) => format!("{days} day(s) late, penalty {penalty}"),
            _ => "on time".to_string(),
        };
        println!(
            "  - {} | {} | returned {} | {}",
            entry.loan.loan_id,
            entry.loan.book_title.as_deref().unwrap_or("<missing book>"),
            entry.return_date,
            lateness
        );
    }
}
