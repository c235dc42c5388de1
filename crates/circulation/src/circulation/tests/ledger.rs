use std::sync::Arc;

use super::common::*;
use crate::circulation::domain::{Identifier, LoanId, LoanState, StudentNo};
use crate::circulation::error::{CirculationError, LedgerWarning};
use crate::circulation::ledger::{CheckoutRequest, CirculationLedger};
use crate::circulation::repository::{LoanStore, NoticeKind, RepositoryError};
use crate::circulation::CirculationPolicy;

fn request(identifier: Identifier, student_no: StudentNo) -> CheckoutRequest {
    CheckoutRequest {
        book_identifier: identifier,
        student_no,
        borrow_date: date(2024, 1, 1),
        due_date: date(2024, 1, 8),
    }
}

#[test]
fn checkout_creates_active_loan_and_takes_one_unit() {
    let (ledger, store, notifier, audit) = build_ledger();

    let outcome = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout succeeds");
    let loan = outcome.value;

    assert_eq!(loan.state(), LoanState::Active);
    assert_eq!(loan.penalty, 0);
    assert!(loan.return_date.is_none());
    assert_eq!(loan.book_identifier, isbn_b1());
    assert_eq!(quantity(&store, &isbn_b1()), 1);
    assert!(outcome.warnings.is_empty());

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "maria@example.edu");
    assert_eq!(sent[0].1.kind, NoticeKind::CheckoutReceipt);
    assert_eq!(audit.events()[0].event_type, "loan.checkout");
    assert_eq!(audit.events()[0].actor, "librarian@test");
}

#[test]
fn fourth_checkout_is_rejected_without_stock_changes() {
    let (ledger, store, _, _) = build_ledger();
    for identifier in [isbn_b1(), isbn_b2(), isbn_b3()] {
        ledger
            .checkout(&ctx(), request(identifier, s1()))
            .expect("within limit");
    }
    let before = quantity(&store, &accession_b4());

    match ledger.checkout(&ctx(), request(accession_b4(), s1())) {
        Err(CirculationError::LimitExceeded { active, limit, .. }) => {
            assert_eq!(active, 3);
            assert_eq!(limit, 3);
        }
        other => panic!("expected limit exceeded, got {other:?}"),
    }

    assert_eq!(quantity(&store, &accession_b4()), before);
    assert_eq!(store.count_active_loans(&s1()).expect("count"), 3);
}

#[test]
fn returning_frees_a_slot_under_the_limit() {
    let (ledger, _, _, _) = build_ledger();
    let first = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("first")
        .value;
    ledger
        .checkout(&ctx(), request(isbn_b2(), s1()))
        .expect("second");
    ledger
        .checkout(&ctx(), request(isbn_b3(), s1()))
        .expect("third");

    ledger
        .return_loan(&ctx(), &first.loan_id, date(2024, 1, 5))
        .expect("return");

    ledger
        .checkout(&ctx(), request(accession_b4(), s1()))
        .expect("slot freed by return");
}

#[test]
fn unavailable_book_is_rejected_before_any_write() {
    let (ledger, store, notifier, _) = build_ledger();
    ledger
        .checkout(&ctx(), request(isbn_b2(), s1()))
        .expect("last copy");

    match ledger.checkout(&ctx(), request(isbn_b2(), s2())) {
        Err(CirculationError::BookUnavailable(identifier)) => assert_eq!(identifier, isbn_b2()),
        other => panic!("expected unavailable, got {other:?}"),
    }
    assert_eq!(quantity(&store, &isbn_b2()), 0);
    assert_eq!(store.count_total_loans(&s2()).expect("count"), 0);
    assert_eq!(notifier.sent().len(), 1);
}

#[test]
fn unknown_student_and_book_fail_cleanly() {
    let (ledger, store, _, _) = build_ledger();

    match ledger.checkout(&ctx(), request(isbn_b1(), StudentNo("missing".to_string()))) {
        Err(CirculationError::StudentNotFound(_)) => {}
        other => panic!("expected student not found, got {other:?}"),
    }
    match ledger.checkout(&ctx(), request(Identifier::isbn("0000000000"), s1())) {
        Err(CirculationError::BookNotFound(_)) => {}
        other => panic!("expected book not found, got {other:?}"),
    }
    match ledger.checkout(&ctx(), request(Identifier::isbn("   "), s1())) {
        Err(CirculationError::InvalidIdentifier(_)) => {}
        other => panic!("expected invalid identifier, got {other:?}"),
    }
    assert_eq!(quantity(&store, &isbn_b1()), 2);
}

#[test]
fn isbn_scheme_does_not_resolve_accession_books() {
    let (ledger, _, _, _) = build_ledger();
    match ledger.checkout(&ctx(), request(Identifier::isbn("ACC-1999-014"), s1())) {
        Err(CirculationError::BookNotFound(_)) => {}
        other => panic!("expected book not found, got {other:?}"),
    }
}

#[test]
fn due_date_before_borrow_date_is_rejected() {
    let (ledger, _, _, _) = build_ledger();
    let mut bad = request(isbn_b1(), s1());
    bad.due_date = date(2023, 12, 31);
    assert!(matches!(
        ledger.checkout(&ctx(), bad),
        Err(CirculationError::InvalidDueDate { .. })
    ));
}

#[test]
fn late_return_freezes_penalty_and_restores_stock() {
    let (ledger, store, notifier, _) = build_ledger();
    let loan = ledger
        .checkout(
            &ctx(),
            CheckoutRequest {
                book_identifier: isbn_b1(),
                student_no: s1(),
                borrow_date: date(2024, 1, 3),
                due_date: date(2024, 1, 10),
            },
        )
        .expect("checkout")
        .value;

    let returned = ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 15))
        .expect("return")
        .value;

    assert_eq!(returned.penalty, 50);
    assert_eq!(returned.state(), LoanState::Returned);
    assert_eq!(returned.return_date, Some(date(2024, 1, 15)));
    assert_eq!(quantity(&store, &isbn_b1()), 2);

    assert_eq!(
        ledger
            .live_penalty(&loan.loan_id, date(2024, 1, 15))
            .expect("penalty"),
        50
    );
    assert_eq!(
        ledger
            .live_penalty(&loan.loan_id, date(2025, 6, 1))
            .expect("penalty"),
        50
    );

    let receipt = &notifier.sent()[1].1;
    assert_eq!(receipt.kind, NoticeKind::ReturnReceipt);
    assert_eq!(receipt.details.get("penalty").map(String::as_str), Some("50"));
}

#[test]
fn second_return_is_rejected_and_stock_untouched() {
    let (ledger, store, _, _) = build_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;
    ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 8))
        .expect("on-time return");

    match ledger.return_loan(&ctx(), &loan.loan_id, date(2024, 1, 20)) {
        Err(CirculationError::AlreadyReturned(id)) => assert_eq!(id, loan.loan_id),
        other => panic!("expected already returned, got {other:?}"),
    }
    assert_eq!(quantity(&store, &isbn_b1()), 2);
    assert_eq!(
        ledger.get(&loan.loan_id).expect("loan").penalty,
        0,
        "frozen penalty must not be recomputed"
    );
}

#[test]
fn return_of_unknown_loan_is_not_found() {
    let (ledger, _, _, _) = build_ledger();
    assert!(matches!(
        ledger.return_loan(&ctx(), &LoanId("240101zzzzz".to_string()), date(2024, 1, 2)),
        Err(CirculationError::LoanNotFound(_))
    ));
}

#[test]
fn return_restores_stock_under_the_frozen_identifier() {
    let (ledger, store, _, _) = build_ledger();
    let loan = ledger
        .checkout(&ctx(), request(accession_b4(), s1()))
        .expect("checkout")
        .value;

    // Catalog entry retitled after checkout; the loan still points at the same accession.
    store
        .replace_book(
            &accession_b4(),
            Some(book(accession_b4(), "Florante at Laura (2nd ed.)", 0)),
        )
        .expect("edit catalog");

    ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 7))
        .expect("return");
    assert_eq!(quantity(&store, &accession_b4()), 1);
}

#[test]
fn stale_reference_is_surfaced_as_warning() {
    let (ledger, store, _, _) = build_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b3(), s1()))
        .expect("checkout")
        .value;
    store.replace_book(&isbn_b3(), None).expect("remove book");

    let outcome = ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 8))
        .expect("return still succeeds");

    assert_eq!(outcome.value.state(), LoanState::Returned);
    assert!(outcome.warnings.contains(&LedgerWarning::StaleReference {
        book_identifier: isbn_b3()
    }));
}

#[test]
fn notifier_failure_is_a_warning_not_an_error() {
    let store = seeded_store();
    let ledger = CirculationLedger::new(
        store.clone(),
        Arc::new(MemoryNotifier::failing()),
        Arc::new(MemoryAudit::default()),
        CirculationPolicy::default(),
    );

    let outcome = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout persists despite notifier outage");

    assert!(matches!(
        outcome.warnings.as_slice(),
        [LedgerWarning::NotificationFailed { destination, .. }] if destination == "maria@example.edu"
    ));
    assert_eq!(quantity(&store, &isbn_b1()), 1);
    assert!(store
        .find_loan(&outcome.value.loan_id)
        .expect("lookup")
        .is_some());
}

#[test]
fn deleting_active_loan_restores_stock_once() {
    let (ledger, store, _, audit) = build_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;
    assert_eq!(quantity(&store, &isbn_b1()), 1);

    let deleted = ledger
        .delete_loan(&ctx(), &loan.loan_id, true)
        .expect("administrative delete");

    assert!(deleted.value.stock_restored);
    assert_eq!(quantity(&store, &isbn_b1()), 2);
    assert!(store.find_loan(&loan.loan_id).expect("lookup").is_none());
    assert!(matches!(
        ledger.delete_loan(&ctx(), &loan.loan_id, true),
        Err(CirculationError::LoanNotFound(_))
    ));
    assert_eq!(quantity(&store, &isbn_b1()), 2);
    assert!(audit
        .events()
        .iter()
        .any(|event| event.event_type == "loan.delete"));
}

#[test]
fn deleting_returned_loan_leaves_stock_alone() {
    let (ledger, store, _, _) = build_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;
    ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 8))
        .expect("return");
    assert_eq!(quantity(&store, &isbn_b1()), 2);

    let deleted = ledger
        .delete_loan(&ctx(), &loan.loan_id, true)
        .expect("delete returned");

    assert!(!deleted.value.stock_restored);
    assert_eq!(quantity(&store, &isbn_b1()), 2);
}

#[test]
fn active_deletion_requires_explicit_permission() {
    let (ledger, store, _, _) = build_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;

    assert!(matches!(
        ledger.delete_loan(&ctx(), &loan.loan_id, false),
        Err(CirculationError::StillActive(_))
    ));
    assert_eq!(quantity(&store, &isbn_b1()), 1);
    assert!(store.find_loan(&loan.loan_id).expect("lookup").is_some());
}

#[test]
fn clear_history_only_prunes_returned_loans() {
    let (ledger, store, _, _) = build_ledger();
    let active = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;
    let closed = ledger
        .checkout(&ctx(), request(isbn_b2(), s1()))
        .expect("checkout")
        .value;
    ledger
        .return_loan(&ctx(), &closed.loan_id, date(2024, 1, 9))
        .expect("return");

    assert!(matches!(
        ledger.clear_history(&ctx(), &active.loan_id),
        Err(CirculationError::StillActive(_))
    ));
    ledger
        .clear_history(&ctx(), &closed.loan_id)
        .expect("prune returned loan");

    assert_eq!(quantity(&store, &isbn_b1()), 1);
    assert_eq!(quantity(&store, &isbn_b2()), 1);
    assert_eq!(store.count_total_loans(&s1()).expect("count"), 1);
}

#[test]
fn id_collisions_retry_with_a_fresh_id() {
    let store = seeded_store();
    let ledger = CirculationLedger::with_id_generator(
        store.clone(),
        Arc::new(MemoryNotifier::default()),
        Arc::new(MemoryAudit::default()),
        CirculationPolicy::default(),
        Arc::new(ScriptedIds::new(&["240101aaaaa", "240101aaaaa", "240101bbbbb"])),
    );

    let first = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("first")
        .value;
    let second = ledger
        .checkout(&ctx(), request(isbn_b2(), s2()))
        .expect("second retries")
        .value;

    assert_eq!(first.loan_id, LoanId("240101aaaaa".to_string()));
    assert_eq!(second.loan_id, LoanId("240101bbbbb".to_string()));
}

#[test]
fn exhausted_id_retries_restore_stock() {
    let store = seeded_store();
    let policy = CirculationPolicy {
        id_retry_attempts: 1,
        ..CirculationPolicy::default()
    };
    let ledger = CirculationLedger::with_id_generator(
        store.clone(),
        Arc::new(MemoryNotifier::default()),
        Arc::new(MemoryAudit::default()),
        policy,
        Arc::new(ScriptedIds::new(&["240101aaaaa", "240101aaaaa", "240101aaaaa"])),
    );
    ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("first");

    match ledger.checkout(&ctx(), request(isbn_b2(), s2())) {
        Err(CirculationError::Repository(RepositoryError::Conflict)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(quantity(&store, &isbn_b2()), 1);
}

#[test]
fn student_history_filters_by_state() {
    let (ledger, _, _, _) = build_ledger();
    let kept = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;
    let closed = ledger
        .checkout(&ctx(), request(isbn_b2(), s1()))
        .expect("checkout")
        .value;
    ledger
        .checkout(&ctx(), request(isbn_b3(), s2()))
        .expect("other student");
    ledger
        .return_loan(&ctx(), &closed.loan_id, date(2024, 1, 4))
        .expect("return");

    let all = ledger.loans_for_student(&s1(), None).expect("history");
    assert_eq!(all.len(), 2);
    let active = ledger
        .loans_for_student(&s1(), Some(LoanState::Active))
        .expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].loan_id, kept.loan_id);
}

#[test]
fn return_stays_committed_when_receipt_lookup_fails() {
    let (ledger, store, inner) = build_flaky_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b1(), s1()))
        .expect("checkout")
        .value;
    store.break_student_lookup();

    let outcome = ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 13))
        .expect("saved return is reported as success");

    assert_eq!(outcome.value.penalty, 50);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [LedgerWarning::RecipientUnavailable { student_no, .. }] if *student_no == s1()
    ));
    assert_eq!(quantity(&inner, &isbn_b1()), 2);
    let stored = inner
        .find_loan(&loan.loan_id)
        .expect("lookup")
        .expect("loan kept");
    assert_eq!(stored.return_date, Some(date(2024, 1, 13)));
    assert_eq!(stored.penalty, 50);
}

#[test]
fn failed_restock_after_return_is_a_warning() {
    let (ledger, store, inner) = build_flaky_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b2(), s1()))
        .expect("checkout")
        .value;
    store.break_restock();

    let outcome = ledger
        .return_loan(&ctx(), &loan.loan_id, date(2024, 1, 5))
        .expect("return succeeds");

    assert_eq!(outcome.value.state(), LoanState::Returned);
    assert!(outcome.warnings.contains(&LedgerWarning::StockNotRestored {
        book_identifier: isbn_b2(),
        reason: "repository unavailable: catalog offline".to_string(),
    }));
    assert_eq!(quantity(&inner, &isbn_b2()), 0);
    assert!(matches!(
        ledger.return_loan(&ctx(), &loan.loan_id, date(2024, 1, 6)),
        Err(CirculationError::AlreadyReturned(_))
    ));
}

#[test]
fn failed_restock_after_active_delete_is_a_warning() {
    let (ledger, store, inner) = build_flaky_ledger();
    let loan = ledger
        .checkout(&ctx(), request(isbn_b3(), s2()))
        .expect("checkout")
        .value;
    store.break_restock();

    let outcome = ledger
        .delete_loan(&ctx(), &loan.loan_id, true)
        .expect("delete succeeds");

    assert!(!outcome.value.stock_restored);
    assert!(matches!(
        outcome.warnings.as_slice(),
        [LedgerWarning::StockNotRestored { book_identifier, .. }] if *book_identifier == isbn_b3()
    ));
    assert!(inner.find_loan(&loan.loan_id).expect("lookup").is_none());
}
