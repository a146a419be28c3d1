mod common;

use common::{FailingNotifier, Fixture, RecordingNotifier};
use library_circulation::circulation::inventory::Removal;
use library_circulation::circulation::{BookFields, IssueStatus, RequestStatus, RequestType};
use library_circulation::{CirculationError, Coordinator, MemoryStore, Notice, PairState};

#[test]
fn issue_and_return_single_copy() {
    let fx = Fixture::new();
    let book = fx.book("Dune", 1);

    let issue = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    assert_eq!(issue.status(), RequestStatus::Pending);
    assert_eq!(issue.request_type(), RequestType::Issue);
    assert_eq!(fx.copies(book.isbn()), (1, 1));

    let resolution = fx.coordinator.approve(issue.req_id(), fx.admin.id()).unwrap();
    assert_eq!(resolution.request.status(), RequestStatus::Approved);
    assert_eq!(resolution.request.approver_id(), Some(fx.admin.id()));
    assert!(resolution.request.approval_date().is_some());
    let loan = resolution.loan.unwrap();
    assert_eq!(loan.issue_status(), IssueStatus::Issued);
    assert_eq!(loan.issue_approver_id(), fx.admin.id());
    assert_eq!(fx.copies(book.isbn()), (1, 0));

    let ret = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).unwrap();
    assert_eq!(ret.request_type(), RequestType::Return);
    assert_eq!(ret.status(), RequestStatus::Pending);

    let resolution = fx.coordinator.approve(ret.req_id(), fx.admin.id()).unwrap();
    let loan = resolution.loan.unwrap();
    assert_eq!(loan.issue_status(), IssueStatus::Returned);
    assert!(loan.return_date().is_some());
    assert_eq!(loan.return_approver_id(), Some(fx.admin.id()));
    assert_eq!(fx.copies(book.isbn()), (1, 1));
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::Idle);
}

#[test]
fn removing_copy_while_on_loan_is_rejected() {
    let fx = Fixture::new();
    let book = fx.book("Neuromancer", 2);
    fx.issue(&fx.reader, book.isbn());
    assert_eq!(fx.copies(book.isbn()), (2, 1));

    let result = fx.coordinator.remove_copy(book.isbn());

    assert_eq!(result, Err(CirculationError::Conflict("issued books cannot be removed".to_owned())));
    assert_eq!(fx.copies(book.isbn()), (2, 1));
}

#[test]
fn removing_last_copy_deletes_entry() {
    let fx = Fixture::new();
    let book = fx.book("Solaris", 1);

    let removal = fx.coordinator.remove_copy(book.isbn()).unwrap();

    assert_eq!(removal, Removal::Deleted(book.isbn()));
    assert!(matches!(fx.coordinator.book(book.isbn()), Err(CirculationError::NotFound(_))));
    assert!(fx.coordinator.books_of_library(fx.library_id).unwrap().is_empty());
}

#[test]
fn removing_copy_from_shelf_decrements_both_counts() {
    let fx = Fixture::new();
    let book = fx.book("Ubik", 3);

    let removal = fx.coordinator.remove_copy(book.isbn()).unwrap();

    assert!(matches!(removal, Removal::Decremented(ref b) if b.total_copies() == 2 && b.available_copies() == 2));
    assert_eq!(fx.copies(book.isbn()), (2, 2));
}

#[test]
fn acquiring_existing_title_adds_copies() {
    let fx = Fixture::new();
    let first = fx.book("Hyperion", 1);
    let second = fx.book("Hyperion", 2);

    assert_eq!(first.isbn(), second.isbn());
    assert_eq!(fx.copies(first.isbn()), (3, 3));
    assert_eq!(fx.coordinator.books_of_library(fx.library_id).unwrap().len(), 1);
}

#[test]
fn acquiring_zero_copies_or_for_unknown_library_fails() {
    let fx = Fixture::new();

    let zero = fx.coordinator.acquire_title(fx.library_id, &BookFields::titled("Kindred"), 0);
    let unknown = fx.coordinator.acquire_title(999, &BookFields::titled("Kindred"), 1);

    assert!(matches!(zero, Err(CirculationError::InvalidArgument(_))));
    assert!(matches!(unknown, Err(CirculationError::NotFound(_))));
}

#[test]
fn add_copies_to_unknown_book_is_not_found() {
    let fx = Fixture::new();

    assert!(matches!(fx.coordinator.add_copies(42, 1), Err(CirculationError::NotFound(_))));
}

#[test]
fn removing_only_copy_on_loan_is_rejected() {
    let fx = Fixture::new();
    let book = fx.book("Dune Messiah", 1);
    fx.issue(&fx.reader, book.isbn());

    let result = fx.coordinator.remove_copy(book.isbn());

    assert_eq!(result, Err(CirculationError::Conflict("issued books cannot be removed".to_owned())));
    assert_eq!(fx.copies(book.isbn()), (1, 0));

    let ret = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).unwrap();
    fx.coordinator.approve(ret.req_id(), fx.admin.id()).unwrap();
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::Idle);
    assert_eq!(fx.coordinator.remove_copy(book.isbn()).unwrap(), Removal::Deleted(book.isbn()));
}

#[test]
fn removing_copy_when_all_are_on_loan_is_rejected() {
    let fx = Fixture::new();
    let book = fx.book("Children of Dune", 2);
    let other = fx.another_reader("other@central.org");
    fx.issue(&fx.reader, book.isbn());
    fx.issue(&other, book.isbn());

    let result = fx.coordinator.remove_copy(book.isbn());

    assert!(matches!(result, Err(CirculationError::Conflict(_))));
    assert_eq!(fx.copies(book.isbn()), (2, 0));
}

#[test]
fn remove_copy_of_unknown_book_is_not_found() {
    let fx = Fixture::new();

    assert!(matches!(fx.coordinator.remove_copy(42), Err(CirculationError::NotFound(_))));
}

#[test]
fn update_unknown_book_is_not_found() {
    let fx = Fixture::new();

    let result = fx.coordinator.update_book(42, &BookFields::titled("Kindred"), 1);

    assert!(matches!(result, Err(CirculationError::NotFound(_))));
}

#[test]
fn issue_request_for_unknown_book_is_not_found() {
    let fx = Fixture::new();

    let result = fx.coordinator.submit_issue_request(fx.reader.id(), 42);

    assert!(matches!(result, Err(CirculationError::NotFound(_))));
}

#[test]
fn issue_request_by_unknown_reader_is_not_found() {
    let fx = Fixture::new();
    let book = fx.book("Kindred", 1);

    let result = fx.coordinator.submit_issue_request(999, book.isbn());

    assert!(matches!(result, Err(CirculationError::NotFound(_))));
    assert!(fx.coordinator.requests_for(fx.admin.id()).unwrap().is_empty());
}

#[test]
fn update_book_replaces_fields_and_adds_copies() {
    let fx = Fixture::new();
    let book = fx.book("Foundation", 2);
    fx.issue(&fx.reader, book.isbn());

    let fields = BookFields {
        title: "Foundation and Empire".to_owned(),
        authors: vec!["Isaac Asimov".to_owned()],
        publisher: "Gnome Press".to_owned(),
        version: "2nd".to_owned(),
    };
    let updated = fx.coordinator.update_book(book.isbn(), &fields, 3).unwrap();

    assert_eq!(updated.fields(), &fields);
    assert_eq!((updated.total_copies(), updated.available_copies()), (5, 4));
    assert_eq!(updated.copies_on_loan(), 1);
}

#[test]
fn duplicate_issue_request_is_rejected_while_pending_or_issued() {
    let fx = Fixture::new();
    let book = fx.book("Dhalgren", 3);

    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    let pending = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn());
    assert!(matches!(pending, Err(CirculationError::Conflict(_))));

    fx.coordinator.approve(event.req_id(), fx.admin.id()).unwrap();
    let issued = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn());
    assert!(matches!(issued, Err(CirculationError::Conflict(_))));
}

#[test]
fn reader_can_borrow_again_after_return() {
    let fx = Fixture::new();
    let book = fx.book("Gateway", 1);

    fx.issue(&fx.reader, book.isbn());
    let ret = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).unwrap();
    fx.coordinator.approve(ret.req_id(), fx.admin.id()).unwrap();

    let again = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    assert_eq!(again.status(), RequestStatus::Pending);
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::IssueRequested);
}

#[test]
fn issue_request_for_unavailable_book_fails() {
    let fx = Fixture::new();
    let book = fx.book("Roadside Picnic", 1);
    let other = fx.another_reader("other@central.org");
    fx.issue(&other, book.isbn());

    let result = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn());

    assert!(matches!(result, Err(CirculationError::Unavailable(_))));
}

#[test]
fn rejecting_issue_leaves_inventory_untouched() {
    let fx = Fixture::new();
    let book = fx.book("Stand on Zanzibar", 1);
    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();

    let resolution = fx.coordinator.reject(event.req_id(), fx.admin.id()).unwrap();

    assert_eq!(resolution.request.status(), RequestStatus::Rejected);
    assert_eq!(resolution.request.approver_id(), None);
    assert!(resolution.loan.is_none());
    assert_eq!(fx.copies(book.isbn()), (1, 1));
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::Idle);
    assert!(fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).is_ok());
}

#[test]
fn rejecting_return_keeps_the_loan_open() {
    let fx = Fixture::new();
    let book = fx.book("Babel-17", 1);
    fx.issue(&fx.reader, book.isbn());
    let ret = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).unwrap();
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::ReturnRequested);

    fx.coordinator.reject(ret.req_id(), fx.admin.id()).unwrap();

    assert_eq!(fx.copies(book.isbn()), (1, 0));
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::Issued);
    assert!(fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).is_ok());
}

#[test]
fn return_requires_an_open_loan() {
    let fx = Fixture::new();
    let book = fx.book("The Dispossessed", 1);

    let never_issued = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn());
    assert_eq!(
        never_issued,
        Err(CirculationError::Conflict("you cannot return a book that has not been issued".to_owned()))
    );

    fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    let still_pending = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn());
    assert!(matches!(still_pending, Err(CirculationError::Conflict(_))));
}

#[test]
fn duplicate_return_request_is_rejected() {
    let fx = Fixture::new();
    let book = fx.book("Lord of Light", 1);
    fx.issue(&fx.reader, book.isbn());
    fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).unwrap();

    let result = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn());

    assert!(matches!(result, Err(CirculationError::Conflict(_))));
}

#[test]
fn resolving_twice_is_a_conflict() {
    let fx = Fixture::new();
    let book = fx.book("Ringworld", 2);
    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    fx.coordinator.approve(event.req_id(), fx.admin.id()).unwrap();

    let again = fx.coordinator.approve(event.req_id(), fx.admin.id());
    let reject = fx.coordinator.reject(event.req_id(), fx.admin.id());

    assert!(matches!(again, Err(CirculationError::Conflict(_))));
    assert!(matches!(reject, Err(CirculationError::Conflict(_))));
    assert_eq!(fx.copies(book.isbn()), (2, 1));
    assert_eq!(fx.coordinator.loans_for(fx.reader.id()).unwrap().len(), 1);
}

#[test]
fn resolving_unknown_request_is_not_found() {
    let fx = Fixture::new();

    assert!(matches!(fx.coordinator.approve(77, fx.admin.id()), Err(CirculationError::NotFound(_))));
}

#[test]
fn failed_approval_leaves_request_pending() {
    let fx = Fixture::new();
    let book = fx.book("Nova", 1);
    let other = fx.another_reader("other@central.org");
    let first = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    let second = fx.coordinator.submit_issue_request(other.id(), book.isbn()).unwrap();
    fx.coordinator.approve(first.req_id(), fx.admin.id()).unwrap();

    let result = fx.coordinator.approve(second.req_id(), fx.admin.id());

    assert!(matches!(result, Err(CirculationError::Unavailable(_))));
    assert_eq!(fx.copies(book.isbn()), (1, 0));
    assert_eq!(fx.coordinator.pair_state(book.isbn(), other.id()).unwrap(), PairState::IssueRequested);
    assert!(fx.coordinator.loans_for(other.id()).unwrap().is_empty());
}

#[test]
fn non_readers_cannot_submit_and_non_admins_cannot_resolve() {
    let fx = Fixture::new();
    let book = fx.book("Timescape", 1);

    let by_admin = fx.coordinator.submit_issue_request(fx.admin.id(), book.isbn());
    let by_owner = fx.coordinator.submit_issue_request(fx.owner.id(), book.isbn());
    assert!(matches!(by_admin, Err(CirculationError::Forbidden(_))));
    assert!(matches!(by_owner, Err(CirculationError::Forbidden(_))));

    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    let by_reader = fx.coordinator.approve(event.req_id(), fx.reader.id());
    let by_owner = fx.coordinator.approve(event.req_id(), fx.owner.id());
    assert!(matches!(by_reader, Err(CirculationError::Forbidden(_))));
    assert!(matches!(by_owner, Err(CirculationError::Forbidden(_))));
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::IssueRequested);
}

#[test]
fn other_library_cannot_touch_books() {
    let fx = Fixture::new();
    let book = fx.book("Blindsight", 1);
    let (_, other_owner) = fx.coordinator.register_library("Branch", "owner@branch.org").unwrap();
    let other_admin = fx.coordinator.onboard_admin(other_owner.id(), "admin@branch.org").unwrap();
    let other_reader = fx.coordinator.onboard_reader(other_admin.id(), "reader@branch.org").unwrap();

    let submit = fx.coordinator.submit_issue_request(other_reader.id(), book.isbn());
    assert!(matches!(submit, Err(CirculationError::Forbidden(_))));

    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();
    let approve = fx.coordinator.approve(event.req_id(), other_admin.id());
    assert!(matches!(approve, Err(CirculationError::Forbidden(_))));
    assert_eq!(fx.copies(book.isbn()), (1, 1));
}

#[test]
fn expected_return_date_follows_loan_period() {
    let fx = Fixture::new();
    let book = fx.book("Accelerando", 1);
    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();

    let loan = fx.coordinator.approve(event.req_id(), fx.admin.id()).unwrap().loan.unwrap();

    assert_eq!(loan.expected_return_date() - loan.issue_date(), chrono::Duration::days(7));
}

#[test]
fn loan_period_is_configurable() {
    let fx = Fixture::with_coordinator(Coordinator::new(MemoryStore::new()).with_loan_period(14));
    let book = fx.book("Anathem", 1);
    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();

    let loan = fx.coordinator.approve(event.req_id(), fx.admin.id()).unwrap().loan.unwrap();

    assert_eq!(loan.expected_return_date() - loan.issue_date(), chrono::Duration::days(14));
}

#[test]
fn listings_are_scoped_by_role() {
    let fx = Fixture::new();
    let book = fx.book("Perdido Street Station", 2);
    let other = fx.another_reader("other@central.org");
    fx.issue(&fx.reader, book.isbn());
    fx.coordinator.submit_issue_request(other.id(), book.isbn()).unwrap();

    let (_, branch_owner) = fx.coordinator.register_library("Branch", "owner@branch.org").unwrap();
    let branch_admin = fx.coordinator.onboard_admin(branch_owner.id(), "admin@branch.org").unwrap();

    assert_eq!(fx.coordinator.requests_for(fx.reader.id()).unwrap().len(), 1);
    assert_eq!(fx.coordinator.requests_for(other.id()).unwrap().len(), 1);
    assert_eq!(fx.coordinator.requests_for(fx.admin.id()).unwrap().len(), 2);
    assert_eq!(fx.coordinator.requests_for(fx.owner.id()).unwrap().len(), 2);
    assert!(fx.coordinator.requests_for(branch_admin.id()).unwrap().is_empty());

    assert_eq!(fx.coordinator.loans_for(fx.reader.id()).unwrap().len(), 1);
    assert!(fx.coordinator.loans_for(other.id()).unwrap().is_empty());
    assert_eq!(fx.coordinator.loans_for(fx.admin.id()).unwrap().len(), 1);
    assert_eq!(fx.coordinator.loans_for(fx.owner.id()).unwrap().len(), 1);
    assert!(fx.coordinator.loans_for(branch_owner.id()).unwrap().is_empty());
}

#[test]
fn search_matches_title_publisher_or_author() {
    let fx = Fixture::new();
    let fields = BookFields {
        title: "The Book of the New Sun".to_owned(),
        authors: vec!["Gene Wolfe".to_owned()],
        publisher: "Timescape Books".to_owned(),
        version: "1st".to_owned(),
    };
    fx.coordinator.acquire_title(fx.library_id, &fields, 1).unwrap();
    fx.book("Engine Summer", 1);

    assert_eq!(fx.coordinator.search_books("The Book of the New Sun").unwrap().len(), 1);
    assert_eq!(fx.coordinator.search_books("Timescape Books").unwrap().len(), 1);
    assert_eq!(fx.coordinator.search_books("Gene Wolfe").unwrap().len(), 1);
    assert!(fx.coordinator.search_books("Wolfe").unwrap().is_empty());
    assert_eq!(fx.coordinator.search_books("  ").unwrap().len(), 2);
}

#[test]
fn books_of_unknown_library_is_not_found() {
    let fx = Fixture::new();

    assert!(matches!(fx.coordinator.books_of_library(404), Err(CirculationError::NotFound(_))));
}

#[test]
fn reader_is_notified_after_resolution() {
    let notifier = RecordingNotifier::default();
    let fx = Fixture::with_coordinator(Coordinator::new(MemoryStore::new()).with_notifier(notifier.clone()));
    let book = fx.book("Cryptonomicon", 1);
    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();

    fx.coordinator.approve(event.req_id(), fx.admin.id()).unwrap();

    let resolved = Notice::RequestResolved {
        req_id: event.req_id(),
        request_type: RequestType::Issue,
        status: RequestStatus::Approved,
    };
    assert!(notifier.sent().contains(&(fx.reader.id(), resolved)));
}

#[test]
fn failed_notification_does_not_roll_back() {
    let fx = Fixture::with_coordinator(Coordinator::new(MemoryStore::new()).with_notifier(FailingNotifier));
    let book = fx.book("Snow Crash", 1);
    let event = fx.coordinator.submit_issue_request(fx.reader.id(), book.isbn()).unwrap();

    let resolution = fx.coordinator.approve(event.req_id(), fx.admin.id());

    assert!(resolution.is_ok());
    assert_eq!(fx.copies(book.isbn()), (1, 0));
    assert_eq!(fx.coordinator.pair_state(book.isbn(), fx.reader.id()).unwrap(), PairState::Issued);
}

#[test]
fn returned_loans_of_deleted_book_leave_library_listings() {
    let fx = Fixture::new();
    let book = fx.book("The Stars My Destination", 1);
    fx.issue(&fx.reader, book.isbn());
    let ret = fx.coordinator.submit_return_request(fx.reader.id(), book.isbn()).unwrap();
    fx.coordinator.approve(ret.req_id(), fx.admin.id()).unwrap();
    assert_eq!(fx.coordinator.loans_for(fx.owner.id()).unwrap().len(), 1);

    fx.coordinator.remove_copy(book.isbn()).unwrap();

    assert!(fx.coordinator.loans_for(fx.owner.id()).unwrap().is_empty());
    assert!(fx.coordinator.requests_for(fx.owner.id()).unwrap().is_empty());
    assert_eq!(fx.coordinator.loans_for(fx.reader.id()).unwrap().len(), 1);
    assert_eq!(fx.coordinator.requests_for(fx.reader.id()).unwrap().len(), 2);
}
