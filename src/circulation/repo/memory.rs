//! 메모리 저장소
//!
//! 테스트와 로컬 실행용 저장소로 PostgreSQL 저장소와 같은 잠금 규칙을 따른다.
//! `lock_*` 호출은 키(도서관, 도서) 단위로 잠기며 트랜잭션이 끝날 때 풀린다.
//! 트랜잭션 안의 변경은 즉시 반영하고 되돌리기 기록을 남겨, 실패시 역순으로 복원한다.

use crate::circulation::{
    BookFilter, BookInventory, CirculationError, IssueRegistry, IssueStatus, Library, LoanFilter, NewBook, NewLoan,
    NewRequestEvent, NewUser, RequestEvent, RequestFilter, RequestStatus, Result, Role, Session, Store, User,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
enum LockKey {
    Library(u64),
    Book(u64),
}

/// 키 단위 잠금. 같은 키를 잠그려는 트랜잭션은 먼저 잠근 트랜잭션이 끝날 때까지 대기한다.
#[derive(Debug, Default)]
struct KeyLocks {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
}

impl KeyLocks {
    fn acquire(&self, key: LockKey) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(&key) {
            held = self.released.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key);
    }

    fn release(&self, keys: &[LockKey]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            held.remove(key);
        }
        self.released.notify_all();
    }
}

#[derive(Debug, Default)]
struct Sequence(u64);

impl Sequence {
    fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default)]
struct Tables {
    libraries: BTreeMap<u64, Library>,
    users: BTreeMap<u64, User>,
    books: BTreeMap<u64, BookInventory>,
    requests: BTreeMap<u64, RequestEvent>,
    loans: BTreeMap<u64, IssueRegistry>,

    library_seq: Sequence,
    user_seq: Sequence,
    book_seq: Sequence,
    request_seq: Sequence,
    loan_seq: Sequence,
}

/// 되돌리기 기록. 변경 이전 값을 가진다. (`None`은 존재하지 않았음)
#[derive(Debug)]
enum Undo {
    Library(u64, Option<Library>),
    User(u64, Option<User>),
    Book(u64, Option<BookInventory>),
    Request(u64, Option<RequestEvent>),
    Loan(u64, Option<IssueRegistry>),
}

fn restore<V>(table: &mut BTreeMap<u64, V>, id: u64, previous: Option<V>) {
    match previous {
        Some(v) => table.insert(id, v),
        None => table.remove(&id),
    };
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    locks: KeyLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Session) -> Result<T>
    {
        let mut session = MemorySession::new(self);
        let result = f(&mut session);
        if result.is_ok() {
            session.commit();
        }
        result
    }
}

struct MemorySession<'s> {
    store: &'s MemoryStore,
    held: Vec<LockKey>,
    undo: Vec<Undo>,
    committed: bool,
}

impl <'s> MemorySession<'s> {
    fn new(store: &'s MemoryStore) -> Self {
        Self { store, held: Vec::new(), undo: Vec::new(), committed: false }
    }

    fn lock(&mut self, key: LockKey) {
        if !self.held.contains(&key) {
            self.store.locks.acquire(key);
            self.held.push(key);
        }
    }

    fn commit(&mut self) {
        self.undo.clear();
        self.committed = true;
    }

    fn rollback(&mut self) {
        let mut tables = self.store.tables();
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Library(id, previous) => restore(&mut tables.libraries, id, previous),
                Undo::User(id, previous) => restore(&mut tables.users, id, previous),
                Undo::Book(id, previous) => restore(&mut tables.books, id, previous),
                Undo::Request(id, previous) => restore(&mut tables.requests, id, previous),
                Undo::Loan(id, previous) => restore(&mut tables.loans, id, previous),
            }
        }
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
        self.store.locks.release(&self.held);
    }
}

fn missing(entity: &str, id: u64) -> CirculationError {
    CirculationError::NotFound(format!("{} {} does not exist", entity, id))
}

impl Session for MemorySession<'_> {
    fn insert_library(&mut self, name: &str) -> Result<Library> {
        let mut tables = self.store.tables();
        if tables.libraries.values().any(|l| l.name == name) {
            return Err(CirculationError::Conflict(format!("library {} already exists", name)));
        }
        let library = Library { id: tables.library_seq.next(), name: name.to_owned() };
        tables.libraries.insert(library.id, library.clone());
        self.undo.push(Undo::Library(library.id, None));
        Ok(library)
    }

    fn find_library(&mut self, id: u64) -> Result<Option<Library>> {
        Ok(self.store.tables().libraries.get(&id).cloned())
    }

    fn find_library_by_name(&mut self, name: &str) -> Result<Option<Library>> {
        Ok(self.store.tables().libraries.values().find(|l| l.name == name).cloned())
    }

    fn lock_library(&mut self, id: u64) -> Result<Option<Library>> {
        self.lock(LockKey::Library(id));
        self.find_library(id)
    }

    fn insert_user(&mut self, user: &NewUser) -> Result<User> {
        let mut tables = self.store.tables();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(CirculationError::Conflict(format!("email {} already in use", user.email)));
        }
        let user = User {
            id: tables.user_seq.next(),
            name: user.name.clone(),
            email: user.email.clone(),
            contact_number: user.contact_number.clone(),
            role: user.role,
            library_id: user.library_id,
        };
        tables.users.insert(user.id, user.clone());
        self.undo.push(Undo::User(user.id, None));
        Ok(user)
    }

    fn find_user(&mut self, id: u64) -> Result<Option<User>> {
        Ok(self.store.tables().users.get(&id).cloned())
    }

    fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        Ok(self.store.tables().users.values().find(|u| u.email == email).cloned())
    }

    fn find_users(&mut self, library_id: u64, role: Role) -> Result<Vec<User>> {
        Ok(self.store.tables().users.values()
            .filter(|u| u.library_id == library_id && u.role == role)
            .cloned()
            .collect())
    }

    fn insert_book(&mut self, book: &NewBook) -> Result<BookInventory> {
        let mut tables = self.store.tables();
        if tables.books.values().any(|b| b.library_id == book.library_id && b.fields.title == book.fields.title) {
            return Err(CirculationError::Conflict(format!("book {} already exists", book.fields.title)));
        }
        let book = BookInventory {
            isbn: tables.book_seq.next(),
            library_id: book.library_id,
            fields: book.fields.clone(),
            total_copies: book.copies,
            available_copies: book.copies,
        };
        tables.books.insert(book.isbn, book.clone());
        self.undo.push(Undo::Book(book.isbn, None));
        Ok(book)
    }

    fn find_book(&mut self, isbn: u64) -> Result<Option<BookInventory>> {
        Ok(self.store.tables().books.get(&isbn).cloned())
    }

    fn lock_book(&mut self, isbn: u64) -> Result<Option<BookInventory>> {
        self.lock(LockKey::Book(isbn));
        self.find_book(isbn)
    }

    fn find_book_by_title(&mut self, library_id: u64, title: &str) -> Result<Option<BookInventory>> {
        Ok(self.store.tables().books.values()
            .find(|b| b.library_id == library_id && b.fields.title == title)
            .cloned())
    }

    fn find_books(&mut self, filter: &BookFilter) -> Result<Vec<BookInventory>> {
        let tables = self.store.tables();
        let books = tables.books.values()
            .filter(|b| match filter {
                BookFilter::All => true,
                BookFilter::Library(library_id) => b.library_id == *library_id,
                BookFilter::Query(q) => {
                    b.fields.title == *q || b.fields.publisher == *q || b.fields.authors.contains(q)
                }
            })
            .cloned()
            .collect();
        Ok(books)
    }

    fn update_book(&mut self, book: &BookInventory) -> Result<()> {
        let mut tables = self.store.tables();
        if !tables.books.contains_key(&book.isbn) {
            return Err(missing("book", book.isbn));
        }
        let previous = tables.books.insert(book.isbn, book.clone());
        self.undo.push(Undo::Book(book.isbn, previous));
        Ok(())
    }

    fn delete_book(&mut self, isbn: u64) -> Result<()> {
        let previous = self.store.tables().books.remove(&isbn)
            .ok_or_else(|| missing("book", isbn))?;
        self.undo.push(Undo::Book(isbn, Some(previous)));
        Ok(())
    }

    fn insert_request(&mut self, request: &NewRequestEvent) -> Result<RequestEvent> {
        let mut tables = self.store.tables();
        let request = RequestEvent {
            req_id: tables.request_seq.next(),
            book_id: request.book_id,
            reader_id: request.reader_id,
            request_type: request.request_type,
            status: RequestStatus::Pending,
            request_date: request.request_date,
            approver_id: None,
            approval_date: None,
        };
        tables.requests.insert(request.req_id, request.clone());
        self.undo.push(Undo::Request(request.req_id, None));
        Ok(request)
    }

    fn find_request(&mut self, req_id: u64) -> Result<Option<RequestEvent>> {
        Ok(self.store.tables().requests.get(&req_id).cloned())
    }

    fn lock_request(&mut self, req_id: u64) -> Result<Option<RequestEvent>> {
        // 요청의 변경은 항상 대상 도서 잠금 아래에서만 일어난다.
        self.find_request(req_id)
    }

    fn find_requests(&mut self, filter: &RequestFilter) -> Result<Vec<RequestEvent>> {
        let tables = self.store.tables();
        let requests = tables.requests.values()
            .filter(|r| match filter {
                RequestFilter::Reader(reader_id) => r.reader_id == *reader_id,
                RequestFilter::Library(library_id) => tables.books.get(&r.book_id)
                    .map(|b| b.library_id == *library_id)
                    .unwrap_or(false),
                RequestFilter::Pending { book_id, reader_id, request_type } => {
                    r.book_id == *book_id
                        && r.reader_id == *reader_id
                        && r.request_type == *request_type
                        && r.status == RequestStatus::Pending
                }
            })
            .cloned()
            .collect();
        Ok(requests)
    }

    fn update_request(&mut self, request: &RequestEvent) -> Result<()> {
        let mut tables = self.store.tables();
        if !tables.requests.contains_key(&request.req_id) {
            return Err(missing("request event", request.req_id));
        }
        let previous = tables.requests.insert(request.req_id, request.clone());
        self.undo.push(Undo::Request(request.req_id, previous));
        Ok(())
    }

    fn insert_loan(&mut self, loan: &NewLoan) -> Result<IssueRegistry> {
        let mut tables = self.store.tables();
        let loan = IssueRegistry {
            issue_id: tables.loan_seq.next(),
            isbn: loan.isbn,
            reader_id: loan.reader_id,
            issue_approver_id: loan.issue_approver_id,
            issue_status: IssueStatus::Issued,
            issue_date: loan.issue_date,
            expected_return_date: loan.expected_return_date,
            return_date: None,
            return_approver_id: None,
        };
        tables.loans.insert(loan.issue_id, loan.clone());
        self.undo.push(Undo::Loan(loan.issue_id, None));
        Ok(loan)
    }

    fn find_loans(&mut self, filter: &LoanFilter) -> Result<Vec<IssueRegistry>> {
        let tables = self.store.tables();
        let loans = tables.loans.values()
            .filter(|l| match filter {
                LoanFilter::Reader(reader_id) => l.reader_id == *reader_id,
                LoanFilter::IssueApprover(approver_id) => l.issue_approver_id == *approver_id,
                LoanFilter::Library(library_id) => tables.books.get(&l.isbn)
                    .map(|b| b.library_id == *library_id)
                    .unwrap_or(false),
                LoanFilter::Open { isbn, reader_id, issue_approver_id } => {
                    l.isbn == *isbn
                        && l.reader_id == *reader_id
                        && l.issue_status == IssueStatus::Issued
                        && issue_approver_id.map(|id| id == l.issue_approver_id).unwrap_or(true)
                }
            })
            .cloned()
            .collect();
        Ok(loans)
    }

    fn update_loan(&mut self, loan: &IssueRegistry) -> Result<()> {
        let mut tables = self.store.tables();
        if !tables.loans.contains_key(&loan.issue_id) {
            return Err(missing("issue registry", loan.issue_id));
        }
        let previous = tables.loans.insert(loan.issue_id, loan.clone());
        self.undo.push(Undo::Loan(loan.issue_id, previous));
        Ok(())
    }
}
