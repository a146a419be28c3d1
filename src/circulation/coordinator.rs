//! 대출 상태 머신
//!
//! (도서, 독자) 쌍의 상태는 요청 로그와 대출 기록부에서 유도된다.
//!
//! ```text
//! Idle -> IssueRequested -> Issued -> ReturnRequested -> Idle
//!              |  reject                   |  reject
//!              v                           v
//!             Idle                       Issued
//! ```
//!
//! 둘 이상의 엔티티를 함께 변경하는 작업은 [`Coordinator`]에서만 실행되며,
//! 각 전이는 하나의 [`Store::transaction`] 안에서 실행되어 중간에 실패하면 모두 롤백 된다.

use crate::circulation::inventory::Removal;
use crate::circulation::request::Decision;
use crate::circulation::{
    inventory, membership, notify_best_effort, registry, request, BookFields, BookInventory, CirculationError,
    IssueRegistry, Library, LogNotifier, Notice, Notifier, RequestEvent, RequestType, Result, Role, Session, Store,
    User,
};
use serde::Serialize;
use tracing::info;

/// 기본 대출 기간(일)
pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 7;

/// (도서, 독자) 쌍의 유도된 대출 상태
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum PairState {
    Idle,
    IssueRequested,
    Issued,
    ReturnRequested,
}

/// 요청 처리 결과
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Resolution {
    pub request: RequestEvent,

    /// 승인으로 생성되거나 닫힌 대출 기록
    pub loan: Option<IssueRegistry>,

    /// 승인으로 변경된 도서 재고
    pub book: Option<BookInventory>,
}

pub struct Coordinator<S>
where
    S: Store
{
    store: S,
    notifier: Box<dyn Notifier>,
    loan_period: chrono::Duration,
}

impl <S: Store> Coordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifier: Box::new(LogNotifier),
            loan_period: chrono::Duration::days(DEFAULT_LOAN_PERIOD_DAYS as i64),
        }
    }

    pub fn with_notifier<N>(mut self, notifier: N) -> Self
    where
        N: Notifier + 'static
    {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_loan_period(mut self, days: u32) -> Self {
        self.loan_period = chrono::Duration::days(days as i64);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn now() -> chrono::NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

fn locked_book(session: &mut dyn Session, isbn: u64) -> Result<BookInventory> {
    session.lock_book(isbn)?
        .ok_or_else(|| CirculationError::NotFound(format!("book {} does not exist", isbn)))
}

/// 독자가 도서와 같은 도서관 소속인지 확인한다.
fn authorize_reader(user: &User, book: &BookInventory) -> Result<()> {
    match user.role {
        Role::Reader if user.library_id == book.library_id => Ok(()),
        Role::Reader => Err(CirculationError::Forbidden("book belongs to another library".to_owned())),
        Role::Admin | Role::Owner => Err(CirculationError::Forbidden("only readers can request books".to_owned())),
    }
}

/// 승인자가 도서와 같은 도서관의 관리자인지 확인한다.
fn authorize_approver(user: &User, book: &BookInventory) -> Result<()> {
    match user.role {
        Role::Admin if user.library_id == book.library_id => Ok(()),
        Role::Admin => Err(CirculationError::Forbidden("book belongs to another library".to_owned())),
        Role::Owner | Role::Reader => Err(CirculationError::Forbidden("only admins can resolve requests".to_owned())),
    }
}

// 재고
impl <S: Store> Coordinator<S> {

    /// 도서관에 도서를 들여온다. 같은 제목이 있으면 사본만 추가된다.
    pub fn acquire_title(&self, library_id: u64, fields: &BookFields, copies: u32) -> Result<BookInventory> {
        let book = self.store.transaction(|session| inventory::acquire(session, library_id, fields, copies))?;
        info!(isbn = book.isbn, library_id, copies, "book acquired");
        Ok(book)
    }

    pub fn add_copies(&self, isbn: u64, copies: u32) -> Result<BookInventory> {
        let book = self.store.transaction(|session| inventory::add_copies(session, isbn, copies))?;
        info!(isbn, copies, "copies added");
        Ok(book)
    }

    pub fn remove_copy(&self, isbn: u64) -> Result<Removal> {
        let removal = self.store.transaction(|session| inventory::remove_copy(session, isbn))?;
        info!(isbn, "copy removed: {:?}", removal);
        Ok(removal)
    }

    pub fn update_book(&self, isbn: u64, fields: &BookFields, add_copies: u32) -> Result<BookInventory> {
        let book = self.store.transaction(|session| inventory::update_metadata(session, isbn, fields, add_copies))?;
        info!(isbn, add_copies, "book updated");
        Ok(book)
    }

    pub fn book(&self, isbn: u64) -> Result<BookInventory> {
        self.store.transaction(|session| {
            session.find_book(isbn)?
                .ok_or_else(|| CirculationError::NotFound(format!("book {} does not exist", isbn)))
        })
    }

    pub fn books_of_library(&self, library_id: u64) -> Result<Vec<BookInventory>> {
        self.store.transaction(|session| inventory::books_of_library(session, library_id))
    }

    pub fn search_books(&self, query: &str) -> Result<Vec<BookInventory>> {
        self.store.transaction(|session| inventory::search(session, query))
    }
}

// 요청과 대출
impl <S: Store> Coordinator<S> {

    /// Idle -> IssueRequested
    pub fn submit_issue_request(&self, reader_id: u64, isbn: u64) -> Result<RequestEvent> {
        let event = self.store.transaction(|session| {
            let reader = membership::user(session, reader_id)?;
            let book = locked_book(session, isbn)?;
            authorize_reader(&reader, &book)?;
            request::submit_issue(session, &reader, &book, Self::now())
        })?;
        info!(req_id = event.req_id, isbn, reader_id, "issue requested");
        Ok(event)
    }

    /// Issued -> ReturnRequested
    pub fn submit_return_request(&self, reader_id: u64, isbn: u64) -> Result<RequestEvent> {
        let event = self.store.transaction(|session| {
            let reader = membership::user(session, reader_id)?;
            let book = locked_book(session, isbn)?;
            authorize_reader(&reader, &book)?;
            request::submit_return(session, &reader, &book, Self::now())
        })?;
        info!(req_id = event.req_id, isbn, reader_id, "return requested");
        Ok(event)
    }

    /// 대기 중인 요청을 승인하거나 거절한다.
    ///
    /// - 대출 승인: 요청 승인, 사본 예약, 대출 기록 생성
    /// - 반납 승인: 요청 승인, 대출 기록 종료, 사본 반환
    /// - 거절: 요청 상태만 변경
    pub fn resolve(&self, req_id: u64, approver_id: u64, decision: Decision) -> Result<Resolution> {
        let resolution = self.store.transaction(|session| {
            let event = session.find_request(req_id)?
                .ok_or_else(|| CirculationError::NotFound(format!("request event {} does not exist", req_id)))?;
            let approver = membership::user(session, approver_id)?;

            let book = locked_book(session, event.book_id)?;
            let event = session.lock_request(req_id)?
                .ok_or_else(|| CirculationError::NotFound(format!("request event {} does not exist", req_id)))?;
            authorize_approver(&approver, &book)?;

            let now = Self::now();
            let (isbn, reader_id) = (event.book_id, event.reader_id);
            let request_type = event.request_type;
            let resolved = request::resolve(session, event, &approver, decision, now)?;

            match (request_type, decision) {
                (RequestType::Issue, Decision::Approve) => {
                    let book = inventory::reserve(session, isbn)?;
                    let loan = registry::open_loan(session, isbn, reader_id, approver.id, now, self.loan_period)?;
                    Ok(Resolution { request: resolved, loan: Some(loan), book: Some(book) })
                }
                (RequestType::Return, Decision::Approve) => {
                    let loan = registry::close_loan(session, isbn, reader_id, approver.id, now)?;
                    let book = inventory::release(session, isbn)?;
                    Ok(Resolution { request: resolved, loan: Some(loan), book: Some(book) })
                }
                (_, Decision::Reject) => Ok(Resolution { request: resolved, loan: None, book: None }),
            }
        })?;

        let request = &resolution.request;
        info!(
            req_id,
            approver_id,
            isbn = request.book_id,
            reader_id = request.reader_id,
            "{} request {}", request.request_type, request.status
        );
        notify_best_effort(self.notifier.as_ref(), request.reader_id, Notice::RequestResolved {
            req_id,
            request_type: request.request_type,
            status: request.status,
        });
        Ok(resolution)
    }

    pub fn approve(&self, req_id: u64, approver_id: u64) -> Result<Resolution> {
        self.resolve(req_id, approver_id, Decision::Approve)
    }

    pub fn reject(&self, req_id: u64, approver_id: u64) -> Result<Resolution> {
        self.resolve(req_id, approver_id, Decision::Reject)
    }

    pub fn requests_for(&self, user_id: u64) -> Result<Vec<RequestEvent>> {
        self.store.transaction(|session| {
            let user = membership::user(session, user_id)?;
            request::list_for_user(session, &user)
        })
    }

    pub fn loans_for(&self, user_id: u64) -> Result<Vec<IssueRegistry>> {
        self.store.transaction(|session| {
            let user = membership::user(session, user_id)?;
            registry::list_for_user(session, &user)
        })
    }

    /// (도서, 독자) 쌍의 현재 상태
    pub fn pair_state(&self, isbn: u64, reader_id: u64) -> Result<PairState> {
        self.store.transaction(|session| {
            if request::pending(session, isbn, reader_id, RequestType::Return)?.is_some() {
                return Ok(PairState::ReturnRequested);
            }
            if registry::open_loan_of(session, isbn, reader_id)?.is_some() {
                return Ok(PairState::Issued);
            }
            if request::pending(session, isbn, reader_id, RequestType::Issue)?.is_some() {
                return Ok(PairState::IssueRequested);
            }
            Ok(PairState::Idle)
        })
    }
}

// 도서관과 사용자
impl <S: Store> Coordinator<S> {

    pub fn resolve_user(&self, identifier: &str) -> Result<User> {
        self.store.transaction(|session| membership::resolve_user(session, identifier))
    }

    pub fn register_library(&self, name: &str, owner_email: &str) -> Result<(Library, User)> {
        let (library, owner) = self.store.transaction(|session| membership::register_library(session, name, owner_email))?;
        info!(library_id = library.id, owner_id = owner.id, "library registered");
        notify_best_effort(self.notifier.as_ref(), owner.id, Notice::LibraryRegistered {
            library: library.name.clone(),
        });
        Ok((library, owner))
    }

    pub fn onboard_admin(&self, owner_id: u64, email: &str) -> Result<User> {
        let (library, admin) = self.store.transaction(|session| {
            let owner = membership::user(session, owner_id)?;
            membership::onboard_admin(session, &owner, email)
        })?;
        info!(library_id = library.id, admin_id = admin.id, "admin onboarded");
        notify_best_effort(self.notifier.as_ref(), admin.id, Notice::Onboarded {
            role: Role::Admin,
            library: library.name,
        });
        Ok(admin)
    }

    pub fn onboard_reader(&self, onboarder_id: u64, email: &str) -> Result<User> {
        let (library, reader) = self.store.transaction(|session| {
            let onboarder = membership::user(session, onboarder_id)?;
            membership::onboard_reader(session, &onboarder, email)
        })?;
        info!(library_id = library.id, reader_id = reader.id, "reader onboarded");
        notify_best_effort(self.notifier.as_ref(), reader.id, Notice::Onboarded {
            role: Role::Reader,
            library: library.name,
        });
        Ok(reader)
    }

    pub fn admins_of(&self, user_id: u64) -> Result<Vec<User>> {
        self.members_of(user_id, Role::Admin)
    }

    pub fn readers_of(&self, user_id: u64) -> Result<Vec<User>> {
        self.members_of(user_id, Role::Reader)
    }

    fn members_of(&self, user_id: u64, role: Role) -> Result<Vec<User>> {
        self.store.transaction(|session| {
            let user = membership::user(session, user_id)?;
            membership::members(session, &user, role)
        })
    }
}
