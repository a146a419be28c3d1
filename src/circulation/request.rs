//! 대출/반납 요청 이벤트 로그

use crate::circulation::{BookInventory, CirculationError, LoanFilter, NewRequestEvent, RequestEvent, RequestFilter, RequestStatus, RequestType, Result, Role, Session, User};

/// 관리자의 요청 처리 결정
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn status(&self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

/// (도서, 독자) 쌍의 대기 중인 요청을 찾는다.
pub fn pending(session: &mut dyn Session, book_id: u64, reader_id: u64, request_type: RequestType) -> Result<Option<RequestEvent>> {
    let filter = RequestFilter::Pending { book_id, reader_id, request_type };
    Ok(session.find_requests(&filter)?.into_iter().next())
}

fn has_open_loan(session: &mut dyn Session, isbn: u64, reader_id: u64) -> Result<bool> {
    let filter = LoanFilter::Open { isbn, reader_id, issue_approver_id: None };
    Ok(!session.find_loans(&filter)?.is_empty())
}

/// 대출 요청을 생성한다. 호출 전에 `book`은 잠겨 있어야 한다.
///
/// 대기 중인 대출 요청이 있거나, 승인되어 아직 반납되지 않은 대출이 있으면 중복 요청으로 실패한다.
pub fn submit_issue(session: &mut dyn Session, reader: &User, book: &BookInventory, now: chrono::NaiveDateTime) -> Result<RequestEvent> {
    if pending(session, book.isbn, reader.id, RequestType::Issue)?.is_some()
        || has_open_loan(session, book.isbn, reader.id)? {
        return Err(CirculationError::Conflict("you have already requested this book".to_owned()));
    }
    if book.available_copies == 0 {
        return Err(CirculationError::Unavailable("book is not available".to_owned()));
    }

    session.insert_request(&NewRequestEvent {
        book_id: book.isbn,
        reader_id: reader.id,
        request_type: RequestType::Issue,
        request_date: now,
    })
}

/// 반납 요청을 생성한다. 호출 전에 `book`은 잠겨 있어야 한다.
///
/// 승인되어 반납 되지 않은 대출이 있어야 하며, 대기 중인 반납 요청이 있으면 실패한다.
pub fn submit_return(session: &mut dyn Session, reader: &User, book: &BookInventory, now: chrono::NaiveDateTime) -> Result<RequestEvent> {
    if !has_open_loan(session, book.isbn, reader.id)? {
        return Err(CirculationError::Conflict("you cannot return a book that has not been issued".to_owned()));
    }
    if pending(session, book.isbn, reader.id, RequestType::Return)?.is_some() {
        return Err(CirculationError::Conflict("you have already requested to return this book".to_owned()));
    }

    session.insert_request(&NewRequestEvent {
        book_id: book.isbn,
        reader_id: reader.id,
        request_type: RequestType::Return,
        request_date: now,
    })
}

/// 요청의 상태를 변경한다. 이미 처리된 요청은 다시 처리할 수 없다.
/// 승인일 경우 승인자와 승인 일시를 함께 기록한다.
pub fn resolve(session: &mut dyn Session, mut request: RequestEvent, approver: &User, decision: Decision, now: chrono::NaiveDateTime) -> Result<RequestEvent> {
    if !request.is_pending() {
        return Err(CirculationError::Conflict(format!(
            "request event {} already resolved as {}", request.req_id, request.status
        )));
    }

    request.status = decision.status();
    if decision == Decision::Approve {
        request.approver_id = Some(approver.id);
        request.approval_date = Some(now);
    }
    session.update_request(&request)?;
    Ok(request)
}

/// 사용자가 볼 수 있는 요청 목록
///
/// 독자는 자신의 요청만, 관리자와 소유자는 소속 도서관 도서에 대한 요청을 본다.
pub fn list_for_user(session: &mut dyn Session, user: &User) -> Result<Vec<RequestEvent>> {
    let filter = match user.role {
        Role::Reader => RequestFilter::Reader(user.id),
        Role::Admin | Role::Owner => RequestFilter::Library(user.library_id),
    };
    session.find_requests(&filter)
}
