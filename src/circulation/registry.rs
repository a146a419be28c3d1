//! 대출 기록부

use crate::circulation::{CirculationError, IssueRegistry, IssueStatus, LoanFilter, NewLoan, Result, Role, Session, User};

/// 반납 되지 않은 (도서, 독자) 쌍의 대출 기록
pub fn open_loan_of(session: &mut dyn Session, isbn: u64, reader_id: u64) -> Result<Option<IssueRegistry>> {
    let filter = LoanFilter::Open { isbn, reader_id, issue_approver_id: None };
    Ok(session.find_loans(&filter)?.into_iter().next())
}

/// 대출 승인시 대출 기록을 생성한다. 반납 예정일은 `now + loan_period`
pub fn open_loan(
    session: &mut dyn Session,
    isbn: u64,
    reader_id: u64,
    approver_id: u64,
    now: chrono::NaiveDateTime,
    loan_period: chrono::Duration,
) -> Result<IssueRegistry> {
    if open_loan_of(session, isbn, reader_id)?.is_some() {
        return Err(CirculationError::Conflict(format!(
            "book {} is already issued to reader {}", isbn, reader_id
        )));
    }
    let expected_return_date = now.checked_add_signed(loan_period)
        .ok_or_else(|| CirculationError::InvalidArgument("loan period out of range".to_owned()))?;

    session.insert_loan(&NewLoan {
        isbn,
        reader_id,
        issue_approver_id: approver_id,
        issue_date: now,
        expected_return_date,
    })
}

/// 반납 승인시 대출 기록을 닫는다.
///
/// 대출을 승인했던 관리자(`approver_id`)와 일치하는 반납 되지 않은 기록만 닫을 수 있다.
pub fn close_loan(session: &mut dyn Session, isbn: u64, reader_id: u64, approver_id: u64, now: chrono::NaiveDateTime) -> Result<IssueRegistry> {
    let filter = LoanFilter::Open { isbn, reader_id, issue_approver_id: Some(approver_id) };
    let mut loan = session.find_loans(&filter)?
        .into_iter()
        .next()
        .ok_or_else(|| CirculationError::NotFound(format!(
            "no open issue registry for book {} and reader {} approved by {}", isbn, reader_id, approver_id
        )))?;

    loan.return_date = Some(now);
    loan.return_approver_id = Some(approver_id);
    loan.issue_status = IssueStatus::Returned;
    session.update_loan(&loan)?;
    Ok(loan)
}

/// 사용자가 볼 수 있는 대출 기록 목록
///
/// 독자는 자신의 대출 기록을, 관리자는 자신이 승인한 대출 기록을 본다.
/// 소유자는 소속 도서관 도서의 대출 기록을 본다.
pub fn list_for_user(session: &mut dyn Session, user: &User) -> Result<Vec<IssueRegistry>> {
    let filter = match user.role {
        Role::Reader => LoanFilter::Reader(user.id),
        Role::Admin => LoanFilter::IssueApprover(user.id),
        Role::Owner => LoanFilter::Library(user.library_id),
    };
    session.find_loans(&filter)
}
