//! 도서 재고 원장
//!
//! 도서관별 도서의 전체/대출 가능 사본 수를 관리한다.
//! 여기 있는 함수들은 모두 이미 열린 트랜잭션의 [`Session`] 위에서 동작하며 도서 재고만 변경한다.

use crate::circulation::{BookFields, BookFilter, BookInventory, CirculationError, NewBook, Result, Session};
use serde::Serialize;
use tracing::{error, warn};

/// [`remove_copy`]의 결과
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub enum Removal {
    /// 서가에 있던 사본 하나를 제거함
    Decremented(BookInventory),

    /// 마지막 사본을 제거하여 재고 자체를 삭제함
    Deleted(u64),
}

impl BookInventory {
    /// 전체/대출 가능 사본 수의 불변식을 확인한다.
    pub fn check_invariant(&self) -> Result<()> {
        if self.available_copies > self.total_copies {
            return Err(invariant_violation(self, "available copies exceed total copies"));
        }
        Ok(())
    }

    /// 전체/대출 가능 사본 수를 함께 늘린다.
    pub(crate) fn add_copies(&mut self, count: u32) -> Result<()> {
        let total = self.total_copies.checked_add(count);
        let available = self.available_copies.checked_add(count);
        match (total, available) {
            (Some(total), Some(available)) => {
                self.total_copies = total;
                self.available_copies = available;
                self.check_invariant()
            }
            _ => Err(invariant_violation(self, "copy count overflow")),
        }
    }

    /// 대출 가능한 사본 하나를 예약한다.
    pub(crate) fn reserve(&mut self) -> Result<()> {
        if self.available_copies == 0 {
            return Err(CirculationError::Unavailable(format!("book {} is not available", self.isbn)));
        }
        self.available_copies -= 1;
        self.check_invariant()
    }

    /// 반납된 사본 하나를 대출 가능 상태로 되돌린다.
    /// 전체 사본 수를 넘게 되는 경우는 같은 대출을 두 번 반납한 것으로 보고 값을 보정하지 않고 실패한다.
    pub(crate) fn release(&mut self) -> Result<()> {
        if self.available_copies >= self.total_copies {
            return Err(invariant_violation(self, "release would exceed total copies"));
        }
        self.available_copies += 1;
        self.check_invariant()
    }
}

fn invariant_violation(book: &BookInventory, message: &str) -> CirculationError {
    error!(
        isbn = book.isbn,
        total = book.total_copies,
        available = book.available_copies,
        "inventory invariant violated: {}", message
    );
    CirculationError::InvariantViolation(format!("{} (isbn: {})", message, book.isbn))
}

fn require_copies(count: u32) -> Result<()> {
    if count == 0 {
        return Err(CirculationError::InvalidArgument("copies must be greater than 0".to_owned()));
    }
    Ok(())
}

fn locked_book(session: &mut dyn Session, isbn: u64) -> Result<BookInventory> {
    session.lock_book(isbn)?
        .ok_or_else(|| CirculationError::NotFound(format!("book inventory {} does not exist", isbn)))
}

/// 도서관에 도서를 들여온다.
///
/// 같은 제목의 도서가 이미 있으면 전체/대출 가능 사본 수를 `count`만큼 늘리고,
/// 없으면 `count`개의 사본을 가진 새 재고를 만든다.
pub fn acquire(session: &mut dyn Session, library_id: u64, fields: &BookFields, count: u32) -> Result<BookInventory> {
    require_copies(count)?;
    session.lock_library(library_id)?
        .ok_or_else(|| CirculationError::NotFound(format!("library {} does not exist", library_id)))?;

    let exists = session.find_book_by_title(library_id, &fields.title)?;
    match exists {
        Some(book) => add_copies(session, book.isbn, count),
        None => session.insert_book(&NewBook {
            library_id,
            fields: fields.clone(),
            copies: count,
        }),
    }
}

/// 이미 있는 도서 재고에 사본을 추가한다.
pub fn add_copies(session: &mut dyn Session, isbn: u64, count: u32) -> Result<BookInventory> {
    require_copies(count)?;
    let mut book = locked_book(session, isbn)?;
    book.add_copies(count)?;
    session.update_book(&book)?;
    Ok(book)
}

/// 사본 하나를 제거한다.
///
/// - 전체와 대출 가능 사본이 모두 1보다 많으면 서가의 사본 하나를 제거한다.
/// - 전체 사본이 1보다 많지만 대출 가능 사본이 1 이하면 대출 중인 사본은 제거할 수 없으므로 실패한다.
/// - 전체 사본이 1개고 서가에 있으면 재고 자체를 삭제한다.
/// - 하나뿐인 사본이 대출 중이면 반납 처리가 불가능해지므로 삭제하지 않고 실패한다.
pub fn remove_copy(session: &mut dyn Session, isbn: u64) -> Result<Removal> {
    let mut book = locked_book(session, isbn)?;

    if book.total_copies > 1 && book.available_copies > 1 {
        book.total_copies -= 1;
        book.available_copies -= 1;
        book.check_invariant()?;
        session.update_book(&book)?;
        Ok(Removal::Decremented(book))
    } else if book.total_copies > 1 || book.available_copies == 0 {
        warn!(isbn, total = book.total_copies, available = book.available_copies, "cannot remove a copy on loan");
        Err(CirculationError::Conflict("issued books cannot be removed".to_owned()))
    } else {
        session.delete_book(isbn)?;
        Ok(Removal::Deleted(isbn))
    }
}

/// 대출 승인시 사본 하나를 예약한다.
pub fn reserve(session: &mut dyn Session, isbn: u64) -> Result<BookInventory> {
    let mut book = locked_book(session, isbn)?;
    book.reserve()?;
    session.update_book(&book)?;
    Ok(book)
}

/// 반납 승인시 사본 하나를 되돌린다.
pub fn release(session: &mut dyn Session, isbn: u64) -> Result<BookInventory> {
    let mut book = locked_book(session, isbn)?;
    book.release()?;
    session.update_book(&book)?;
    Ok(book)
}

/// 서지 정보를 교체하고 `add_copies`만큼 사본을 추가한다.
/// 사본 수는 교체가 아닌 기존 수량에 더해진다.
pub fn update_metadata(session: &mut dyn Session, isbn: u64, fields: &BookFields, add_copies: u32) -> Result<BookInventory> {
    let mut book = locked_book(session, isbn)?;
    book.fields = fields.clone();
    book.add_copies(add_copies)?;
    session.update_book(&book)?;
    Ok(book)
}

pub fn books_of_library(session: &mut dyn Session, library_id: u64) -> Result<Vec<BookInventory>> {
    session.find_library(library_id)?
        .ok_or_else(|| CirculationError::NotFound(format!("library {} does not exist", library_id)))?;
    session.find_books(&BookFilter::Library(library_id))
}

/// 제목, 출판사, 저자로 도서를 검색한다. 빈 검색어는 모든 도서를 반환한다.
pub fn search(session: &mut dyn Session, query: &str) -> Result<Vec<BookInventory>> {
    let query = query.trim();
    if query.is_empty() {
        session.find_books(&BookFilter::All)
    } else {
        session.find_books(&BookFilter::Query(query.to_owned()))
    }
}
