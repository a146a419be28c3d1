use crate::circulation::repo::diesel::schema;
use crate::circulation::{
    BookFields, BookInventory, IssueRegistry, IssueStatus, Library, NewBook, NewLoan, NewRequestEvent, NewUser,
    CirculationError, RequestEvent, RequestStatus, RequestType, Result, Role, User,
};
use chrono::NaiveDateTime;
use diesel::{AsChangeset, Identifiable, Insertable, Queryable, Selectable};

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = schema::library)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LibraryEntity {
    pub id: i64,
    pub name: String,
}

impl LibraryEntity {
    pub fn to_domain(self) -> Library {
        Library {
            id: self.id as u64,
            name: self.name,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::library)]
pub struct NewLibraryEntity<'a> {
    pub name: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub contact_number: String,
    pub role: String,
    pub lib_id: i64,
}

impl UserEntity {
    pub fn to_domain(self) -> Result<User> {
        Ok(User {
            id: self.id as u64,
            role: Role::try_from(self.role.as_str())?,
            name: self.name,
            email: self.email,
            contact_number: self.contact_number,
            library_id: self.lib_id as u64,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::users)]
pub struct NewUserEntity<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub contact_number: &'a str,
    pub role: &'a str,
    pub lib_id: i64,
}

impl <'a> NewUserEntity<'a> {
    pub fn new(user: &'a NewUser) -> Self {
        Self {
            name: &user.name,
            email: &user.email,
            contact_number: &user.contact_number,
            role: user.role.to_code_str(),
            lib_id: user.library_id as i64,
        }
    }
}

/// 사본 수는 `INTEGER` 컬럼에 저장 되므로 `i32` 범위를 넘을 수 없다.
fn copies_column(count: u32) -> Result<i32> {
    i32::try_from(count)
        .map_err(|_| CirculationError::InvalidArgument(format!("copy count {} is too large", count)))
}

/// 도서 재고 모델
#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = schema::book_inventory)]
#[diesel(primary_key(isbn))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookEntity {
    pub isbn: i64,
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: String,
    pub version: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub lib_id: i64,
}

impl BookEntity {
    pub fn to_domain(self) -> BookInventory {
        BookInventory {
            isbn: self.isbn as u64,
            library_id: self.lib_id as u64,
            fields: BookFields {
                title: self.title,
                authors: self.authors,
                publisher: self.publisher,
                version: self.version,
            },
            total_copies: self.total_copies as u32,
            available_copies: self.available_copies as u32,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::book_inventory)]
pub struct NewBookEntity<'a> {
    pub title: &'a str,
    pub authors: Vec<String>,
    pub publisher: &'a str,
    pub version: &'a str,
    pub total_copies: i32,
    pub available_copies: i32,
    pub lib_id: i64,
}

impl <'a> NewBookEntity<'a> {
    pub fn new(book: &'a NewBook) -> Result<Self> {
        let copies = copies_column(book.copies)?;
        Ok(Self {
            title: &book.fields.title,
            authors: book.fields.authors.clone(),
            publisher: &book.fields.publisher,
            version: &book.fields.version,
            total_copies: copies,
            available_copies: copies,
            lib_id: book.library_id as i64,
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = schema::book_inventory)]
pub struct BookForm<'a> {
    pub title: &'a str,
    pub authors: Vec<String>,
    pub publisher: &'a str,
    pub version: &'a str,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl <'a> BookForm<'a> {
    pub fn new(book: &'a BookInventory) -> Result<Self> {
        Ok(Self {
            title: &book.fields.title,
            authors: book.fields.authors.clone(),
            publisher: &book.fields.publisher,
            version: &book.fields.version,
            total_copies: copies_column(book.total_copies)?,
            available_copies: copies_column(book.available_copies)?,
        })
    }
}

/// 대출/반납 요청 모델
#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = schema::request_event)]
#[diesel(primary_key(req_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RequestEventEntity {
    pub req_id: i64,
    pub book_id: i64,
    pub reader_id: i64,
    pub request_date: NaiveDateTime,
    pub approval_date: Option<NaiveDateTime>,
    pub approver_id: Option<i64>,
    pub request_type: String,
    pub status: String,
}

impl RequestEventEntity {
    pub fn to_domain(self) -> Result<RequestEvent> {
        Ok(RequestEvent {
            req_id: self.req_id as u64,
            book_id: self.book_id as u64,
            reader_id: self.reader_id as u64,
            request_type: RequestType::try_from(self.request_type.as_str())?,
            status: RequestStatus::try_from(self.status.as_str())?,
            request_date: self.request_date,
            approver_id: self.approver_id.map(|id| id as u64),
            approval_date: self.approval_date,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::request_event)]
pub struct NewRequestEventEntity<'a> {
    pub book_id: i64,
    pub reader_id: i64,
    pub request_date: NaiveDateTime,
    pub request_type: &'a str,
    pub status: &'a str,
}

impl NewRequestEventEntity<'_> {
    pub fn new(request: &NewRequestEvent) -> Self {
        Self {
            book_id: request.book_id as i64,
            reader_id: request.reader_id as i64,
            request_date: request.request_date,
            request_type: request.request_type.to_code_str(),
            status: RequestStatus::Pending.to_code_str(),
        }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = schema::request_event)]
#[diesel(treat_none_as_null = true)]
pub struct RequestEventForm<'a> {
    pub status: &'a str,
    pub approver_id: Option<i64>,
    pub approval_date: Option<NaiveDateTime>,
}

impl RequestEventForm<'_> {
    pub fn new(request: &RequestEvent) -> Self {
        Self {
            status: request.status.to_code_str(),
            approver_id: request.approver_id.map(|id| id as i64),
            approval_date: request.approval_date,
        }
    }
}

/// 대출 기록 모델
#[derive(Queryable, Selectable, Identifiable, Debug, PartialEq)]
#[diesel(table_name = schema::issue_registry)]
#[diesel(primary_key(issue_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LoanEntity {
    pub issue_id: i64,
    pub isbn: i64,
    pub reader_id: i64,
    pub issue_approver_id: i64,
    pub issue_status: String,
    pub issue_date: NaiveDateTime,
    pub expected_return_date: NaiveDateTime,
    pub return_date: Option<NaiveDateTime>,
    pub return_approver_id: Option<i64>,
}

impl LoanEntity {
    pub fn to_domain(self) -> Result<IssueRegistry> {
        Ok(IssueRegistry {
            issue_id: self.issue_id as u64,
            isbn: self.isbn as u64,
            reader_id: self.reader_id as u64,
            issue_approver_id: self.issue_approver_id as u64,
            issue_status: IssueStatus::try_from(self.issue_status.as_str())?,
            issue_date: self.issue_date,
            expected_return_date: self.expected_return_date,
            return_date: self.return_date,
            return_approver_id: self.return_approver_id.map(|id| id as u64),
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = schema::issue_registry)]
pub struct NewLoanEntity<'a> {
    pub isbn: i64,
    pub reader_id: i64,
    pub issue_approver_id: i64,
    pub issue_status: &'a str,
    pub issue_date: NaiveDateTime,
    pub expected_return_date: NaiveDateTime,
}

impl NewLoanEntity<'_> {
    pub fn new(loan: &NewLoan) -> Self {
        Self {
            isbn: loan.isbn as i64,
            reader_id: loan.reader_id as i64,
            issue_approver_id: loan.issue_approver_id as i64,
            issue_status: IssueStatus::Issued.to_code_str(),
            issue_date: loan.issue_date,
            expected_return_date: loan.expected_return_date,
        }
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = schema::issue_registry)]
#[diesel(treat_none_as_null = true)]
pub struct LoanForm<'a> {
    pub issue_status: &'a str,
    pub return_date: Option<NaiveDateTime>,
    pub return_approver_id: Option<i64>,
}

impl LoanForm<'_> {
    pub fn new(loan: &IssueRegistry) -> Self {
        Self {
            issue_status: loan.issue_status.to_code_str(),
            return_date: loan.return_date,
            return_approver_id: loan.return_approver_id.map(|id| id as i64),
        }
    }
}
