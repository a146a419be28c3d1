pub mod coordinator;
pub mod inventory;
pub mod membership;
pub mod registry;
pub mod repo;
pub mod request;

use serde::Serialize;
use std::fmt;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Circulation 모듈에서 사용할 에러 열거
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CirculationError {
    /// 도서, 사용자, 요청, 대출 기록 등을 찾을 수 없음
    #[error("not found: {0}")]
    NotFound(String),

    /// 중복 요청, 이미 처리된 요청의 재처리, 대출 중인 도서의 삭제 등
    #[error("conflict: {0}")]
    Conflict(String),

    /// 대출 가능한 사본이 없음
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// 권한 혹은 소속 도서관이 맞지 않음
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 잘못된 입력 값 혹은 알 수 없는 코드
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 내부 불변식 위반. 외부에서 도달할 수 없어야 하며 발생시 버그로 취급한다.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// 저장소 연결 혹은 쿼리 실행 실패
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, CirculationError>;

/// 사용자 역할
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Reader,
}

impl Role {
    pub fn to_code_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Reader => "reader",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = CirculationError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "reader" => Ok(Role::Reader),
            _ => Err(CirculationError::InvalidArgument(format!("unknown role: {}", value))),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code_str())
    }
}

/// 도서관. 사용자와 도서 재고의 소유 단위(테넌트)
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Library {
    pub(crate) id: u64,
    pub(crate) name: String,
}

impl Library {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 사용자
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct User {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) contact_number: String,
    pub(crate) role: Role,
    pub(crate) library_id: u64,
}

impl User {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn contact_number(&self) -> &str {
        &self.contact_number
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn library_id(&self) -> u64 {
        self.library_id
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub contact_number: String,
    pub role: Role,
    pub library_id: u64,
}

impl NewUser {
    pub fn new(email: &str, role: Role, library_id: u64) -> Self {
        Self {
            name: String::new(),
            email: email.to_owned(),
            contact_number: String::new(),
            role,
            library_id,
        }
    }
}

/// 도서의 서지 정보
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct BookFields {
    pub title: String,
    pub authors: Vec<String>,
    pub publisher: String,
    pub version: String,
}

impl BookFields {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            ..Default::default()
        }
    }
}

/// 도서관별 도서 재고
///
/// 사본은 개별적으로 구분하지 않고 전체/대출 가능 수량으로만 관리하며
/// 항상 `0 <= available_copies <= total_copies`를 만족해야 한다.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BookInventory {
    pub(crate) isbn: u64,
    pub(crate) library_id: u64,
    pub(crate) fields: BookFields,
    pub(crate) total_copies: u32,
    pub(crate) available_copies: u32,
}

impl BookInventory {
    pub fn isbn(&self) -> u64 {
        self.isbn
    }

    pub fn library_id(&self) -> u64 {
        self.library_id
    }

    pub fn title(&self) -> &str {
        &self.fields.title
    }

    pub fn authors(&self) -> &[String] {
        &self.fields.authors
    }

    pub fn publisher(&self) -> &str {
        &self.fields.publisher
    }

    pub fn version(&self) -> &str {
        &self.fields.version
    }

    pub fn fields(&self) -> &BookFields {
        &self.fields
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    /// 현재 대출 중인 사본 수
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }
}

/// 새로 등록할 도서 재고. 카탈로그 키(ISBN)는 저장소가 부여한다.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewBook {
    pub library_id: u64,
    pub fields: BookFields,
    pub copies: u32,
}

/// 도서 검색 조건
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BookFilter {
    /// 전체 도서
    All,

    /// 특정 도서관이 소유한 도서
    Library(u64),

    /// 제목, 출판사가 일치하거나 저자 목록에 포함된 도서
    Query(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Issue,
    Return,
}

impl RequestType {
    pub fn to_code_str(&self) -> &'static str {
        match self {
            RequestType::Issue => "issue",
            RequestType::Return => "return",
        }
    }
}

impl TryFrom<&str> for RequestType {
    type Error = CirculationError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "issue" => Ok(RequestType::Issue),
            "return" => Ok(RequestType::Return),
            _ => Err(CirculationError::InvalidArgument(format!("unknown request type: {}", value))),
        }
    }
}

impl Display for RequestType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn to_code_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for RequestStatus {
    type Error = CirculationError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(CirculationError::InvalidArgument(format!("unknown request status: {}", value))),
        }
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code_str())
    }
}

/// 대출/반납 요청 이벤트
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RequestEvent {
    pub(crate) req_id: u64,
    pub(crate) book_id: u64,
    pub(crate) reader_id: u64,
    pub(crate) request_type: RequestType,
    pub(crate) status: RequestStatus,
    pub(crate) request_date: chrono::NaiveDateTime,
    pub(crate) approver_id: Option<u64>,
    pub(crate) approval_date: Option<chrono::NaiveDateTime>,
}

impl RequestEvent {
    pub fn req_id(&self) -> u64 {
        self.req_id
    }

    pub fn book_id(&self) -> u64 {
        self.book_id
    }

    pub fn reader_id(&self) -> u64 {
        self.reader_id
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn request_date(&self) -> chrono::NaiveDateTime {
        self.request_date
    }

    pub fn approver_id(&self) -> Option<u64> {
        self.approver_id
    }

    pub fn approval_date(&self) -> Option<chrono::NaiveDateTime> {
        self.approval_date
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewRequestEvent {
    pub book_id: u64,
    pub reader_id: u64,
    pub request_type: RequestType,
    pub request_date: chrono::NaiveDateTime,
}

/// 요청 이벤트 검색 조건
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RequestFilter {
    /// 특정 독자가 생성한 요청
    Reader(u64),

    /// 특정 도서관 도서에 대한 요청
    ///
    /// 도서 재고를 거쳐 도서관을 찾으므로 삭제된 도서의 요청은 포함되지 않는다.
    /// 대출 중인 도서는 삭제할 수 없으므로 여기서 빠지는 요청은 열린 대출과 관계가 없다.
    Library(u64),

    /// (도서, 독자) 쌍의 대기 중인 요청
    Pending {
        book_id: u64,
        reader_id: u64,
        request_type: RequestType,
    },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Issued,
    Returned,
}

impl IssueStatus {
    pub fn to_code_str(&self) -> &'static str {
        match self {
            IssueStatus::Issued => "issued",
            IssueStatus::Returned => "returned",
        }
    }
}

impl TryFrom<&str> for IssueStatus {
    type Error = CirculationError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "issued" => Ok(IssueStatus::Issued),
            "returned" => Ok(IssueStatus::Returned),
            _ => Err(CirculationError::InvalidArgument(format!("unknown issue status: {}", value))),
        }
    }
}

impl Display for IssueStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code_str())
    }
}

/// 대출 기록
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct IssueRegistry {
    pub(crate) issue_id: u64,
    pub(crate) isbn: u64,
    pub(crate) reader_id: u64,
    pub(crate) issue_approver_id: u64,
    pub(crate) issue_status: IssueStatus,
    pub(crate) issue_date: chrono::NaiveDateTime,
    pub(crate) expected_return_date: chrono::NaiveDateTime,
    pub(crate) return_date: Option<chrono::NaiveDateTime>,
    pub(crate) return_approver_id: Option<u64>,
}

impl IssueRegistry {
    pub fn issue_id(&self) -> u64 {
        self.issue_id
    }

    pub fn isbn(&self) -> u64 {
        self.isbn
    }

    pub fn reader_id(&self) -> u64 {
        self.reader_id
    }

    pub fn issue_approver_id(&self) -> u64 {
        self.issue_approver_id
    }

    pub fn issue_status(&self) -> IssueStatus {
        self.issue_status
    }

    pub fn issue_date(&self) -> chrono::NaiveDateTime {
        self.issue_date
    }

    pub fn expected_return_date(&self) -> chrono::NaiveDateTime {
        self.expected_return_date
    }

    pub fn return_date(&self) -> Option<chrono::NaiveDateTime> {
        self.return_date
    }

    pub fn return_approver_id(&self) -> Option<u64> {
        self.return_approver_id
    }

    pub fn is_open(&self) -> bool {
        self.issue_status == IssueStatus::Issued
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewLoan {
    pub isbn: u64,
    pub reader_id: u64,
    pub issue_approver_id: u64,
    pub issue_date: chrono::NaiveDateTime,
    pub expected_return_date: chrono::NaiveDateTime,
}

/// 대출 기록 검색 조건
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LoanFilter {
    /// 특정 독자의 대출 기록
    Reader(u64),

    /// 특정 관리자가 승인한 대출 기록
    IssueApprover(u64),

    /// 특정 도서관 도서의 대출 기록
    ///
    /// 도서 재고를 거쳐 도서관을 찾으므로 삭제된 도서의 기록은 포함되지 않는다.
    /// 대출 중인 도서는 삭제할 수 없어 빠지는 것은 반납이 끝난 기록뿐이다.
    Library(u64),

    /// (도서, 독자) 쌍의 반납 되지 않은 대출 기록. 승인자가 지정되면 승인자도 일치해야 한다.
    Open {
        isbn: u64,
        reader_id: u64,
        issue_approver_id: Option<u64>,
    },
}

/// 트랜잭션 하나 안에서 사용하는 저장소 세션
///
/// `lock_*` 함수는 트랜잭션이 끝날 때까지 해당 행(혹은 키)을 잠근다.
/// 잠금 순서는 항상 도서관 -> 도서 -> 요청 순서를 따라야 한다.
pub trait Session {
    /// 도서관을 저장한다. 이름이 중복될 경우 [`CirculationError::Conflict`]
    fn insert_library(&mut self, name: &str) -> Result<Library>;

    fn find_library(&mut self, id: u64) -> Result<Option<Library>>;

    fn find_library_by_name(&mut self, name: &str) -> Result<Option<Library>>;

    /// 도서관을 찾아 잠근다.
    fn lock_library(&mut self, id: u64) -> Result<Option<Library>>;

    /// 사용자를 저장한다. 이메일이 중복될 경우 [`CirculationError::Conflict`]
    fn insert_user(&mut self, user: &NewUser) -> Result<User>;

    fn find_user(&mut self, id: u64) -> Result<Option<User>>;

    fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>>;

    /// 도서관에 소속된 특정 역할의 사용자를 찾는다.
    fn find_users(&mut self, library_id: u64, role: Role) -> Result<Vec<User>>;

    /// 도서 재고를 저장한다. 같은 도서관에 같은 제목이 있을 경우 [`CirculationError::Conflict`]
    fn insert_book(&mut self, book: &NewBook) -> Result<BookInventory>;

    fn find_book(&mut self, isbn: u64) -> Result<Option<BookInventory>>;

    /// 도서 재고를 찾아 잠근다. 같은 카탈로그 키에 대한 재고 변경은 이 잠금으로 직렬화 된다.
    fn lock_book(&mut self, isbn: u64) -> Result<Option<BookInventory>>;

    fn find_book_by_title(&mut self, library_id: u64, title: &str) -> Result<Option<BookInventory>>;

    fn find_books(&mut self, filter: &BookFilter) -> Result<Vec<BookInventory>>;

    fn update_book(&mut self, book: &BookInventory) -> Result<()>;

    fn delete_book(&mut self, isbn: u64) -> Result<()>;

    fn insert_request(&mut self, request: &NewRequestEvent) -> Result<RequestEvent>;

    fn find_request(&mut self, req_id: u64) -> Result<Option<RequestEvent>>;

    /// 요청을 찾아 잠근다. 요청 대상 도서를 먼저 잠근 뒤 호출해야 한다.
    fn lock_request(&mut self, req_id: u64) -> Result<Option<RequestEvent>>;

    /// 조건에 맞는 요청들을 요청 아이디 순으로 찾는다.
    fn find_requests(&mut self, filter: &RequestFilter) -> Result<Vec<RequestEvent>>;

    fn update_request(&mut self, request: &RequestEvent) -> Result<()>;

    fn insert_loan(&mut self, loan: &NewLoan) -> Result<IssueRegistry>;

    /// 조건에 맞는 대출 기록들을 대출 아이디 순으로 찾는다.
    fn find_loans(&mut self, filter: &LoanFilter) -> Result<Vec<IssueRegistry>>;

    fn update_loan(&mut self, loan: &IssueRegistry) -> Result<()>;
}

/// 저장소. 트랜잭션 단위로 [`Session`]을 제공한다.
///
/// 클로저가 `Err`를 반환하면 트랜잭션 안에서 실행된 모든 변경은 롤백 된다.
pub trait Store: Send + Sync {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Session) -> Result<T>;
}

/// 알림 내용
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Notice {
    LibraryRegistered { library: String },
    Onboarded { role: Role, library: String },
    RequestResolved { req_id: u64, request_type: RequestType, status: RequestStatus },
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Notice::LibraryRegistered { library } => write!(f, "library {} registered", library),
            Notice::Onboarded { role, library } => write!(f, "onboarded to {} as {}", library, role),
            Notice::RequestResolved { req_id, request_type, status } => {
                write!(f, "{} request {} {}", request_type, req_id, status)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// 트랜잭션 커밋 이후 호출되는 알림 발송기
/// 발송 실패는 로그로만 남기며 이미 커밋된 변경을 되돌리지 않는다.
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: u64, notice: &Notice) -> std::result::Result<(), NotifyError>;
}

/// 알림을 로그로만 남기는 기본 발송기
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user_id: u64, notice: &Notice) -> std::result::Result<(), NotifyError> {
        tracing::info!(user_id, "{}", notice);
        Ok(())
    }
}

/// 알림을 발송하고 실패할 경우 경고 로그를 남긴다.
pub(crate) fn notify_best_effort(notifier: &dyn Notifier, user_id: u64, notice: Notice) {
    if let Err(e) = notifier.notify(user_id, &notice) {
        tracing::warn!(user_id, "{} ({})", e, notice);
    }
}
