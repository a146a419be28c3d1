//! PostgreSQL 저장소
//!
//! 각 트랜잭션은 커넥션 풀에서 커넥션 하나를 가져와 [`Connection::transaction`]으로 실행된다.
//! `lock_*` 함수는 `SELECT ... FOR UPDATE`로 행을 잠근다.

use crate::circulation::{
    BookFilter, BookInventory, CirculationError, IssueRegistry, IssueStatus, Library, LoanFilter, NewBook, NewLoan, NewRequestEvent,
    NewUser, RequestEvent, RequestFilter, RequestStatus, Result, Role, Session, Store, User,
};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use diesel::result::DatabaseErrorKind;
use diesel::debug_query;
use tracing::{debug, enabled};

mod entity;
mod schema;

type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

fn sql_debugging<T>(sql: T) -> T
where
    T: diesel::query_builder::QueryFragment<Pg>,
{
    if enabled!(tracing::Level::DEBUG) {
        let debug_str = debug_query::<Pg, _>(&sql).to_string();
        debug!("SQL: {}", debug_str);
    }
    sql
}

impl From<diesel::result::Error> for CirculationError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => CirculationError::NotFound("record not found".to_owned()),
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                CirculationError::Conflict(info.message().to_owned())
            }
            e => CirculationError::Storage(e.to_string()),
        }
    }
}

fn affected(count: usize, entity: &str, id: u64) -> Result<()> {
    if count == 0 {
        return Err(CirculationError::NotFound(format!("{} {} does not exist", entity, id)));
    }
    Ok(())
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Store for PgStore {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Session) -> Result<T>
    {
        let mut pooled = self.pool.get()
            .map_err(|e| CirculationError::Storage(e.to_string()))?;
        let connection: &mut PgConnection = &mut pooled;

        connection.transaction(|conn| f(&mut PgSession { conn }))
    }
}

/// (도서, 독자) 쌍의 반납 되지 않은 대출 기록. 승인자는 지정된 경우에만 조건에 추가된다.
fn open_loans(
    conn: &mut PgConnection,
    isbn: u64,
    reader_id: u64,
    issue_approver_id: Option<u64>,
) -> QueryResult<Vec<entity::LoanEntity>> {
    use schema::issue_registry;

    let mut query = issue_registry::table
        .filter(
            issue_registry::isbn.eq(isbn as i64)
                .and(issue_registry::reader_id.eq(reader_id as i64))
                .and(issue_registry::issue_status.eq(IssueStatus::Issued.to_code_str()))
        )
        .order_by(issue_registry::issue_id.asc())
        .select(entity::LoanEntity::as_select())
        .into_boxed();

    if let Some(approver_id) = issue_approver_id {
        query = query.filter(issue_registry::issue_approver_id.eq(approver_id as i64));
    }
    sql_debugging(query).load(conn)
}

struct PgSession<'c> {
    conn: &'c mut PgConnection,
}

impl Session for PgSession<'_> {
    fn insert_library(&mut self, name: &str) -> Result<Library> {
        use schema::library;

        let entity = sql_debugging(diesel::insert_into(library::table)
            .values(entity::NewLibraryEntity { name })
            .returning(entity::LibraryEntity::as_returning()))
            .get_result(self.conn)?;
        Ok(entity.to_domain())
    }

    fn find_library(&mut self, id: u64) -> Result<Option<Library>> {
        use schema::library;

        let entity = sql_debugging(library::table
            .find(id as i64)
            .select(entity::LibraryEntity::as_select()))
            .first(self.conn)
            .optional()?;
        Ok(entity.map(|e| e.to_domain()))
    }

    fn find_library_by_name(&mut self, name: &str) -> Result<Option<Library>> {
        use schema::library;

        let entity = sql_debugging(library::table
            .filter(library::name.eq(name))
            .select(entity::LibraryEntity::as_select()))
            .first(self.conn)
            .optional()?;
        Ok(entity.map(|e| e.to_domain()))
    }

    fn lock_library(&mut self, id: u64) -> Result<Option<Library>> {
        use schema::library;

        let entity = sql_debugging(library::table
            .find(id as i64)
            .select(entity::LibraryEntity::as_select())
            .for_update())
            .first(self.conn)
            .optional()?;
        Ok(entity.map(|e| e.to_domain()))
    }

    fn insert_user(&mut self, user: &NewUser) -> Result<User> {
        use schema::users;

        sql_debugging(diesel::insert_into(users::table)
            .values(entity::NewUserEntity::new(user))
            .returning(entity::UserEntity::as_returning()))
            .get_result(self.conn)?
            .to_domain()
    }

    fn find_user(&mut self, id: u64) -> Result<Option<User>> {
        use schema::users;

        sql_debugging(users::table
            .find(id as i64)
            .select(entity::UserEntity::as_select()))
            .first(self.conn)
            .optional()?
            .map(|e| e.to_domain())
            .transpose()
    }

    fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        use schema::users;

        sql_debugging(users::table
            .filter(users::email.eq(email))
            .select(entity::UserEntity::as_select()))
            .first(self.conn)
            .optional()?
            .map(|e| e.to_domain())
            .transpose()
    }

    fn find_users(&mut self, library_id: u64, role: Role) -> Result<Vec<User>> {
        use schema::users;

        let entities: Vec<entity::UserEntity> = sql_debugging(users::table
            .filter(users::lib_id.eq(library_id as i64).and(users::role.eq(role.to_code_str())))
            .order_by(users::id.asc())
            .select(entity::UserEntity::as_select()))
            .load(self.conn)?;

        entities.into_iter()
            .map(|e| e.to_domain())
            .collect()
    }

    fn insert_book(&mut self, book: &NewBook) -> Result<BookInventory> {
        use schema::book_inventory;

        let entity = sql_debugging(diesel::insert_into(book_inventory::table)
            .values(entity::NewBookEntity::new(book)?)
            .returning(entity::BookEntity::as_returning()))
            .get_result(self.conn)?;
        Ok(entity.to_domain())
    }

    fn find_book(&mut self, isbn: u64) -> Result<Option<BookInventory>> {
        use schema::book_inventory;

        let entity = sql_debugging(book_inventory::table
            .find(isbn as i64)
            .select(entity::BookEntity::as_select()))
            .first(self.conn)
            .optional()?;
        Ok(entity.map(|e| e.to_domain()))
    }

    fn lock_book(&mut self, isbn: u64) -> Result<Option<BookInventory>> {
        use schema::book_inventory;

        let entity = sql_debugging(book_inventory::table
            .find(isbn as i64)
            .select(entity::BookEntity::as_select())
            .for_update())
            .first(self.conn)
            .optional()?;
        Ok(entity.map(|e| e.to_domain()))
    }

    fn find_book_by_title(&mut self, library_id: u64, title: &str) -> Result<Option<BookInventory>> {
        use schema::book_inventory;

        let entity = sql_debugging(book_inventory::table
            .filter(book_inventory::lib_id.eq(library_id as i64).and(book_inventory::title.eq(title)))
            .select(entity::BookEntity::as_select()))
            .first(self.conn)
            .optional()?;
        Ok(entity.map(|e| e.to_domain()))
    }

    fn find_books(&mut self, filter: &BookFilter) -> Result<Vec<BookInventory>> {
        use schema::book_inventory;

        let mut query = book_inventory::table
            .select(entity::BookEntity::as_select())
            .order_by(book_inventory::isbn.asc())
            .into_boxed();

        query = match filter {
            BookFilter::All => query,
            BookFilter::Library(library_id) => query.filter(book_inventory::lib_id.eq(*library_id as i64)),
            BookFilter::Query(q) => query.filter(
                book_inventory::title.eq(q.clone())
                    .or(book_inventory::publisher.eq(q.clone()))
                    .or(book_inventory::authors.contains(vec![q.clone()]))
            ),
        };

        let entities: Vec<entity::BookEntity> = sql_debugging(query).load(self.conn)?;
        Ok(entities.into_iter().map(|e| e.to_domain()).collect())
    }

    fn update_book(&mut self, book: &BookInventory) -> Result<()> {
        use schema::book_inventory;

        let count = sql_debugging(diesel::update(book_inventory::table.find(book.isbn as i64))
            .set(entity::BookForm::new(book)?))
            .execute(self.conn)?;
        affected(count, "book", book.isbn)
    }

    fn delete_book(&mut self, isbn: u64) -> Result<()> {
        use schema::book_inventory;

        let count = sql_debugging(diesel::delete(book_inventory::table.find(isbn as i64)))
            .execute(self.conn)?;
        affected(count, "book", isbn)
    }

    fn insert_request(&mut self, request: &NewRequestEvent) -> Result<RequestEvent> {
        use schema::request_event;

        sql_debugging(diesel::insert_into(request_event::table)
            .values(entity::NewRequestEventEntity::new(request))
            .returning(entity::RequestEventEntity::as_returning()))
            .get_result(self.conn)?
            .to_domain()
    }

    fn find_request(&mut self, req_id: u64) -> Result<Option<RequestEvent>> {
        use schema::request_event;

        sql_debugging(request_event::table
            .find(req_id as i64)
            .select(entity::RequestEventEntity::as_select()))
            .first(self.conn)
            .optional()?
            .map(|e| e.to_domain())
            .transpose()
    }

    fn lock_request(&mut self, req_id: u64) -> Result<Option<RequestEvent>> {
        use schema::request_event;

        sql_debugging(request_event::table
            .find(req_id as i64)
            .select(entity::RequestEventEntity::as_select())
            .for_update())
            .first(self.conn)
            .optional()?
            .map(|e| e.to_domain())
            .transpose()
    }

    fn find_requests(&mut self, filter: &RequestFilter) -> Result<Vec<RequestEvent>> {
        use schema::{book_inventory, request_event};

        let entities: Vec<entity::RequestEventEntity> = match filter {
            RequestFilter::Reader(reader_id) => sql_debugging(request_event::table
                .filter(request_event::reader_id.eq(*reader_id as i64))
                .order_by(request_event::req_id.asc())
                .select(entity::RequestEventEntity::as_select()))
                .load(self.conn)?,
            RequestFilter::Library(library_id) => sql_debugging(request_event::table
                .inner_join(book_inventory::table)
                .filter(book_inventory::lib_id.eq(*library_id as i64))
                .order_by(request_event::req_id.asc())
                .select(entity::RequestEventEntity::as_select()))
                .load(self.conn)?,
            RequestFilter::Pending { book_id, reader_id, request_type } => sql_debugging(request_event::table
                .filter(
                    request_event::book_id.eq(*book_id as i64)
                        .and(request_event::reader_id.eq(*reader_id as i64))
                        .and(request_event::request_type.eq(request_type.to_code_str()))
                        .and(request_event::status.eq(RequestStatus::Pending.to_code_str()))
                )
                .order_by(request_event::req_id.asc())
                .select(entity::RequestEventEntity::as_select()))
                .load(self.conn)?,
        };

        entities.into_iter()
            .map(|e| e.to_domain())
            .collect()
    }

    fn update_request(&mut self, request: &RequestEvent) -> Result<()> {
        use schema::request_event;

        let count = sql_debugging(diesel::update(request_event::table.find(request.req_id as i64))
            .set(entity::RequestEventForm::new(request)))
            .execute(self.conn)?;
        affected(count, "request event", request.req_id)
    }

    fn insert_loan(&mut self, loan: &NewLoan) -> Result<IssueRegistry> {
        use schema::issue_registry;

        sql_debugging(diesel::insert_into(issue_registry::table)
            .values(entity::NewLoanEntity::new(loan))
            .returning(entity::LoanEntity::as_returning()))
            .get_result(self.conn)?
            .to_domain()
    }

    fn find_loans(&mut self, filter: &LoanFilter) -> Result<Vec<IssueRegistry>> {
        use schema::{book_inventory, issue_registry};

        let entities: Vec<entity::LoanEntity> = match filter {
            LoanFilter::Reader(reader_id) => sql_debugging(issue_registry::table
                .filter(issue_registry::reader_id.eq(*reader_id as i64))
                .order_by(issue_registry::issue_id.asc())
                .select(entity::LoanEntity::as_select()))
                .load(self.conn)?,
            LoanFilter::IssueApprover(approver_id) => sql_debugging(issue_registry::table
                .filter(issue_registry::issue_approver_id.eq(*approver_id as i64))
                .order_by(issue_registry::issue_id.asc())
                .select(entity::LoanEntity::as_select()))
                .load(self.conn)?,
            LoanFilter::Library(library_id) => sql_debugging(issue_registry::table
                .inner_join(book_inventory::table)
                .filter(book_inventory::lib_id.eq(*library_id as i64))
                .order_by(issue_registry::issue_id.asc())
                .select(entity::LoanEntity::as_select()))
                .load(self.conn)?,
            LoanFilter::Open { isbn, reader_id, issue_approver_id } => {
                open_loans(self.conn, *isbn, *reader_id, *issue_approver_id)?
            }
        };

        entities.into_iter()
            .map(|e| e.to_domain())
            .collect()
    }

    fn update_loan(&mut self, loan: &IssueRegistry) -> Result<()> {
        use schema::issue_registry;

        let count = sql_debugging(diesel::update(issue_registry::table.find(loan.issue_id as i64))
            .set(entity::LoanForm::new(loan)))
            .execute(self.conn)?;
        affected(count, "issue registry", loan.issue_id)
    }
}
