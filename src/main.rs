use clap::{Parser, Subcommand};
use library_circulation::circulation::BookFields;
use library_circulation::{configs, Coordinator, Decision, PgStore};
use serde::Serialize;
use tracing::error;

/// 도서관 대출 관리 도구
#[derive(Debug, Parser)]
#[command(name = "circulation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 도서관과 소유자를 등록한다
    RegisterLibrary { name: String, owner_email: String },

    /// 소유자가 관리자를 등록한다
    OnboardAdmin {
        #[arg(long = "as")]
        owner: String,
        email: String,
    },

    /// 관리자 혹은 소유자가 독자를 등록한다
    OnboardReader {
        #[arg(long = "as")]
        onboarder: String,
        email: String,
    },

    /// 소속 도서관의 관리자 목록
    Admins {
        #[arg(long = "as")]
        user: String,
    },

    /// 소속 도서관의 독자 목록
    Readers {
        #[arg(long = "as")]
        user: String,
    },

    /// 도서관에 도서를 들여온다
    Acquire {
        library_id: u64,
        title: String,
        #[arg(long, value_delimiter = ',')]
        authors: Vec<String>,
        #[arg(long, default_value = "")]
        publisher: String,
        #[arg(long, default_value = "")]
        version: String,
        #[arg(long, default_value_t = 1)]
        copies: u32,
    },

    /// 도서의 사본을 추가한다
    AddCopies { isbn: u64, copies: u32 },

    /// 도서의 사본 하나를 제거한다
    Remove { isbn: u64 },

    /// 도서 정보를 수정한다
    Update {
        isbn: u64,
        title: String,
        #[arg(long, value_delimiter = ',')]
        authors: Vec<String>,
        #[arg(long, default_value = "")]
        publisher: String,
        #[arg(long, default_value = "")]
        version: String,
        #[arg(long, default_value_t = 0)]
        add_copies: u32,
    },

    /// 대출을 요청한다
    Issue {
        #[arg(long = "as")]
        reader: String,
        isbn: u64,
    },

    /// 반납을 요청한다
    Return {
        #[arg(long = "as")]
        reader: String,
        isbn: u64,
    },

    /// 요청을 승인한다
    Approve {
        #[arg(long = "as")]
        approver: String,
        req_id: u64,
    },

    /// 요청을 거절한다
    Reject {
        #[arg(long = "as")]
        approver: String,
        req_id: u64,
    },

    /// 볼 수 있는 요청 목록
    Requests {
        #[arg(long = "as")]
        user: String,
    },

    /// 볼 수 있는 대출 기록
    Loans {
        #[arg(long = "as")]
        user: String,
    },

    /// 도서관의 도서 목록
    Books { library_id: u64 },

    /// 제목, 출판사, 저자로 도서를 검색한다
    Search {
        #[arg(default_value = "")]
        query: String,
    },

    /// (도서, 독자)의 대출 상태
    State {
        isbn: u64,
        #[arg(long)]
        reader: String,
    },
}

fn fields(title: String, authors: Vec<String>, publisher: String, version: String) -> BookFields {
    BookFields { title, authors, publisher, version }
}

fn print<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(coordinator: &Coordinator<PgStore>, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = |identifier: &str| coordinator.resolve_user(identifier).map(|user| user.id());

    match command {
        Command::RegisterLibrary { name, owner_email } => print(&coordinator.register_library(&name, &owner_email)?),
        Command::OnboardAdmin { owner, email } => print(&coordinator.onboard_admin(user_id(&owner)?, &email)?),
        Command::OnboardReader { onboarder, email } => {
            print(&coordinator.onboard_reader(user_id(&onboarder)?, &email)?)
        }
        Command::Admins { user } => print(&coordinator.admins_of(user_id(&user)?)?),
        Command::Readers { user } => print(&coordinator.readers_of(user_id(&user)?)?),
        Command::Acquire { library_id, title, authors, publisher, version, copies } => {
            let fields = fields(title, authors, publisher, version);
            print(&coordinator.acquire_title(library_id, &fields, copies)?)
        }
        Command::AddCopies { isbn, copies } => print(&coordinator.add_copies(isbn, copies)?),
        Command::Remove { isbn } => print(&coordinator.remove_copy(isbn)?),
        Command::Update { isbn, title, authors, publisher, version, add_copies } => {
            let fields = fields(title, authors, publisher, version);
            print(&coordinator.update_book(isbn, &fields, add_copies)?)
        }
        Command::Issue { reader, isbn } => print(&coordinator.submit_issue_request(user_id(&reader)?, isbn)?),
        Command::Return { reader, isbn } => print(&coordinator.submit_return_request(user_id(&reader)?, isbn)?),
        Command::Approve { approver, req_id } => {
            print(&coordinator.resolve(req_id, user_id(&approver)?, Decision::Approve)?)
        }
        Command::Reject { approver, req_id } => {
            print(&coordinator.resolve(req_id, user_id(&approver)?, Decision::Reject)?)
        }
        Command::Requests { user } => print(&coordinator.requests_for(user_id(&user)?)?),
        Command::Loans { user } => print(&coordinator.loans_for(user_id(&user)?)?),
        Command::Books { library_id } => print(&coordinator.books_of_library(library_id)?),
        Command::Search { query } => print(&coordinator.search_books(&query)?),
        Command::State { isbn, reader } => print(&coordinator.pair_state(isbn, user_id(&reader)?)?),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    configs::load_dotenv();
    let config = configs::load_config()?;
    let _guard = match config.logger() {
        Some(logger) => Some(configs::logging::set_global_logging_config(logger)?),
        None => None,
    };

    let pool = configs::connect_to_postgres(config.db())?;
    let coordinator = Coordinator::new(PgStore::new(pool))
        .with_loan_period(config.loan_period_days());

    run(&coordinator, cli.command).inspect_err(|e| error!("{}", e))
}
