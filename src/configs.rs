use diesel::r2d2::ConnectionManager;
use diesel::PgConnection;
use r2d2::Pool;
use serde::Deserialize;
use std::env;

pub mod logging;

#[derive(Debug, Deserialize)]
pub struct Database {
    host: String,
    port: i32,
    username: String,
    password: String,
    dbname: String,

    /// 커넥션 풀의 최대 커넥션 수로 설정하지 않을시 r2d2의 기본값(10)을 사용한다.
    pool_size: Option<u32>,
}

impl Database {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub fn pool_size(&self) -> Option<u32> {
        self.pool_size
    }

    pub fn url(&self) -> String {
        format!("postgres://{}:{}@{}:{}/{}", self.username, self.password, self.host, self.port, self.dbname)
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    db: Database,
    logger: Option<logging::Config>,
    loan_period_days: Option<u32>,
}

impl AppConfig {
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn logger(&self) -> Option<&logging::Config> {
        self.logger.as_ref()
    }

    /// 대출 기간(일)로 설정하지 않을시 7일로 설정 된다.
    pub fn loan_period_days(&self) -> u32 {
        self.loan_period_days
            .unwrap_or(crate::circulation::coordinator::DEFAULT_LOAN_PERIOD_DAYS)
    }
}

/// 실행 환경에 따라 .env 파일을 로드한다.
pub fn load_dotenv() {
    let env_filename = env::var("RUN_MODE")
        .map(|env| format!(".env.{}", env))
        .unwrap_or_else(|_| ".env".into());

    dotenvy::from_filename(env_filename).ok();
}

/// `config/{RUN_MODE}.json`과 `CIRCULATION__` 으로 시작하는 환경 변수에서 설정을 읽는다.
///
/// 예: `CIRCULATION__DB__HOST=localhost`
pub fn load_config() -> Result<AppConfig, config::ConfigError> {
    let env = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
    let config = config::Config::builder()
        .add_source(config::File::with_name(&format!("config/{}.json", env)).required(false))
        .add_source(
            config::Environment::with_prefix("CIRCULATION")
                .separator("__")
                .try_parsing(true)
        )
        .build()?;

    config.try_deserialize()
}

/// 데이터베이스 연결 풀을 생성한다.
pub fn connect_to_postgres(db: &Database) -> Result<Pool<ConnectionManager<PgConnection>>, r2d2::Error> {
    let manager = ConnectionManager::<PgConnection>::new(db.url());

    let mut builder = Pool::builder()
        .test_on_check_out(true);
    if let Some(size) = db.pool_size() {
        builder = builder.max_size(size);
    }
    builder.build(manager)
}
