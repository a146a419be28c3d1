use serde::Deserialize;
use thiserror::Error;
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("로깅 파일 로테이션(rotation)은 \"DAILY\", \"HOURLY\", \"MINUTELY\", \"NEVER\"만 가능 합니다: {0}")]
    UnknownRotation(String),

    #[error("로그 레벨(level)은 \"TRACE\", \"DEBUG\", \"INFO\", \"WARN\", \"ERROR\"만 가능 합니다: {0}")]
    UnknownLevel(String),

    #[error("cannot create log file: {0}")]
    Appender(#[from] rolling::InitError),

    #[error("cannot install global subscriber: {0}")]
    Subscriber(String),
}

#[derive(Debug, Deserialize)]
pub struct Config {
    dir: String,
    name: String,

    /// 최대 로그 파일 개수로 로그 파일이 설정한 개수보다 커질 경우 기존의 로그파일들은 삭제 된다.
    /// 설정 되지 않을 시 로그 파일은 삭제 되지 않는다.
    keep: Option<usize>,

    /// 파일과 stdout에 출력할 로그의 레벨로 지정된 로그 레벨 이상만 로깅된다.
    /// 설정하지 않을시 기본값은 DEBUG로 설정 된다.
    ///
    /// 이 값은 [`tracing::Level`]로 변환 됨으로 자세한 사항은 해당 파일을 확인
    level: Option<String>,

    /// 로깅 파일이 분리 되는 기간으로 .log 파일 하나 당 설정된 기간 동안 로그가 기록 된다.
    /// 설정 되지 않을시 기본값은 DAILY로 설정된다.
    ///
    /// 이 값은 [`rolling::Rotation`]으로 변환 됨으로 자세한 사항은 해당 파일을 확인
    rotation: Option<String>
}

/// 전역 로거를 설정한다.
///
/// 반환된 [`WorkerGuard`]가 drop 되면 파일에 남지 않은 로그가 버려지므로 프로그램 종료 시까지 유지해야 한다.
pub fn set_global_logging_config(c: &Config) -> Result<WorkerGuard, LoggingError> {
    let rotation = match &c.rotation {
        Some(rotation) => parse_rotation(rotation)?,
        None => rolling::Rotation::DAILY,
    };
    let level = match &c.level {
        Some(level) => parse_level(level)?,
        None => tracing::Level::DEBUG,
    };

    let mut file_appender = rolling::RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(c.name.clone())
        .filename_suffix("log");

    if let Some(keep) = c.keep {
        file_appender = file_appender.max_log_files(keep);
    }

    let file_appender = file_appender.build(c.dir.clone())?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let writer = std::io::stdout.and(non_blocking);

    tracing_subscriber::fmt()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_timer(LocalTime::new(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]")))
        .with_writer(writer)
        .with_max_level(level)
        .try_init()
        .map_err(|e| LoggingError::Subscriber(e.to_string()))?;

    Ok(guard)
}

fn parse_rotation(s: &str) -> Result<rolling::Rotation, LoggingError> {
    match s.to_uppercase().as_str() {
        "DAILY" => Ok(rolling::Rotation::DAILY),
        "HOURLY" => Ok(rolling::Rotation::HOURLY),
        "MINUTELY" => Ok(rolling::Rotation::MINUTELY),
        "NEVER" => Ok(rolling::Rotation::NEVER),
        _ => Err(LoggingError::UnknownRotation(s.to_owned())),
    }
}

fn parse_level(l: &str) -> Result<tracing::Level, LoggingError> {
    match l.to_uppercase().as_str() {
        "TRACE" => Ok(tracing::Level::TRACE),
        "DEBUG" => Ok(tracing::Level::DEBUG),
        "INFO" => Ok(tracing::Level::INFO),
        "WARN" => Ok(tracing::Level::WARN),
        "ERROR" => Ok(tracing::Level::ERROR),
        _ => Err(LoggingError::UnknownLevel(l.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_levels() {
        assert_eq!(parse_level("info").unwrap(), tracing::Level::INFO);
        assert_eq!(parse_level("ERROR").unwrap(), tracing::Level::ERROR);
    }

    #[test]
    fn unknown_level_is_an_error() {
        assert!(matches!(parse_level("VERBOSE"), Err(LoggingError::UnknownLevel(_))));
    }

    #[test]
    fn parse_known_rotations() {
        assert_eq!(parse_rotation("hourly").unwrap(), rolling::Rotation::HOURLY);
        assert_eq!(parse_rotation("NEVER").unwrap(), rolling::Rotation::NEVER);
    }

    #[test]
    fn unknown_rotation_is_an_error() {
        assert!(matches!(parse_rotation("WEEKLY"), Err(LoggingError::UnknownRotation(_))));
    }
}
