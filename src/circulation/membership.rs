//! 도서관 등록과 사용자 온보딩

use crate::circulation::{CirculationError, Library, NewUser, Result, Role, Session, User};

fn require_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(CirculationError::InvalidArgument("email is required".to_owned()));
    }
    Ok(email)
}

fn ensure_new_email(session: &mut dyn Session, email: &str) -> Result<()> {
    if session.find_user_by_email(email)?.is_some() {
        return Err(CirculationError::Conflict("user with the same email address already exists".to_owned()));
    }
    Ok(())
}

fn library_of(session: &mut dyn Session, user: &User) -> Result<Library> {
    session.lock_library(user.library_id)?
        .ok_or_else(|| CirculationError::NotFound(format!("library {} does not exist", user.library_id)))
}

/// 사용자 식별자(이메일 혹은 아이디)로 사용자를 찾는다.
pub fn resolve_user(session: &mut dyn Session, identifier: &str) -> Result<User> {
    let identifier = identifier.trim();
    let user = match identifier.parse::<u64>() {
        Ok(id) => session.find_user(id)?,
        Err(_) => session.find_user_by_email(identifier)?,
    };
    user.ok_or_else(|| CirculationError::NotFound(format!("user {} not found", identifier)))
}

/// 사용자를 찾는다.
pub fn user(session: &mut dyn Session, id: u64) -> Result<User> {
    session.find_user(id)?
        .ok_or_else(|| CirculationError::NotFound(format!("user {} not found", id)))
}

/// 새 도서관과 소유자를 등록한다.
pub fn register_library(session: &mut dyn Session, name: &str, owner_email: &str) -> Result<(Library, User)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CirculationError::InvalidArgument("library name is required".to_owned()));
    }
    let owner_email = require_email(owner_email)?;

    if session.find_library_by_name(name)?.is_some() {
        return Err(CirculationError::Conflict("library with this name already exists".to_owned()));
    }
    ensure_new_email(session, owner_email)?;

    let library = session.insert_library(name)?;
    let owner = session.insert_user(&NewUser::new(owner_email, Role::Owner, library.id))?;
    Ok((library, owner))
}

/// 소유자가 자신의 도서관에 관리자를 등록한다. 도서관당 관리자는 한 명만 허용된다.
pub fn onboard_admin(session: &mut dyn Session, owner: &User, email: &str) -> Result<(Library, User)> {
    let email = require_email(email)?;
    match owner.role {
        Role::Owner => {}
        Role::Admin | Role::Reader => {
            return Err(CirculationError::Forbidden("only owner can onboard an admin".to_owned()));
        }
    }

    let library = library_of(session, owner)?;
    ensure_new_email(session, email)?;
    if !session.find_users(library.id, Role::Admin)?.is_empty() {
        return Err(CirculationError::Conflict("only one admin is allowed".to_owned()));
    }

    let admin = session.insert_user(&NewUser::new(email, Role::Admin, library.id))?;
    Ok((library, admin))
}

/// 관리자(혹은 소유자)가 자신의 도서관에 독자를 등록한다.
pub fn onboard_reader(session: &mut dyn Session, onboarder: &User, email: &str) -> Result<(Library, User)> {
    let email = require_email(email)?;
    match onboarder.role {
        Role::Admin | Role::Owner => {}
        Role::Reader => {
            return Err(CirculationError::Forbidden("readers cannot onboard other readers".to_owned()));
        }
    }

    let library = library_of(session, onboarder)?;
    ensure_new_email(session, email)?;

    let reader = session.insert_user(&NewUser::new(email, Role::Reader, library.id))?;
    Ok((library, reader))
}

/// 사용자가 속한 도서관의 특정 역할 사용자 목록
pub fn members(session: &mut dyn Session, user: &User, role: Role) -> Result<Vec<User>> {
    session.find_users(user.library_id, role)
}
