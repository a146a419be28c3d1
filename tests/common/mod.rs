#![allow(dead_code)]

use library_circulation::circulation::{BookFields, BookInventory, User};
use library_circulation::{Coordinator, MemoryStore, Notice, Notifier, NotifyError};
use std::sync::{Arc, Mutex};

/// 보낸 알림을 기록하는 발송기
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(u64, Notice)>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(u64, Notice)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: u64, notice: &Notice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((user_id, notice.clone()));
        Ok(())
    }
}

/// 항상 실패하는 발송기
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _user_id: u64, _notice: &Notice) -> Result<(), NotifyError> {
        Err(NotifyError("smtp unavailable".to_owned()))
    }
}

/// 소유자, 관리자, 독자 한 명씩 등록된 도서관
pub struct Fixture {
    pub coordinator: Coordinator<MemoryStore>,
    pub library_id: u64,
    pub owner: User,
    pub admin: User,
    pub reader: User,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_coordinator(Coordinator::new(MemoryStore::new()))
    }

    pub fn with_coordinator(coordinator: Coordinator<MemoryStore>) -> Self {
        let (library, owner) = coordinator.register_library("Central", "owner@central.org").unwrap();
        let admin = coordinator.onboard_admin(owner.id(), "admin@central.org").unwrap();
        let reader = coordinator.onboard_reader(admin.id(), "reader@central.org").unwrap();

        Self { coordinator, library_id: library.id(), owner, admin, reader }
    }

    pub fn book(&self, title: &str, copies: u32) -> BookInventory {
        self.coordinator
            .acquire_title(self.library_id, &BookFields::titled(title), copies)
            .unwrap()
    }

    pub fn another_reader(&self, email: &str) -> User {
        self.coordinator.onboard_reader(self.admin.id(), email).unwrap()
    }

    /// 대출 요청과 승인까지 진행한다.
    pub fn issue(&self, reader: &User, isbn: u64) {
        let event = self.coordinator.submit_issue_request(reader.id(), isbn).unwrap();
        self.coordinator.approve(event.req_id(), self.admin.id()).unwrap();
    }

    pub fn copies(&self, isbn: u64) -> (u32, u32) {
        let book = self.coordinator.book(isbn).unwrap();
        book.check_invariant().unwrap();
        (book.total_copies(), book.available_copies())
    }
}
