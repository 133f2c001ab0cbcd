use uuid::Uuid;

use crate::models::Case;

/// Who is acting on a record. Staff reach every case, everyone else only
/// the cases they are responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub staff: bool,
}

impl Actor {
    pub fn new(user_id: Uuid, staff: bool) -> Self {
        Self { user_id, staff }
    }

    pub fn can_access(&self, case: &Case) -> bool {
        self.staff || case.responsible_id == self.user_id
    }

    /// Responsible-user filter to apply to case queries, `None` for staff.
    pub fn case_scope(&self) -> Option<Uuid> {
        (!self.staff).then_some(self.user_id)
    }
}
