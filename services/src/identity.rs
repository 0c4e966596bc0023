use db::models::user::Role;

/// The authenticated caller, as vouched for by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }
}
