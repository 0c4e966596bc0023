use std::collections::HashSet;

use async_trait::async_trait;
use db::models::attendance_session::Model as AttendanceSession;
use db::models::user::{Model as User, Role};
use sea_orm::DatabaseConnection;

use crate::error::AttendanceResult;

/// Source of the participants expected to hold an outcome for a session.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn participants(&self, session: &AttendanceSession) -> AttendanceResult<Vec<i64>>;
}

/// Every active student, optionally narrowed to an explicit cohort.
#[derive(Debug, Clone)]
pub struct StudentRoster {
    db: DatabaseConnection,
    cohort: Option<HashSet<i64>>,
}

impl StudentRoster {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, cohort: None }
    }

    pub fn with_cohort(db: DatabaseConnection, cohort: impl IntoIterator<Item = i64>) -> Self {
        Self {
            db,
            cohort: Some(cohort.into_iter().collect()),
        }
    }
}

#[async_trait]
impl RosterProvider for StudentRoster {
    async fn participants(&self, _session: &AttendanceSession) -> AttendanceResult<Vec<i64>> {
        let mut ids = User::active_ids_with_role(&self.db, Role::Student).await?;
        if let Some(cohort) = &self.cohort {
            ids.retain(|id| cohort.contains(id));
        }
        Ok(ids)
    }
}
