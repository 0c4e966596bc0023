use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{PaginatorTrait, QueryOrder};
use serde::Serialize;
use std::fmt;

use super::attendance_record::AttendanceStatus;
use crate::error::{StoreError, StoreResult};

pub const DEFAULT_TITLE: &str = "Daily Attendance";
pub const DEFAULT_DURATION_HOURS: f64 = 24.0;
pub const DEFAULT_LATE_AFTER_MINUTES: i32 = 480;

/// A time-windowed check-in session.
///
/// `active` starts out true and is flipped to false exactly once, by
/// reconciliation. Sessions are never deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub created_by: i64,
    pub start_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_hours: f64,
    pub late_after_minutes: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id"
    )]
    Creator,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Where a session sits in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Active, but `start_at` is still in the future.
    Scheduled,
    Open,
    /// Past `expires_at`, still waiting for the absent backfill.
    ClosedPendingReconciliation,
    Reconciled,
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindowState::Scheduled => "not open yet",
            WindowState::Open => "open",
            WindowState::ClosedPendingReconciliation => "expired",
            WindowState::Reconciled => "closed",
        };
        f.write_str(s)
    }
}

/// Input for [`Model::create`].
#[derive(Debug, Clone)]
pub struct NewSession {
    pub title: String,
    pub created_by: i64,
    pub start_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub late_after_minutes: i32,
}

impl NewSession {
    pub fn validate(&self) -> StoreResult<()> {
        if self.expires_at <= self.start_at {
            return Err(StoreError::Validation(
                "expires_at must be after start_at".into(),
            ));
        }
        if self.late_after_minutes < 0 {
            return Err(StoreError::Validation(
                "late_after_minutes must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Listing filters for [`Model::list`]. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct ListSessions {
    pub page: u64,
    pub per_page: u64,
    pub active: Option<bool>,
    pub query: Option<String>,
}

impl Model {
    pub async fn create<C>(db: &C, new: NewSession) -> StoreResult<Model>
    where
        C: ConnectionTrait,
    {
        new.validate()?;

        let duration_hours =
            (new.expires_at - new.start_at).num_milliseconds() as f64 / 3_600_000.0;

        let session = ActiveModel {
            title: Set(new.title),
            created_by: Set(new.created_by),
            start_at: Set(new.start_at),
            expires_at: Set(new.expires_at),
            duration_hours: Set(duration_hours),
            late_after_minutes: Set(new.late_after_minutes),
            active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        Ok(session.insert(db).await?)
    }

    pub async fn get<C>(db: &C, id: i64) -> StoreResult<Model>
    where
        C: ConnectionTrait,
    {
        Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Session plus its creator, when the creator row still resolves.
    pub async fn get_with_creator<C>(
        db: &C,
        id: i64,
    ) -> StoreResult<(Model, Option<super::user::Model>)>
    where
        C: ConnectionTrait,
    {
        Entity::find_by_id(id)
            .find_also_related(super::user::Entity)
            .one(db)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Active sessions whose window closed strictly before `now`.
    pub async fn find_expired_active<C>(db: &C, now: DateTime<Utc>) -> StoreResult<Vec<Model>>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::Active.eq(true))
            .filter(Column::ExpiresAt.lt(now))
            .all(db)
            .await?)
    }

    /// Marks the session closed. Repeating the call is a no-op.
    pub async fn deactivate<C>(db: &C, id: i64) -> StoreResult<()>
    where
        C: ConnectionTrait,
    {
        let res = Entity::update_many()
            .col_expr(Column::Active, Expr::value(false))
            .filter(Column::Id.eq(id))
            .exec(db)
            .await?;

        if res.rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Newest sessions first. Returns the page and the total match count.
    pub async fn list<C>(db: &C, params: &ListSessions) -> StoreResult<(Vec<Model>, u64)>
    where
        C: ConnectionTrait,
    {
        let mut sel = Entity::find();
        if let Some(active) = params.active {
            sel = sel.filter(Column::Active.eq(active));
        }
        if let Some(q) = params.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            sel = sel.filter(Column::Title.contains(q));
        }
        let sel = sel
            .order_by_desc(Column::StartAt)
            .order_by_desc(Column::Id);

        let per_page = params.per_page.max(1);
        let page_index = params.page.saturating_sub(1);
        // SQLite binds OFFSET as a signed 64-bit integer.
        if per_page
            .checked_mul(page_index)
            .is_none_or(|offset| offset > i64::MAX as u64)
        {
            return Err(StoreError::Validation("page is out of range".into()));
        }

        let paginator = sel.paginate(db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page_index).await?;
        Ok((rows, total))
    }

    /// Instant after which a check-in counts as late.
    pub fn late_threshold(&self) -> DateTime<Utc> {
        self.start_at + Duration::minutes(i64::from(self.late_after_minutes))
    }

    /// `Late` only when strictly past the threshold.
    pub fn status_at(&self, now: DateTime<Utc>) -> AttendanceStatus {
        if now > self.late_threshold() {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        }
    }

    pub fn window_state(&self, now: DateTime<Utc>) -> WindowState {
        if !self.active {
            WindowState::Reconciled
        } else if now > self.expires_at {
            WindowState::ClosedPendingReconciliation
        } else if now < self.start_at {
            WindowState::Scheduled
        } else {
            WindowState::Open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use crate::test_utils::{seed_user, setup_test_db};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 8, 8, 0, 0).unwrap()
    }

    fn new_session(created_by: i64, start: DateTime<Utc>, hours: i64) -> NewSession {
        NewSession {
            title: "Morning roll call".into(),
            created_by,
            start_at: start,
            expires_at: start + Duration::hours(hours),
            late_after_minutes: 30,
        }
    }

    #[tokio::test]
    async fn create_rejects_window_that_does_not_move_forward() {
        let db = setup_test_db().await;
        let warden = seed_user(&db, "warden", Role::Warden).await;

        let mut bad = new_session(warden.id, t0(), 1);
        bad.expires_at = bad.start_at;
        let err = Model::create(&db, bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let ok = Model::create(&db, new_session(warden.id, t0(), 2)).await.unwrap();
        assert!(ok.active);
        assert_eq!(ok.expires_at, t0() + Duration::hours(2));
        assert!((ok.duration_hours - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn get_unknown_session_is_not_found() {
        let db = setup_test_db().await;
        let err = Model::get(&db, 999).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(999)));
    }

    #[tokio::test]
    async fn find_expired_active_uses_strict_expiry_and_skips_closed() {
        let db = setup_test_db().await;
        let warden = seed_user(&db, "warden", Role::Warden).await;

        let expired = Model::create(&db, new_session(warden.id, t0(), 1)).await.unwrap();
        let closed = Model::create(&db, new_session(warden.id, t0(), 1)).await.unwrap();
        let running = Model::create(&db, new_session(warden.id, t0(), 5)).await.unwrap();
        Model::deactivate(&db, closed.id).await.unwrap();

        let at_expiry = Model::find_expired_active(&db, t0() + Duration::hours(1))
            .await
            .unwrap();
        assert!(at_expiry.is_empty());

        let later = Model::find_expired_active(&db, t0() + Duration::hours(2))
            .await
            .unwrap();
        let ids: Vec<i64> = later.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![expired.id]);
        assert!(!ids.contains(&running.id));
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let db = setup_test_db().await;
        let warden = seed_user(&db, "warden", Role::Warden).await;
        let s = Model::create(&db, new_session(warden.id, t0(), 1)).await.unwrap();

        Model::deactivate(&db, s.id).await.unwrap();
        Model::deactivate(&db, s.id).await.unwrap();
        assert!(!Model::get(&db, s.id).await.unwrap().active);

        let err = Model::deactivate(&db, s.id + 100).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let db = setup_test_db().await;
        let warden = seed_user(&db, "warden", Role::Warden).await;
        for i in 0..3 {
            let mut s = new_session(warden.id, t0() + Duration::days(i), 1);
            s.title = format!("Roll call {i}");
            Model::create(&db, s).await.unwrap();
        }
        let mut other = new_session(warden.id, t0(), 1);
        other.title = "Fire drill".into();
        let drill = Model::create(&db, other).await.unwrap();
        Model::deactivate(&db, drill.id).await.unwrap();

        let (page, total) = Model::list(
            &db,
            &ListSessions {
                page: 1,
                per_page: 2,
                active: Some(true),
                query: Some("roll".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].title, "Roll call 2");

        let (inactive, total) = Model::list(
            &db,
            &ListSessions {
                page: 1,
                per_page: 10,
                active: Some(false),
                query: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(inactive[0].id, drill.id);
    }

    #[tokio::test]
    async fn list_rejects_page_whose_offset_overflows() {
        let db = setup_test_db().await;
        let warden = seed_user(&db, "warden", Role::Warden).await;
        Model::create(&db, new_session(warden.id, t0(), 1)).await.unwrap();

        let params = ListSessions {
            page: u64::MAX,
            per_page: 20,
            active: None,
            query: None,
        };
        let err = Model::list(&db, &params).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let past_end = ListSessions {
            page: 2,
            per_page: 20,
            ..params
        };
        let (rows, total) = Model::list(&db, &past_end).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn get_with_creator_resolves_creator() {
        let db = setup_test_db().await;
        let warden = seed_user(&db, "warden", Role::Warden).await;
        let s = Model::create(&db, new_session(warden.id, t0(), 1)).await.unwrap();

        let (session, creator) = Model::get_with_creator(&db, s.id).await.unwrap();
        assert_eq!(session.id, s.id);
        assert_eq!(creator.map(|c| c.id), Some(warden.id));
    }

    #[test]
    fn lateness_boundary_is_strict() {
        let s = Model {
            id: 1,
            title: "t".into(),
            created_by: 1,
            start_at: t0(),
            expires_at: t0() + Duration::hours(1),
            duration_hours: 1.0,
            late_after_minutes: 30,
            active: true,
            created_at: t0(),
        };
        assert_eq!(s.status_at(t0() + Duration::minutes(30)), AttendanceStatus::Present);
        assert_eq!(
            s.status_at(t0() + Duration::minutes(30) + Duration::seconds(1)),
            AttendanceStatus::Late
        );
    }

    #[test]
    fn window_state_follows_lifecycle() {
        let mut s = Model {
            id: 1,
            title: "t".into(),
            created_by: 1,
            start_at: t0(),
            expires_at: t0() + Duration::hours(1),
            duration_hours: 1.0,
            late_after_minutes: 30,
            active: true,
            created_at: t0(),
        };
        assert_eq!(s.window_state(t0() - Duration::minutes(1)), WindowState::Scheduled);
        assert_eq!(s.window_state(t0()), WindowState::Open);
        assert_eq!(s.window_state(s.expires_at), WindowState::Open);
        assert_eq!(
            s.window_state(s.expires_at + Duration::seconds(1)),
            WindowState::ClosedPendingReconciliation
        );
        s.active = false;
        assert_eq!(s.window_state(t0()), WindowState::Reconciled);
    }
}
