use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, Func, OnConflict};
use sea_orm::{FromQueryResult, QueryOrder, QuerySelect, TryInsertResult};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{StoreError, StoreResult, is_fk_violation, is_unique_violation};

/// Rows per bulk statement; keeps well under SQLite's bound-parameter limit.
const BULK_CHUNK: usize = 500;

/// One outcome per participant per session. Rows are written once and never
/// updated; the `(session_id, user_id)` unique index is the ledger's
/// correctness guarantee.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    /// UTC calendar date of the moment the row was produced.
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    /// UTC wall-clock time of the check-in; `None` for synthesized absences.
    pub check_in_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AttendanceStatus {
    #[sea_orm(string_value = "present")]
    Present,

    #[sea_orm(string_value = "late")]
    Late,

    #[sea_orm(string_value = "absent")]
    Absent,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A ledger row waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub session_id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in_time: Option<NaiveTime>,
}

impl NewRecord {
    /// Interactive check-in stamped with the date and second-precision time of `now`.
    pub fn checked_in(
        session_id: i64,
        user_id: i64,
        status: AttendanceStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let time = now.time();
        Self {
            session_id,
            user_id,
            date: now.date_naive(),
            status,
            check_in_time: Some(time.with_nanosecond(0).unwrap_or(time)),
        }
    }

    /// Synthesized absence; carries no check-in time.
    pub fn absent(session_id: i64, user_id: i64, date: NaiveDate) -> Self {
        Self {
            session_id,
            user_id,
            date,
            status: AttendanceStatus::Absent,
            check_in_time: None,
        }
    }

    fn into_active_model(self) -> ActiveModel {
        ActiveModel {
            session_id: Set(self.session_id),
            user_id: Set(self.user_id),
            date: Set(self.date),
            status: Set(self.status),
            check_in_time: Set(self.check_in_time),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
    }
}

/// Per-participant attendance aggregate over a trailing window of days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub total: i64,
    pub present: i64,
    pub late: i64,
    pub absent: i64,
    /// `present / total` as a rounded percentage; late check-ins do not count.
    pub attendance_percentage: i64,
}

#[derive(Debug, FromQueryResult)]
struct StatusCount {
    status: AttendanceStatus,
    cnt: i64,
}

impl Model {
    /// Writes a single record. A second write for the same pair fails with
    /// [`StoreError::Duplicate`].
    pub async fn insert_one<C>(db: &C, record: NewRecord) -> StoreResult<Model>
    where
        C: ConnectionTrait,
    {
        let (session_id, user_id) = (record.session_id, record.user_id);
        record
            .into_active_model()
            .insert(db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate {
                        session_id,
                        user_id,
                    }
                } else if is_fk_violation(&e) {
                    StoreError::UnknownUser(user_id)
                } else {
                    StoreError::Db(e)
                }
            })
    }

    /// Bulk insert that skips rows whose pair already exists.
    ///
    /// Returns the number of rows actually written.
    pub async fn insert_many<C>(db: &C, records: Vec<NewRecord>) -> StoreResult<u64>
    where
        C: ConnectionTrait,
    {
        let mut inserted = 0;
        let mut records = records.into_iter().peekable();

        while records.peek().is_some() {
            let chunk: Vec<ActiveModel> = records
                .by_ref()
                .take(BULK_CHUNK)
                .map(NewRecord::into_active_model)
                .collect();

            let res = Entity::insert_many(chunk)
                .on_conflict(
                    OnConflict::columns([Column::SessionId, Column::UserId])
                        .do_nothing()
                        .to_owned(),
                )
                .do_nothing()
                .exec_without_returning(db)
                .await?;

            if let TryInsertResult::Inserted(n) = res {
                inserted += n;
            }
        }

        Ok(inserted)
    }

    pub async fn find_by_session<C>(db: &C, session_id: i64) -> StoreResult<Vec<Model>>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::Id)
            .all(db)
            .await?)
    }

    /// Records of a session joined with the participant, when it still exists.
    pub async fn find_by_session_with_users<C>(
        db: &C,
        session_id: i64,
    ) -> StoreResult<Vec<(Model, Option<super::user::Model>)>>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .find_also_related(super::user::Entity)
            .order_by_asc(Column::Id)
            .all(db)
            .await?)
    }

    pub async fn find_one<C>(db: &C, session_id: i64, user_id: i64) -> StoreResult<Option<Model>>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .filter(Column::UserId.eq(user_id))
            .one(db)
            .await?)
    }

    /// Counts a participant's outcomes dated within `since_days` of `today`
    /// (inclusive on both ends).
    pub async fn count_and_status_for_participant<C>(
        db: &C,
        user_id: i64,
        since_days: u32,
        today: NaiveDate,
    ) -> StoreResult<AttendanceSummary>
    where
        C: ConnectionTrait,
    {
        let since = today
            .checked_sub_signed(Duration::days(i64::from(since_days)))
            .ok_or_else(|| StoreError::Validation("summary window is too wide".into()))?;

        let rows: Vec<StatusCount> = Entity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Expr::expr(Func::count(Expr::col(Column::Id))), "cnt")
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Date.gte(since))
            .filter(Column::Date.lte(today))
            .group_by(Column::Status)
            .into_model::<StatusCount>()
            .all(db)
            .await?;

        let mut summary = AttendanceSummary::default();
        for row in rows {
            match row.status {
                AttendanceStatus::Present => summary.present += row.cnt,
                AttendanceStatus::Late => summary.late += row.cnt,
                AttendanceStatus::Absent => summary.absent += row.cnt,
            }
            summary.total += row.cnt;
        }
        if summary.total > 0 {
            summary.attendance_percentage =
                ((summary.present as f64 / summary.total as f64) * 100.0).round() as i64;
        }
        Ok(summary)
    }
}
