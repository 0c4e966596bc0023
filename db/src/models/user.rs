use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::QuerySelect;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identity projection of a hostel resident or staff member.
///
/// Accounts are managed elsewhere; this table only carries what the
/// attendance subsystem needs: a role for access checks and the active
/// flag that decides roster membership.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Hostel-wide role carried by every identity.
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
pub enum Role {
    #[sea_orm(string_value = "admin")]
    Admin,

    #[sea_orm(string_value = "warden")]
    Warden,

    #[sea_orm(string_value = "student")]
    Student,
}

impl Role {
    /// Admins and wardens may run attendance sessions.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin | Role::Warden)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
    #[sea_orm(has_many = "super::attendance_session::Entity")]
    CreatedSessions,
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create<C>(db: &C, name: &str, email: &str, role: Role) -> Result<Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let user = ActiveModel {
            name: Set(name.to_owned()),
            email: Set(email.to_owned()),
            role: Set(role),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        user.insert(db).await
    }

    pub async fn get_by_id<C>(db: &C, id: i64) -> Result<Option<Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::find_by_id(id).one(db).await
    }

    /// Ids of every active user holding `role`.
    pub async fn active_ids_with_role<C>(db: &C, role: Role) -> Result<Vec<i64>, DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::Role.eq(role))
            .filter(Column::IsActive.eq(true))
            .into_tuple::<i64>()
            .all(db)
            .await
    }

    pub async fn set_active<C>(db: &C, id: i64, is_active: bool) -> Result<Model, DbErr>
    where
        C: ConnectionTrait,
    {
        let user = ActiveModel {
            id: Set(id),
            is_active: Set(is_active),
            ..Default::default()
        };
        user.update(db).await
    }
}
