use crate::models::user::{self, Role};
use migration::Migrator;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Inserts an active user; the email is derived from `name`, so names must be unique per db.
pub async fn seed_user(db: &DatabaseConnection, name: &str, role: Role) -> user::Model {
    let email = format!("{}@hostel.test", name.to_lowercase().replace(' ', "."));
    user::Model::create(db, name, &email, role)
        .await
        .expect("Failed to seed user")
}
