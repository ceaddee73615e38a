#[cfg(test)]
pub mod test_utils {
    use crate::db::{
        STUDENT_ROLE_ID, TEACHER_ROLE_ID, create_profile, create_training_program, create_user,
    };
    use crate::error::AppError;
    use crate::identity::{ProfileId, ProgramId, UserId};
    use crate::models::NewProfile;
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::sync::Once;
    use tracing::log::LevelFilter;

    static INIT: Once = Once::new();

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        programs: Vec<TestProgram>,
        on_disk: bool,
    }

    pub struct TestUser {
        pub username: String,
        pub full_name: Option<String>,
        pub role_id: i64,
        pub with_profile: bool,
    }

    pub struct TestProgram {
        pub code: String,
        pub name: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// A student account with a profile.
        pub fn student(mut self, username: &str, full_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                full_name: full_name.map(String::from),
                role_id: STUDENT_ROLE_ID,
                with_profile: true,
            });
            self
        }

        /// A student account that was never given a profile.
        pub fn orphan_student(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                full_name: None,
                role_id: STUDENT_ROLE_ID,
                with_profile: false,
            });
            self
        }

        pub fn teacher(mut self, username: &str, full_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                full_name: full_name.map(String::from),
                role_id: TEACHER_ROLE_ID,
                with_profile: false,
            });
            self
        }

        pub fn program(mut self, code: &str, name: &str) -> Self {
            self.programs.push(TestProgram {
                code: code.to_string(),
                name: name.to_string(),
            });
            self
        }

        /// Backs the database with a temporary file instead of shared memory,
        /// so concurrent writers go through SQLite's file locking.
        pub fn on_disk(mut self) -> Self {
            self.on_disk = true;
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            let (options, file) = if self.on_disk {
                let path = std::env::temp_dir()
                    .join(format!("student-records-{}.db", uuid::Uuid::new_v4()));
                let options = SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true)
                    .foreign_keys(true);
                (options, Some(path))
            } else {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
                (options, None)
            };

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, UserId> = HashMap::new();
            let mut profile_id_map: HashMap<String, ProfileId> = HashMap::new();
            let mut program_id_map: HashMap<String, ProgramId> = HashMap::new();

            for user in &self.users {
                let user_id =
                    create_user(&pool, &user.username, user.full_name.as_deref(), user.role_id)
                        .await?;

                if user.with_profile {
                    let profile = create_profile(
                        &pool,
                        &user_id,
                        &NewProfile {
                            full_name: user.full_name.clone(),
                            ..NewProfile::default()
                        },
                    )
                    .await?;
                    profile_id_map.insert(user.username.clone(), profile.id);
                }

                user_id_map.insert(user.username.clone(), user_id);
            }

            for program in &self.programs {
                let program_id = create_training_program(&pool, &program.name, &program.code).await?;
                program_id_map.insert(program.code.clone(), program_id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                profile_id_map,
                program_id_map,
                file,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, UserId>,
        pub profile_id_map: HashMap<String, ProfileId>,
        pub program_id_map: HashMap<String, ProgramId>,
        file: Option<PathBuf>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> UserId {
            self.user_id_map[username].clone()
        }

        pub fn profile_id(&self, username: &str) -> ProfileId {
            self.profile_id_map[username].clone()
        }

        pub fn program_id(&self, code: &str) -> ProgramId {
            self.program_id_map[code].clone()
        }

        pub async fn count_rows(&self, table: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .unwrap()
        }

        /// Total rows across every table the service writes to.
        pub async fn count_writable_rows(&self) -> i64 {
            let mut total = 0;
            for table in [
                "users",
                "student_profiles",
                "training_programs",
                "student_training_programs",
                "teacher_student_relationships",
                "technical_tags",
            ] {
                total += self.count_rows(table).await;
            }
            total
        }
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            if let Some(path) = &self.file {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .teacher("teacher_wang", Some("Wang Li"))
            .student("student_chen", Some("Chen Jie"))
            .student("student_liu", Some("Liu Yang"))
            .student("student_zhao", Some("Zhao Min"))
            .orphan_student("student_orphan")
            .program("CS-2025", "Computer Science 2025")
            .program("SE-2025", "Software Engineering 2025")
            .build()
            .await
            .unwrap()
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = crate::build_rocket(test_db.pool.clone());
        let client = Client::tracked(rocket).await.unwrap();
        (client, test_db)
    }
}
