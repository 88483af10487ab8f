#![allow(clippy::missing_errors_doc)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use knowledge_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, KnowledgeRepository, Question, QuestionId,
    QuestionInput, QuestionStatus, Response, ResponseId, ResponseInput, ResponseStatus, User,
    UserId, UserInput,
};
use rusqlite::{params, Connection, OptionalExtension};

const KNOWLEDGE_MIGRATION_VERSION: i64 = 1;

const SCHEMA_KNOWLEDGE_V1: &str = r"
CREATE TABLE IF NOT EXISTS knowledge_users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  username TEXT NOT NULL UNIQUE,
  first_name TEXT NOT NULL DEFAULT '',
  last_name TEXT NOT NULL DEFAULT '',
  email TEXT NOT NULL DEFAULT '',
  is_staff INTEGER NOT NULL DEFAULT 0 CHECK (is_staff IN (0, 1)),
  is_superuser INTEGER NOT NULL DEFAULT 0 CHECK (is_superuser IN (0, 1))
);

CREATE TABLE IF NOT EXISTS knowledge_questions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER,
  name TEXT,
  email TEXT,
  title TEXT NOT NULL,
  body TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'private' CHECK (status IN ('public', 'private', 'internal')),
  accepted_response_id INTEGER,
  added TEXT NOT NULL,
  lastchanged TEXT NOT NULL,
  FOREIGN KEY (user_id) REFERENCES knowledge_users(id),
  FOREIGN KEY (accepted_response_id) REFERENCES knowledge_responses(id)
);

CREATE TABLE IF NOT EXISTS knowledge_responses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  question_id INTEGER NOT NULL,
  user_id INTEGER,
  name TEXT,
  email TEXT,
  body TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'inherit' CHECK (
    status IN ('public', 'private', 'internal', 'inherit')
  ),
  added TEXT NOT NULL,
  lastchanged TEXT NOT NULL,
  FOREIGN KEY (question_id) REFERENCES knowledge_questions(id),
  FOREIGN KEY (user_id) REFERENCES knowledge_users(id)
);

CREATE TRIGGER IF NOT EXISTS trg_questions_accepted_response_owned
BEFORE UPDATE OF accepted_response_id ON knowledge_questions
WHEN NEW.accepted_response_id IS NOT NULL
  AND NOT EXISTS (
    SELECT 1 FROM knowledge_responses
    WHERE id = NEW.accepted_response_id AND question_id = NEW.id
  )
BEGIN
  SELECT RAISE(FAIL, 'accepted response must belong to the question');
END;

CREATE INDEX IF NOT EXISTS idx_knowledge_responses_question
  ON knowledge_responses(question_id, id);
CREATE INDEX IF NOT EXISTS idx_knowledge_questions_status
  ON knowledge_questions(status, id);
";

const QUESTION_COLUMNS: &str = "id, user_id, name, email, title, body, status, \
     accepted_response_id, added, lastchanged";

const RESPONSE_COLUMNS: &str =
    "id, question_id, user_id, name, email, body, status, added, lastchanged";

pub struct SqliteKnowledgeStore {
    conn: Connection,
}

impl SqliteKnowledgeStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        ensure_schema_compatibility(&self.conn)?;

        self.conn
            .execute_batch(SCHEMA_KNOWLEDGE_V1)
            .context("failed to apply knowledge schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![KNOWLEDGE_MIGRATION_VERSION, now],
            )
            .context("failed to register knowledge schema migration")?;

        if inserted > 0 {
            tracing::info!(
                version = KNOWLEDGE_MIGRATION_VERSION,
                "applied knowledge schema"
            );
        }

        Ok(())
    }

    pub fn create_user(&mut self, input: &UserInput) -> Result<User> {
        input
            .validate()
            .map_err(|err| anyhow!("user validation failed: {err}"))?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start user transaction")?;
        tx.execute(
            "INSERT INTO knowledge_users(username, first_name, last_name, email, is_staff, is_superuser)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                input.username,
                input.first_name,
                input.last_name,
                input.email,
                bool_to_sql(input.is_staff),
                bool_to_sql(input.is_superuser),
            ],
        )
        .with_context(|| format!("failed to insert user {}", input.username))?;
        let id = UserId(tx.last_insert_rowid());
        tx.commit().context("failed to commit user transaction")?;

        tracing::debug!(user = %id, username = %input.username, "created user");
        Ok(input.clone().into_user(id))
    }

    pub fn create_question(&mut self, input: QuestionInput) -> Result<Question> {
        input
            .validate()
            .map_err(|err| anyhow!("question validation failed: {err}"))?;
        if let Some(user) = input.user {
            self.require_user(user)?;
        }

        let now = now_utc();
        let stamp = format_rfc3339(now).map_err(|err| anyhow!(err.to_string()))?;
        let status = input.status.unwrap_or_default();

        let tx = self
            .conn
            .transaction()
            .context("failed to start question transaction")?;
        tx.execute(
            "INSERT INTO knowledge_questions(
                user_id, name, email, title, body, status, accepted_response_id, added, lastchanged
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7)",
            params![
                input.user.map(|user| user.0),
                input.name,
                input.email,
                input.title,
                input.body,
                status.as_str(),
                stamp,
            ],
        )
        .context("failed to insert question")?;
        let id = QuestionId(tx.last_insert_rowid());
        tx.commit().context("failed to commit question transaction")?;

        tracing::debug!(question = %id, status = status.as_str(), "created question");
        Question::create(id, input, now).map_err(|err| anyhow!(err.to_string()))
    }

    pub fn create_response(&mut self, input: ResponseInput) -> Result<Response> {
        input
            .validate()
            .map_err(|err| anyhow!("response validation failed: {err}"))?;
        self.require_question(input.question)?;
        if let Some(user) = input.user {
            self.require_user(user)?;
        }

        let now = now_utc();
        let stamp = format_rfc3339(now).map_err(|err| anyhow!(err.to_string()))?;
        let status = input.status.unwrap_or_default();

        let tx = self
            .conn
            .transaction()
            .context("failed to start response transaction")?;
        tx.execute(
            "INSERT INTO knowledge_responses(
                question_id, user_id, name, email, body, status, added, lastchanged
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                input.question.0,
                input.user.map(|user| user.0),
                input.name,
                input.email,
                input.body,
                status.as_str(),
                stamp,
            ],
        )
        .context("failed to insert response")?;
        let id = ResponseId(tx.last_insert_rowid());
        tx.commit().context("failed to commit response transaction")?;

        tracing::debug!(
            response = %id,
            question = %input.question,
            status = status.as_str(),
            "created response"
        );
        Response::create(id, input, now).map_err(|err| anyhow!(err.to_string()))
    }

    pub fn set_question_status(
        &mut self,
        id: QuestionId,
        status: QuestionStatus,
    ) -> Result<Question> {
        let mut question = self.require_question(id)?;
        question.set_status(status);

        let stamp =
            format_rfc3339(question.lastchanged).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "UPDATE knowledge_questions SET status = ?1, lastchanged = ?2 WHERE id = ?3",
                params![question.status.as_str(), stamp, id.0],
            )
            .with_context(|| format!("failed to update status of question {id}"))?;

        Ok(question)
    }

    pub fn set_response_status(
        &mut self,
        id: ResponseId,
        status: ResponseStatus,
    ) -> Result<Response> {
        let mut response = self.require_response(id)?;
        response.set_status(status);

        let stamp =
            format_rfc3339(response.lastchanged).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "UPDATE knowledge_responses SET status = ?1, lastchanged = ?2 WHERE id = ?3",
                params![response.status.as_str(), stamp, id.0],
            )
            .with_context(|| format!("failed to update status of response {id}"))?;

        Ok(response)
    }

    /// Sets or clears the accepted response of a question.
    ///
    /// A response from another question is rejected before anything is written.
    pub fn accept_response(
        &mut self,
        question_id: QuestionId,
        response_id: Option<ResponseId>,
    ) -> Result<Question> {
        let mut question = self.require_question(question_id)?;
        let response = match response_id {
            Some(id) => Some(self.require_response(id)?),
            None => None,
        };

        let before = question.accepted_response;
        question
            .accept(response.as_ref())
            .map_err(|err| anyhow!("accept failed: {err}"))?;
        if question.accepted_response == before {
            return Ok(question);
        }

        let stamp =
            format_rfc3339(question.lastchanged).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "UPDATE knowledge_questions SET accepted_response_id = ?1, lastchanged = ?2
                 WHERE id = ?3",
                params![
                    question.accepted_response.map(|response| response.0),
                    stamp,
                    question_id.0
                ],
            )
            .with_context(|| {
                format!("failed to update accepted response of question {question_id}")
            })?;

        Ok(question)
    }

    fn require_user(&self, id: UserId) -> Result<User> {
        self.user(id)?.ok_or_else(|| anyhow!("user {id} not found"))
    }

    fn require_question(&self, id: QuestionId) -> Result<Question> {
        self.question(id)?
            .ok_or_else(|| anyhow!("question {id} not found"))
    }

    fn require_response(&self, id: ResponseId) -> Result<Response> {
        self.response(id)?
            .ok_or_else(|| anyhow!("response {id} not found"))
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl KnowledgeRepository for SqliteKnowledgeStore {
    type Error = anyhow::Error;

    fn user(&self, id: UserId) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, username, first_name, last_name, email, is_staff, is_superuser
                 FROM knowledge_users WHERE id = ?1",
                params![id.0],
                parse_user_row,
            )
            .optional()
            .with_context(|| format!("failed to load user {id}"))
    }

    fn question(&self, id: QuestionId) -> Result<Option<Question>> {
        self.conn
            .query_row(
                &format!("SELECT {QUESTION_COLUMNS} FROM knowledge_questions WHERE id = ?1"),
                params![id.0],
                parse_question_row,
            )
            .optional()
            .with_context(|| format!("failed to load question {id}"))
    }

    fn response(&self, id: ResponseId) -> Result<Option<Response>> {
        self.conn
            .query_row(
                &format!("SELECT {RESPONSE_COLUMNS} FROM knowledge_responses WHERE id = ?1"),
                params![id.0],
                parse_response_row,
            )
            .optional()
            .with_context(|| format!("failed to load response {id}"))
    }

    fn questions(&self) -> Result<Vec<Question>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {QUESTION_COLUMNS} FROM knowledge_questions ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], parse_question_row)?;
        collect_rows(rows)
    }

    fn responses_for(&self, question: QuestionId) -> Result<Vec<Response>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM knowledge_responses
             WHERE question_id = ?1
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![question.0], parse_response_row)?;
        collect_rows(rows)
    }

    fn has_responses(&self, question: QuestionId) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM knowledge_responses WHERE question_id = ?1 LIMIT 1",
                params![question.0],
                |_| Ok(()),
            )
            .optional()
            .with_context(|| format!("failed to count responses of question {question}"))?
            .is_some();

        Ok(exists)
    }
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        is_staff: row.get::<_, i64>(5)? == 1,
        is_superuser: row.get::<_, i64>(6)? == 1,
    })
}

fn parse_question_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Question> {
    let status_raw: String = row.get(6)?;
    let status = QuestionStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(6, format!("invalid question status: {status_raw}")))?;

    Ok(Question {
        id: QuestionId(row.get(0)?),
        user: row.get::<_, Option<i64>>(1)?.map(UserId),
        name: row.get(2)?,
        email: row.get(3)?,
        title: row.get(4)?,
        body: row.get(5)?,
        status,
        accepted_response: row.get::<_, Option<i64>>(7)?.map(ResponseId),
        added: parse_timestamp(row, 8)?,
        lastchanged: parse_timestamp(row, 9)?,
    })
}

fn parse_response_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Response> {
    let status_raw: String = row.get(6)?;
    let status = ResponseStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(6, format!("invalid response status: {status_raw}")))?;

    Ok(Response {
        id: ResponseId(row.get(0)?),
        question: QuestionId(row.get(1)?),
        user: row.get::<_, Option<i64>>(2)?.map(UserId),
        name: row.get(3)?,
        email: row.get(4)?,
        body: row.get(5)?,
        status,
        added: parse_timestamp(row, 7)?,
        lastchanged: parse_timestamp(row, 8)?,
    })
}

fn parse_timestamp(
    row: &rusqlite::Row<'_>,
    index: usize,
) -> rusqlite::Result<time::OffsetDateTime> {
    let raw: String = row.get(index)?;
    parse_rfc3339_utc(&raw).map_err(|err| invalid_column(index, err.to_string()))
}

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn bool_to_sql(value: bool) -> i64 {
    i64::from(value)
}

/// Rejects pre-existing tables that share a name with the knowledge schema
/// but lack its columns; `CREATE TABLE IF NOT EXISTS` would keep them as-is.
fn ensure_schema_compatibility(conn: &Connection) -> Result<()> {
    let expected: [(&str, &[&str]); 3] = [
        (
            "knowledge_users",
            &["id", "username", "first_name", "last_name", "email", "is_staff", "is_superuser"],
        ),
        (
            "knowledge_questions",
            &[
                "id",
                "user_id",
                "name",
                "email",
                "title",
                "body",
                "status",
                "accepted_response_id",
                "added",
                "lastchanged",
            ],
        ),
        (
            "knowledge_responses",
            &[
                "id",
                "question_id",
                "user_id",
                "name",
                "email",
                "body",
                "status",
                "added",
                "lastchanged",
            ],
        ),
    ];

    for (table, columns) in expected {
        if table_exists(conn, table)? {
            ensure_table_has_columns(conn, table, columns)?;
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1
             FROM sqlite_master
             WHERE type = 'table' AND name = ?1
             LIMIT 1",
            params![table_name],
            |_| Ok(()),
        )
        .optional()
        .context("failed to query sqlite_master")?
        .is_some();

    Ok(exists)
}

fn ensure_table_has_columns(conn: &Connection, table_name: &str, columns: &[&str]) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table_name})"))
        .with_context(|| format!("failed to inspect table_info for {table_name}"))?;
    let mut rows = stmt.query([])?;

    let mut available = Vec::new();
    while let Some(row) = rows.next()? {
        available.push(row.get::<_, String>(1)?);
    }

    for required in columns {
        if !available.iter().any(|candidate| candidate == required) {
            return Err(anyhow!(
                "knowledge schema check failed: missing column {table_name}.{required}"
            ));
        }
    }

    Ok(())
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_core::Viewer;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("unexpected error: {err:#}"),
        }
    }

    fn must_some<T>(value: Option<T>) -> T {
        match value {
            Some(inner) => inner,
            None => panic!("expected Some(..), got None"),
        }
    }

    fn fixture_store() -> SqliteKnowledgeStore {
        let store = must(SqliteKnowledgeStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn user_input(username: &str, first: &str, last: &str, privileged: bool) -> UserInput {
        UserInput {
            username: username.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{username}@example.com"),
            is_staff: privileged,
            is_superuser: false,
        }
    }

    struct Seeded {
        joe: User,
        bob: User,
        admin: User,
        question: Question,
        response: Response,
    }

    fn seed(store: &mut SqliteKnowledgeStore) -> Seeded {
        let joe = must(store.create_user(&user_input("joe", "Joe", "Dirt", false)));
        let bob = must(store.create_user(&user_input("bob", "Bob", "", false)));
        let admin = must(store.create_user(&user_input("admin", "", "", true)));
        let question = must(store.create_question(QuestionInput {
            user: Some(joe.id),
            name: None,
            email: None,
            title: "What time is it?".to_string(),
            body: "The little hand is at 3 and the big hand at 7.".to_string(),
            status: None,
        }));
        let response = must(store.create_response(ResponseInput {
            question: question.id,
            user: Some(admin.id),
            name: None,
            email: None,
            body: "3:35".to_string(),
            status: None,
        }));
        Seeded {
            joe,
            bob,
            admin,
            question,
            response,
        }
    }

    #[test]
    fn migrate_is_idempotent_and_records_version() {
        let store = fixture_store();
        must(store.migrate());

        let count = match store.connection().query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
            params![KNOWLEDGE_MIGRATION_VERSION],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(value) => value,
            Err(err) => panic!("failed to count migrations: {err}"),
        };
        assert_eq!(count, 1);
    }

    #[test]
    fn migrate_fails_on_incompatible_questions_table() {
        let store = must(SqliteKnowledgeStore::open(Path::new(":memory:")));
        let create_result = store.connection().execute_batch(
            "CREATE TABLE knowledge_questions (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL
            );",
        );
        if let Err(err) = create_result {
            panic!("test setup failed: {err}");
        }

        let err = match store.migrate() {
            Ok(()) => panic!("migration should fail on a foreign questions table"),
            Err(err) => err,
        };
        assert!(err
            .to_string()
            .contains("missing column knowledge_questions.user_id"));
    }

    #[test]
    fn created_records_round_trip_with_defaults() {
        let mut store = fixture_store();
        let seeded = seed(&mut store);

        let question = must_some(must(store.question(seeded.question.id)));
        assert_eq!(question, seeded.question);
        assert_eq!(question.status, QuestionStatus::Private);
        assert_eq!(question.accepted_response, None);

        let response = must_some(must(store.response(seeded.response.id)));
        assert_eq!(response, seeded.response);
        assert_eq!(response.status, ResponseStatus::Inherit);

        assert_eq!(must(store.name_of(&question)), "Joe Dirt");
        assert_eq!(must(store.email_of(&question)), "joe@example.com");
    }

    #[test]
    fn anonymous_question_keeps_supplied_identity() {
        let mut store = fixture_store();
        let question = must(store.create_question(QuestionInput {
            user: None,
            name: Some("Joe Dirt".to_string()),
            email: Some("joedirt@example.com".to_string()),
            title: "Where is my cat?".to_string(),
            body: "His name is whiskers.".to_string(),
            status: None,
        }));

        let loaded = must_some(must(store.question(question.id)));
        let owner = must(store.author_of(&loaded));
        assert!(owner.is_none());
        assert_eq!(must(store.name_of(&loaded)), "Joe Dirt");
        assert_eq!(must(store.email_of(&loaded)), "joedirt@example.com");
    }

    #[test]
    fn answered_and_accepted_follow_stored_state() {
        let mut store = fixture_store();
        let joe = must(store.create_user(&user_input("joe", "Joe", "Dirt", false)));
        let question = must(store.create_question(QuestionInput {
            user: Some(joe.id),
            name: None,
            email: None,
            title: "What time is it?".to_string(),
            body: "Watch trouble.".to_string(),
            status: None,
        }));
        assert!(!must(question.answered(&store)));

        let cleared = must(store.accept_response(question.id, None));
        assert!(!cleared.accepted());

        let response = must(store.create_response(ResponseInput {
            question: question.id,
            user: Some(joe.id),
            name: None,
            email: None,
            body: "3:35".to_string(),
            status: None,
        }));
        assert!(must(question.answered(&store)));

        let accepted = must(store.accept_response(question.id, Some(response.id)));
        assert!(accepted.accepted());
        let reloaded = must_some(must(store.question(question.id)));
        assert_eq!(reloaded.accepted_response, Some(response.id));

        let cleared = must(store.accept_response(question.id, None));
        assert!(!cleared.accepted());
        let reloaded = must_some(must(store.question(question.id)));
        assert_eq!(reloaded.accepted_response, None);
    }

    #[test]
    fn accepting_response_from_other_question_is_rejected() {
        let mut store = fixture_store();
        let seeded = seed(&mut store);
        let other = must(store.create_question(QuestionInput {
            user: Some(seeded.bob.id),
            name: None,
            email: None,
            title: "Another".to_string(),
            body: "Different thread.".to_string(),
            status: None,
        }));

        let err = match store.accept_response(other.id, Some(seeded.response.id)) {
            Ok(_) => panic!("cross-question accept must fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("invalid operand"));
        let reloaded = must_some(must(store.question(other.id)));
        assert_eq!(reloaded.accepted_response, None);

        let raw = store.connection().execute(
            "UPDATE knowledge_questions SET accepted_response_id = ?1 WHERE id = ?2",
            params![seeded.response.id.0, other.id.0],
        );
        assert!(raw.is_err());
    }

    #[test]
    fn questions_cannot_store_inherit_status() {
        let mut store = fixture_store();
        let seeded = seed(&mut store);
        let raw = store.connection().execute(
            "UPDATE knowledge_questions SET status = 'inherit' WHERE id = ?1",
            params![seeded.question.id.0],
        );
        assert!(raw.is_err());
    }

    #[test]
    fn status_updates_persist() {
        let mut store = fixture_store();
        let seeded = seed(&mut store);

        for status in QuestionStatus::ALL {
            let updated = must(store.set_question_status(seeded.question.id, status));
            assert_eq!(updated.status, status);
            let reloaded = must_some(must(store.question(seeded.question.id)));
            assert_eq!(reloaded.status, status);
        }

        for status in ResponseStatus::ALL {
            let updated = must(store.set_response_status(seeded.response.id, status));
            assert_eq!(updated.status, status);
            let reloaded = must_some(must(store.response(seeded.response.id)));
            assert_eq!(reloaded.status, status);
        }
    }

    #[test]
    fn inherited_response_visibility_tracks_parent_live() {
        let mut store = fixture_store();
        let seeded = seed(&mut store);
        let viewers = [
            Viewer::Anonymous,
            Viewer::for_user(Some(&seeded.bob)),
            Viewer::for_user(Some(&seeded.joe)),
            Viewer::for_user(Some(&seeded.admin)),
        ];

        let visible = |store: &SqliteKnowledgeStore| -> Vec<bool> {
            viewers
                .iter()
                .map(|viewer| must(store.response_visible(&seeded.response, *viewer)))
                .collect()
        };

        assert_eq!(visible(&store), vec![false, false, true, true]);

        let _ = must(store.set_question_status(seeded.question.id, QuestionStatus::Public));
        assert_eq!(visible(&store), vec![true, true, true, true]);

        let _ = must(store.set_question_status(seeded.question.id, QuestionStatus::Internal));
        assert_eq!(visible(&store), vec![false, false, false, true]);
    }

    #[test]
    fn viewer_resolution_and_listing_respect_visibility() {
        let mut store = fixture_store();
        let seeded = seed(&mut store);
        let public = must(store.create_question(QuestionInput {
            user: Some(seeded.bob.id),
            name: None,
            email: None,
            title: "Open question".to_string(),
            body: "Everyone can read this.".to_string(),
            status: Some(QuestionStatus::Public),
        }));

        assert_eq!(must(store.viewer_for(None)), Viewer::Anonymous);
        assert_eq!(must(store.viewer_for(Some(UserId(9_999)))), Viewer::Anonymous);
        assert_eq!(
            must(store.viewer_for(Some(seeded.admin.id))),
            Viewer::Privileged(seeded.admin.id)
        );

        let bob = must(store.viewer_for(Some(seeded.bob.id)));
        let ids: Vec<QuestionId> = must(store.visible_questions(bob))
            .into_iter()
            .map(|question| question.id)
            .collect();
        assert_eq!(ids, vec![public.id]);

        let joe = must(store.viewer_for(Some(seeded.joe.id)));
        let responses = must(store.visible_responses(&seeded.question, joe));
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn creating_response_for_missing_question_fails() {
        let mut store = fixture_store();
        let err = match store.create_response(ResponseInput {
            question: QuestionId(42),
            user: None,
            name: Some("Joe Dirt".to_string()),
            email: Some("joedirt@example.com".to_string()),
            body: "hello".to_string(),
            status: None,
        }) {
            Ok(_) => panic!("response without question must fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("question 42 not found"));
    }

    #[test]
    fn schema_contract_contains_expected_tables_and_trigger() {
        let store = fixture_store();
        for table in [
            "knowledge_users",
            "knowledge_questions",
            "knowledge_responses",
            "schema_migrations",
        ] {
            assert!(must(table_exists(store.connection(), table)), "missing {table}");
        }

        let trigger_count = match store.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type='trigger' AND name = 'trg_questions_accepted_response_owned'",
            [],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(value) => value,
            Err(err) => panic!("failed to query triggers: {err}"),
        };
        assert_eq!(trigger_count, 1);
    }
}
