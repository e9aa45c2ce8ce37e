//! Person and company namespaces
//!
//! Persons are stored as JSON documents plus an email index. Growing a
//! person's email set is a read-modify-write inside one transaction so
//! concurrent workers never lose an email.

use sqlx::SqliteConnection;
use tracing::debug;

use super::{retry_on_lock, KeyedStore};
use crate::models::{Company, Person};
use crate::{Error, Result};

impl KeyedStore {
    pub async fn get_person(&self, user_id: &str) -> Result<Option<Person>> {
        let mut conn = self.pool.acquire().await?;
        load_person(&mut conn, user_id).await
    }

    pub async fn find_person_by_email(&self, email: &str) -> Result<Option<Person>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT p.value FROM person_emails e JOIN persons p ON p.user_id = e.user_id
             WHERE e.email = ?",
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(value,)| serde_json::from_str(&value).map_err(Error::from))
            .transpose()
    }

    pub async fn find_person_by_external_id(&self, external_id: &str) -> Result<Option<Person>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM persons WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(value,)| serde_json::from_str(&value).map_err(Error::from))
            .transpose()
    }

    /// Insert a new person unless one with the same id already exists
    ///
    /// Returns whichever person is stored afterwards, so two workers racing
    /// to create the same person converge on one record.
    pub async fn insert_person(&self, person: &Person) -> Result<Person> {
        retry_on_lock("insert person", self.lock_wait_ms, || async move {
            let mut tx = self.pool.begin().await?;

            if let Some(existing) = load_person(&mut tx, &person.user_id).await? {
                tx.commit().await?;
                return Ok(existing);
            }

            let mut person = person.clone();
            person.normalize_companies();
            write_person(&mut tx, &person).await?;
            tx.commit().await?;

            debug!(user_id = %person.user_id, "Created person");
            Ok::<Person, Error>(person)
        })
        .await
    }

    /// Create or fully replace a person (default data bootstrap)
    pub async fn store_person(&self, person: &Person) -> Result<()> {
        retry_on_lock("store person", self.lock_wait_ms, || async move {
            let mut tx = self.pool.begin().await?;
            let mut person = person.clone();
            person.normalize_companies();
            write_person(&mut tx, &person).await?;
            tx.commit().await?;
            Ok::<(), Error>(())
        })
        .await
    }

    /// Add an email to a stored person, returning the updated person
    pub async fn add_person_email(&self, user_id: &str, email: &str) -> Result<Person> {
        let email = email.to_lowercase();
        let email = email.as_str();

        retry_on_lock("add person email", self.lock_wait_ms, || async move {
            let mut tx = self.pool.begin().await?;

            let mut person = load_person(&mut tx, user_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("person {}", user_id)))?;

            if person.emails.insert(email.to_string()) {
                write_person(&mut tx, &person).await?;
                debug!(user_id = %user_id, email = %email, "Added email to person");
            }

            tx.commit().await?;
            Ok::<Person, Error>(person)
        })
        .await
    }

    pub async fn count_persons(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM persons")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn companies(&self) -> Result<Vec<Company>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT company_name, domains FROM companies ORDER BY company_name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(company_name, domains)| -> Result<Company> {
                Ok(Company {
                    company_name,
                    domains: serde_json::from_str(&domains)?,
                })
            })
            .collect()
    }

    pub async fn store_company(&self, company: &Company) -> Result<()> {
        let domains = serde_json::to_string(&company.domains)?;
        let domains = domains.as_str();
        let pool = &self.pool;

        retry_on_lock("store company", self.lock_wait_ms, || async move {
            sqlx::query(
                "INSERT INTO companies (company_name, domains) VALUES (?, ?)
                 ON CONFLICT(company_name) DO UPDATE SET domains = excluded.domains",
            )
            .bind(&company.company_name)
            .bind(domains)
            .execute(pool)
            .await?;
            Ok::<(), Error>(())
        })
        .await
    }
}

async fn load_person(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<Person>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM persons WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|(value,)| serde_json::from_str(&value).map_err(Error::from))
        .transpose()
}

/// Upsert the person document and index every email it owns
async fn write_person(conn: &mut SqliteConnection, person: &Person) -> Result<()> {
    let value = serde_json::to_string(person)?;
    sqlx::query(
        "INSERT INTO persons (user_id, external_id, value) VALUES (?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET external_id = excluded.external_id, value = excluded.value",
    )
    .bind(&person.user_id)
    .bind(&person.external_id)
    .bind(value)
    .execute(&mut *conn)
    .await?;

    for email in &person.emails {
        sqlx::query(
            "INSERT INTO person_emails (email, user_id) VALUES (?, ?)
             ON CONFLICT(email) DO UPDATE SET user_id = excluded.user_id",
        )
        .bind(email)
        .bind(&person.user_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
